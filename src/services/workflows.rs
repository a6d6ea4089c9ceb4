//! Workflow steps.

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Thread, ThreadSpec, Workflow, WorkflowSpec};

/// Deletes a managed workflow once its source thread is gone or stops
/// sharing the task it mirrors.
pub struct EnsureShared;

impl EnsureShared {
    async fn still_shared(&self, client: &Client, workflow: &Workflow) -> DomainResult<bool> {
        let Some(source_name) = &workflow.spec.source_thread_name else {
            return Ok(false);
        };
        let Some(source) = client.try_get::<ThreadSpec>(workflow.namespace(), source_name).await? else {
            return Ok(false);
        };
        Ok(shares(&source, workflow.spec.source_workflow_name.as_deref()))
    }
}

fn shares(source: &Thread, task: Option<&str>) -> bool {
    task.is_some_and(|task| source.spec.manifest.shared_tasks.iter().any(|t| t == task))
}

#[async_trait]
impl ConvergenceStep<WorkflowSpec> for EnsureShared {
    fn name(&self) -> &'static str {
        "EnsureShared"
    }

    async fn converge(&self, client: &Client, workflow: &mut Workflow) -> DomainResult<Outcome> {
        if !workflow.spec.managed || self.still_shared(client, workflow).await? {
            return Ok(Outcome::Converged);
        }

        tracing::info!(
            workflow = %workflow.name(),
            source = ?workflow.spec.source_thread_name,
            "deleting managed workflow no longer shared by its source"
        );
        client
            .delete::<WorkflowSpec>(workflow.namespace(), workflow.name())
            .await?;
        Ok(Outcome::Converged)
    }
}
