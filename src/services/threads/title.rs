//! Title generation for user threads.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Run, RunSpec, Thread, ThreadRole, ThreadSpec};
use crate::domain::ports::{Invoker, SystemTaskOptions, ToolDef};
use crate::services::naming::{generate_name, THREAD_PREFIX};

const TITLE_INSTRUCTIONS: &str = "Generate a concise (3 to 4 words) and descriptive thread name \
that encapsulates the main topic or theme of the following conversation starter. \
Do not enclose the title in quotes.";

/// Names an untitled user thread after its first suspended run by asking
/// the invoker for a short title on a throwaway system thread.
pub struct GenerateName {
    invoker: Arc<dyn Invoker>,
}

impl GenerateName {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    fn wants_title(thread: &Thread) -> bool {
        thread.role() == ThreadRole::User
            && !thread.spec.system_task
            && !thread.spec.ephemeral
            && thread.spec.manifest.name.is_empty()
            && thread.status.last_run_name.is_some()
            && thread.status.last_run_state.is_some_and(|s| s.is_suspended())
    }

    async fn ask(&self, system_thread: &Thread, run: &Run) -> DomainResult<String> {
        let tool = ToolDef {
            name: "generate-thread-name".to_string(),
            instructions: TITLE_INSTRUCTIONS.to_string(),
        };
        let input = format!(
            "User Input: {}\n\nLLM Response: {}",
            run.spec.input, run.status.output
        );

        let handle = self
            .invoker
            .system_task(system_thread, &tool, &input, SystemTaskOptions::default())
            .await?;
        let result = handle.result().await;
        handle.close();
        result
    }
}

#[async_trait]
impl ConvergenceStep<ThreadSpec> for GenerateName {
    fn name(&self) -> &'static str {
        "GenerateName"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if !Self::wants_title(thread) {
            return Ok(Outcome::Converged);
        }
        let Some(run_name) = thread.status.last_run_name.clone() else {
            return Ok(Outcome::Converged);
        };
        let run: Run = client.get::<RunSpec>(thread.namespace(), &run_name).await?;

        let mut system_thread = Thread::new(
            thread.namespace(),
            generate_name(THREAD_PREFIX),
            ThreadSpec {
                user_id: thread.spec.user_id.clone(),
                ephemeral: true,
                system_task: true,
                ..Default::default()
            },
        );
        client.create(&mut system_thread).await?;

        let result = self.ask(&system_thread, &run).await;
        client
            .delete::<ThreadSpec>(system_thread.namespace(), system_thread.name())
            .await?;

        let title = result
            .map_err(|err| DomainError::Invoker(format!("failed to generate thread name: {err}")))?;
        let title = title.trim();
        if title.is_empty() {
            return Ok(Outcome::Converged);
        }

        thread.spec.manifest.name = title.to_string();
        client.update(thread).await?;
        tracing::info!(thread = %thread.name(), title = %thread.spec.manifest.name, "named thread");
        Ok(Outcome::Converged)
    }
}
