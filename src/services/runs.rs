//! Run lifecycle steps.
//!
//! Terminal preconditions (thread gone, thread aborted, predecessor gone)
//! are recorded on the run as `state = error` rather than retried.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::application::dispatcher::{CleanupStep, ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{ExecutionStateSpec, Run, RunSpec, RunState, ThreadSpec};
use crate::domain::ports::Invoker;

async fn fail_run(client: &Client, run: &mut Run, message: String) -> DomainResult<Outcome> {
    tracing::warn!(run = %run.name(), thread = %run.spec.thread_name, error = %message, "run failed");
    run.status.state = Some(RunState::Error);
    run.status.error = message;
    client.update_status(run).await?;
    Ok(Outcome::Converged)
}

// ============================================================================
// Resume
// ============================================================================

/// Hands suspended runs to the invoker once their thread is ready.
pub struct Resume {
    invoker: Arc<dyn Invoker>,
}

impl Resume {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl ConvergenceStep<RunSpec> for Resume {
    fn name(&self) -> &'static str {
        "Resume"
    }

    async fn converge(&self, client: &Client, run: &mut Run) -> DomainResult<Outcome> {
        if run.is_terminal() {
            return Ok(Outcome::Converged);
        }

        let thread_name = run.spec.thread_name.clone();
        let Some(thread) = client.try_get::<ThreadSpec>(run.namespace(), &thread_name).await? else {
            return fail_run(client, run, format!("thread {thread_name} not found")).await;
        };
        if thread.spec.abort {
            return fail_run(client, run, "thread was aborted".to_string()).await;
        }

        if let Some(previous) = run.spec.previous_run_name.clone() {
            match client.get::<RunSpec>(run.namespace(), &previous).await {
                Ok(_) => {}
                Err(err) if err.is_not_found() => {
                    return fail_run(client, run, format!("run {previous} not found: {err}")).await;
                }
                Err(err) => return Err(err),
            }
        }

        if run.spec.synchronous || !thread.status.created {
            return Ok(Outcome::Converged);
        }

        tracing::debug!(run = %run.name(), thread = %thread.name(), "resuming run");
        self.invoker.resume(client, &thread, run).await?;
        Ok(Outcome::Converged)
    }
}

// ============================================================================
// DeleteRunState
// ============================================================================

/// Removes the execution state of a deleted run: the record named after the
/// run and one per external call it ever made.
pub struct DeleteRunState;

#[async_trait]
impl CleanupStep<RunSpec> for DeleteRunState {
    fn name(&self) -> &'static str {
        "DeleteRunState"
    }

    async fn cleanup(&self, client: &Client, run: &Run) -> DomainResult<()> {
        for name in run.execution_state_names() {
            client.delete::<ExecutionStateSpec>(run.namespace(), &name).await?;
        }
        tracing::debug!(run = %run.name(), "deleted run state");
        Ok(())
    }
}

// ============================================================================
// DeleteFinished
// ============================================================================

/// Garbage-collects finished runs, and synchronous runs that never recorded
/// a state, once they are older than the TTL.
pub struct DeleteFinished {
    ttl: chrono::Duration,
}

impl DeleteFinished {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { ttl }
    }
}

#[async_trait]
impl ConvergenceStep<RunSpec> for DeleteFinished {
    fn name(&self) -> &'static str {
        "DeleteFinished"
    }

    async fn converge(&self, client: &Client, run: &mut Run) -> DomainResult<Outcome> {
        let since = match run.status.state {
            Some(RunState::Finished) => run.status.end_time,
            None if run.spec.synchronous => run.metadata.creation_timestamp,
            _ => None,
        };
        let Some(since) = since else {
            return Ok(Outcome::Converged);
        };

        let age = Utc::now() - since;
        if age < self.ttl {
            let remaining = (self.ttl - age).to_std().unwrap_or_default();
            return Ok(Outcome::RequeueAfter(remaining));
        }

        tracing::info!(run = %run.name(), age_hours = age.num_hours(), "deleting expired run");
        client.delete::<RunSpec>(run.namespace(), run.name()).await?;
        Ok(Outcome::Converged)
    }
}
