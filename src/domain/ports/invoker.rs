use async_trait::async_trait;

use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Run, Thread};

/// Tool definition handed to a system task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolDef {
    pub name: String,
    pub instructions: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemTaskOptions {
    pub env: Vec<String>,
}

/// Handle to a running system task.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    /// Wait for the task output.
    async fn result(&self) -> DomainResult<String>;

    /// Release the task. Safe to call after `result`.
    fn close(&self);
}

/// Port to the component that executes model and tool invocations.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Advance a suspended run of `thread`.
    async fn resume(&self, client: &Client, thread: &Thread, run: &Run) -> DomainResult<()>;

    /// Start an auxiliary task scoped to `thread`, usually a throwaway
    /// system thread created by the caller.
    async fn system_task(
        &self,
        thread: &Thread,
        tool: &ToolDef,
        input: &str,
        options: SystemTaskOptions,
    ) -> DomainResult<Box<dyn TaskHandle>>;
}
