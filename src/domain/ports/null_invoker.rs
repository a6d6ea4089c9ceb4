//! Null invoker implementation.
//!
//! Used when no execution backend is attached but the controllers still
//! need an Invoker. Resumes are logged and dropped; system tasks fail.

use async_trait::async_trait;

use super::{Invoker, SystemTaskOptions, TaskHandle, ToolDef};
use crate::domain::client::Client;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Run, Thread};

/// A no-op invoker.
#[derive(Debug, Clone, Default)]
pub struct NullInvoker;

impl NullInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Invoker for NullInvoker {
    async fn resume(&self, _client: &Client, thread: &Thread, run: &Run) -> DomainResult<()> {
        tracing::debug!(
            thread = %thread.name(),
            run = %run.name(),
            "no invoker attached, leaving run suspended"
        );
        Ok(())
    }

    async fn system_task(
        &self,
        thread: &Thread,
        tool: &ToolDef,
        _input: &str,
        _options: SystemTaskOptions,
    ) -> DomainResult<Box<dyn TaskHandle>> {
        Err(DomainError::Invoker(format!(
            "no invoker attached to run system task {:?} for thread {}",
            tool.name,
            thread.name()
        )))
    }
}
