//! Run domain model.
//!
//! A run is one execution attempt of a thread against an agent, workflow or
//! tool. Its execution state lives outside the run in [`ExecutionState`]
//! objects keyed by run name and by external-call id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::{fields, Object, ResourceSpec};
use super::Kind;

pub type Run = Object<RunSpec>;
pub type ExecutionState = Object<ExecutionStateSpec>;

/// State of a run: `Pending -> Running -> {Continue, Waiting, Error, Finished}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    /// Chat turn finished; the run may be continued.
    Continue,
    /// Waiting on an external call.
    Waiting,
    Error,
    Finished,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Continue => "continue",
            Self::Waiting => "waiting",
            Self::Error => "error",
            Self::Finished => "finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error | Self::Finished)
    }

    /// `Continue` and `Waiting` may be resumed.
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Continue | Self::Waiting)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalCallResult {
    pub id: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSpec {
    pub thread_name: String,
    pub agent_name: Option<String>,
    pub workflow_name: Option<String>,
    #[serde(rename = "workflowStepID")]
    pub workflow_step_id: Option<String>,
    pub previous_run_name: Option<String>,
    pub input: String,
    pub synchronous: bool,
    /// Responses delivered for earlier external calls of this run.
    pub external_call_results: Vec<ExternalCallResult>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStatus {
    /// `None` until the invoker records a first state.
    pub state: Option<RunState>,
    pub output: String,
    pub error: String,
    pub external_call: Option<ExternalCall>,
    pub end_time: Option<DateTime<Utc>>,
}

impl ResourceSpec for RunSpec {
    const KIND: Kind = Kind::Run;
    type Status = RunStatus;

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        vec![(fields::THREAD_NAME, self.thread_name.clone())]
    }
}

impl Object<RunSpec> {
    pub fn is_terminal(&self) -> bool {
        self.status.state.is_some_and(|s| s.is_terminal())
    }

    /// Names of every execution-state object that belongs to this run.
    pub fn execution_state_names(&self) -> Vec<String> {
        let mut names = vec![self.name().to_string()];
        if let Some(call) = &self.status.external_call {
            if !call.id.is_empty() {
                names.push(call.id.clone());
            }
        }
        for result in &self.spec.external_call_results {
            if !result.id.is_empty() && !names.contains(&result.id) {
                names.push(result.id.clone());
            }
        }
        names
    }
}

/// Externally tracked execution state (call frames, partial output).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionStateSpec {
    pub thread_name: String,
    pub run_name: String,
    pub call_frame: serde_json::Value,
    pub output: String,
    pub error: String,
    pub done: bool,
}

impl ResourceSpec for ExecutionStateSpec {
    const KIND: Kind = Kind::ExecutionState;
    type Status = ();

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        vec![(fields::THREAD_NAME, self.thread_name.clone())]
    }
}
