//! Workflow (shared task) and tool models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::object::{fields, push_field, Object, ResourceSpec};
use super::Kind;

pub type Workflow = Object<WorkflowSpec>;
pub type Tool = Object<ToolSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowManifest {
    pub name: String,
    pub description: String,
    /// Short unique handle used to address the task.
    pub alias: String,
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowStep {
    pub id: String,
    pub step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSpec {
    pub thread_name: String,
    pub manifest: WorkflowManifest,
    /// Managed workflows mirror a task shared by `source_thread_name`.
    pub managed: bool,
    pub source_thread_name: Option<String>,
    pub source_workflow_name: Option<String>,
}

impl ResourceSpec for WorkflowSpec {
    const KIND: Kind = Kind::Workflow;
    type Status = ();

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![(fields::THREAD_NAME, self.thread_name.clone())];
        push_field(&mut out, fields::SOURCE_THREAD_NAME, &self.source_thread_name);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolManifest {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub params: BTreeMap<String, String>,
    pub context: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSpec {
    pub thread_name: String,
    pub manifest: ToolManifest,
}

impl ResourceSpec for ToolSpec {
    const KIND: Kind = Kind::Tool;
    type Status = ();

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        vec![(fields::THREAD_NAME, self.thread_name.clone())]
    }
}
