//! Workspace, knowledge set and agent models.
//!
//! Workspaces and knowledge sets are content stores scoped to a thread. The
//! ancestor lists they carry are captured at creation time and never follow
//! later changes to the thread tree.

use serde::{Deserialize, Serialize};

use super::object::{fields, push_field, Object, ResourceSpec};
use super::Kind;

pub const WORKSPACE_FINALIZER: &str = "threadloom.dev/workspace";
pub const KNOWLEDGE_SET_FINALIZER: &str = "threadloom.dev/knowledge-set";

pub type Workspace = Object<WorkspaceSpec>;
pub type KnowledgeSet = Object<KnowledgeSetSpec>;
pub type Agent = Object<AgentSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceSpec {
    pub thread_name: Option<String>,
    pub agent_name: Option<String>,
    /// Ancestor workspaces, farthest first.
    pub from_workspace_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceStatus {
    /// Content address assigned by the storage provider.
    #[serde(rename = "workspaceID")]
    pub workspace_id: Option<String>,
}

impl ResourceSpec for WorkspaceSpec {
    const KIND: Kind = Kind::Workspace;
    type Status = WorkspaceStatus;

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        push_field(&mut out, fields::THREAD_NAME, &self.thread_name);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeSetSpec {
    pub thread_name: Option<String>,
    pub agent_name: Option<String>,
    pub related_knowledge_set_names: Vec<String>,
    /// Set whose content seeds this one.
    pub from_knowledge_set_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeSetStatus {
    pub has_content: bool,
}

impl ResourceSpec for KnowledgeSetSpec {
    const KIND: Kind = Kind::KnowledgeSet;
    type Status = KnowledgeSetStatus;

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = Vec::new();
        push_field(&mut out, fields::THREAD_NAME, &self.thread_name);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSpec {
    pub name: String,
    pub description: String,
    pub prompt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentStatus {
    pub workspace_name: Option<String>,
    pub knowledge_set_names: Vec<String>,
}

impl ResourceSpec for AgentSpec {
    const KIND: Kind = Kind::Agent;
    type Status = AgentStatus;
}
