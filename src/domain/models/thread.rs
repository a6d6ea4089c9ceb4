//! Thread domain model.
//!
//! A thread is a conversation or project context. Threads form a tree through
//! `parent_thread_name` and a copy lineage through `source_thread_name`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::mcp::MCP_SERVER_FINALIZER;
use super::object::{fields, push_field, Object, ResourceSpec};
use super::run::RunState;
use super::Kind;

/// Annotation carrying the template snapshot revision (RFC3339 UTC).
pub const TEMPLATE_SNAPSHOT_ANNOTATION: &str = "threadloom.dev/project-snapshot-revision";

/// Finalizer names that older releases put on threads and that are now stripped.
pub const DEPRECATED_THREAD_FINALIZERS: [&str; 2] = [
    "threadloom.dev/thread-child-cleanup",
    MCP_SERVER_FINALIZER,
];

pub type Thread = Object<ThreadSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadManifest {
    pub name: String,
    pub description: String,
    pub prompt: String,
    pub model: String,
    pub tools: Vec<String>,
    /// Names of workflows shared by this thread.
    pub shared_tasks: Vec<String>,
    /// MCP server id -> tool names allowed in this thread.
    #[serde(rename = "allowedMCPTools")]
    pub allowed_mcp_tools: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadSpec {
    pub manifest: ThreadManifest,
    pub parent_thread_name: Option<String>,
    pub source_thread_name: Option<String>,
    pub agent_name: Option<String>,
    /// Explicit workspace; when set the controller never creates one.
    pub workspace_name: Option<String>,
    pub user_id: String,
    pub project: bool,
    pub template: bool,
    pub ephemeral: bool,
    pub system_task: bool,
    pub abort: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadStatus {
    pub workspace_name: Option<String>,
    #[serde(rename = "workspaceID")]
    pub workspace_id: Option<String>,
    pub shared_workspace_name: Option<String>,
    pub shared_knowledge_set_name: Option<String>,
    /// Own shared knowledge set first, then ancestors nearest to farthest.
    pub knowledge_set_names: Vec<String>,
    pub copied_tools: bool,
    pub copied_tasks: bool,
    pub created: bool,
    pub snapshot_upgrade_available: bool,
    pub last_run_name: Option<String>,
    pub last_run_state: Option<RunState>,
}

impl ResourceSpec for ThreadSpec {
    const KIND: Kind = Kind::Thread;
    type Status = ThreadStatus;

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![(fields::TEMPLATE, self.template.to_string())];
        push_field(&mut out, fields::PARENT_THREAD_NAME, &self.parent_thread_name);
        push_field(&mut out, fields::SOURCE_THREAD_NAME, &self.source_thread_name);
        push_field(&mut out, fields::AGENT_NAME, &self.agent_name);
        out
    }
}

/// How a thread takes part in the project tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// A project (or template) thread; owns its shared workspace.
    Project,
    /// A non-project thread living under a parent project.
    User,
    /// Neither; e.g. a plain agent chat or a system task thread.
    Standalone,
}

impl Object<ThreadSpec> {
    pub fn role(&self) -> ThreadRole {
        if self.spec.project {
            ThreadRole::Project
        } else if self.spec.parent_thread_name.is_some() {
            ThreadRole::User
        } else {
            ThreadRole::Standalone
        }
    }

    /// Project threads and the user threads below them share a workspace.
    pub fn is_project_based(&self) -> bool {
        !matches!(self.role(), ThreadRole::Standalone)
    }

    /// Whether tools, tasks and MCP bindings are copied from the source thread.
    pub fn copies_from_source(&self) -> bool {
        self.spec.project
            && self.spec.source_thread_name.is_some()
            && self.spec.parent_thread_name.is_none()
    }

    pub fn snapshot_revision(&self) -> Option<&str> {
        self.metadata
            .annotation(TEMPLATE_SNAPSHOT_ANNOTATION)
            .filter(|rev| !rev.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(spec: ThreadSpec) -> Thread {
        Thread::new("default", "t1test", spec)
    }

    #[test]
    fn test_role_classification() {
        let project = thread(ThreadSpec {
            project: true,
            ..Default::default()
        });
        assert_eq!(project.role(), ThreadRole::Project);
        assert!(project.is_project_based());

        let user = thread(ThreadSpec {
            parent_thread_name: Some("t1parent".to_string()),
            ..Default::default()
        });
        assert_eq!(user.role(), ThreadRole::User);
        assert!(user.is_project_based());

        let standalone = thread(ThreadSpec::default());
        assert_eq!(standalone.role(), ThreadRole::Standalone);
        assert!(!standalone.is_project_based());
    }

    #[test]
    fn test_copies_from_source_only_for_root_projects() {
        let mut t = thread(ThreadSpec {
            project: true,
            source_thread_name: Some("t1src".to_string()),
            ..Default::default()
        });
        assert!(t.copies_from_source());

        t.spec.parent_thread_name = Some("t1parent".to_string());
        assert!(!t.copies_from_source());
    }

    #[test]
    fn test_index_fields_skip_unset_references() {
        let t = thread(ThreadSpec {
            source_thread_name: Some("t1src".to_string()),
            template: true,
            ..Default::default()
        });
        let indexed = t.spec.index_fields();
        assert!(indexed.contains(&(fields::TEMPLATE, "true".to_string())));
        assert!(indexed.contains(&(fields::SOURCE_THREAD_NAME, "t1src".to_string())));
        assert!(!indexed.iter().any(|(f, _)| *f == fields::PARENT_THREAD_NAME));
    }

    #[test]
    fn test_empty_snapshot_annotation_reads_as_unset() {
        let mut t = thread(ThreadSpec::default());
        t.metadata
            .annotations
            .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), String::new());
        assert_eq!(t.snapshot_revision(), None);
    }
}
