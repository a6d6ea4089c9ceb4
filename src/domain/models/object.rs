//! Generic object model shared by every resource kind.
//!
//! Every resource is an [`Object`] made of metadata, a spec owned by the API
//! layer and a status owned by the controllers. The store only ever sees the
//! type-erased [`RawObject`]; typed access goes through [`ResourceSpec`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// Resource kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Thread,
    Run,
    ExecutionState,
    Workspace,
    KnowledgeSet,
    Agent,
    Workflow,
    Tool,
    ThreadShare,
    McpServer,
    McpServerInstance,
    ProjectMcpServer,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thread => "Thread",
            Self::Run => "Run",
            Self::ExecutionState => "ExecutionState",
            Self::Workspace => "Workspace",
            Self::KnowledgeSet => "KnowledgeSet",
            Self::Agent => "Agent",
            Self::Workflow => "Workflow",
            Self::Tool => "Tool",
            Self::ThreadShare => "ThreadShare",
            Self::McpServer => "McpServer",
            Self::McpServerInstance => "McpServerInstance",
            Self::ProjectMcpServer => "ProjectMcpServer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Thread" => Some(Self::Thread),
            "Run" => Some(Self::Run),
            "ExecutionState" => Some(Self::ExecutionState),
            "Workspace" => Some(Self::Workspace),
            "KnowledgeSet" => Some(Self::KnowledgeSet),
            "Agent" => Some(Self::Agent),
            "Workflow" => Some(Self::Workflow),
            "Tool" => Some(Self::Tool),
            "ThreadShare" => Some(Self::ThreadShare),
            "McpServer" => Some(Self::McpServer),
            "McpServerInstance" => Some(Self::McpServerInstance),
            "ProjectMcpServer" => Some(Self::ProjectMcpServer),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: Kind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: Kind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    /// Assigned by the store; 0 means "never stored".
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// A spec type that can be stored. The spec decides its kind, its status
/// type and the fields the store indexes for field-selector queries.
pub trait ResourceSpec:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Default + PartialEq + Send + Sync + 'static
{
    const KIND: Kind;

    type Status: Serialize
        + DeserializeOwned
        + Clone
        + fmt::Debug
        + Default
        + PartialEq
        + Send
        + Sync
        + 'static;

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object<S: ResourceSpec> {
    pub metadata: ObjectMeta,
    pub spec: S,
    pub status: S::Status,
}

impl<S: ResourceSpec> Object<S> {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: S) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: S::Status::default(),
        }
    }

    pub fn with_finalizer(mut self, finalizer: &str) -> Self {
        self.metadata.finalizers.push(finalizer.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(S::KIND, self.namespace(), self.name())
    }

    pub fn to_raw(&self) -> DomainResult<RawObject> {
        Ok(RawObject {
            kind: S::KIND,
            metadata: self.metadata.clone(),
            spec: serde_json::to_value(&self.spec)?,
            status: serde_json::to_value(&self.status)?,
            fields: self
                .spec
                .index_fields()
                .into_iter()
                .map(|(field, value)| (field.to_string(), value))
                .collect(),
        })
    }

    pub fn from_raw(raw: RawObject) -> DomainResult<Self> {
        Ok(Self {
            metadata: raw.metadata,
            spec: serde_json::from_value(raw.spec)?,
            status: serde_json::from_value(raw.status)?,
        })
    }
}

/// Type-erased object as held by a store adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    pub spec: serde_json::Value,
    pub status: serde_json::Value,
    /// Indexed field values, recomputed from the spec on every write.
    pub fields: BTreeMap<String, String>,
}

impl RawObject {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.kind, &self.metadata.namespace, &self.metadata.name)
    }

    pub fn field(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Equality match on indexed fields; all pairs must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    pub terms: Vec<(String, String)>,
    pub limit: Option<usize>,
}

impl FieldSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: &str, value: impl Into<String>) -> Self {
        self.terms.push((field.to_string(), value.into()));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, object: &RawObject) -> bool {
        self.terms
            .iter()
            .all(|(field, value)| object.field(field) == Some(value.as_str()))
    }
}

/// Field names used by the indexes.
pub mod fields {
    pub const THREAD_NAME: &str = "spec.threadName";
    pub const PARENT_THREAD_NAME: &str = "spec.parentThreadName";
    pub const SOURCE_THREAD_NAME: &str = "spec.sourceThreadName";
    pub const AGENT_NAME: &str = "spec.agentName";
    pub const TEMPLATE: &str = "spec.template";
    pub const PUBLIC_ID: &str = "spec.publicID";
    pub const PROJECT_THREAD_NAME: &str = "spec.projectThreadName";
}

/// Helper for optional string index fields.
pub(crate) fn push_field(
    out: &mut Vec<(&'static str, String)>,
    field: &'static str,
    value: &Option<String>,
) {
    if let Some(value) = value {
        out.push((field, value.clone()));
    }
}
