//! MCP server bindings.
//!
//! A [`ProjectMcpServerSpec`] binds a thread to a backend identified by
//! `manifest.mcp_id`, which names either an [`McpServerInstanceSpec`]
//! (`msi1` prefix) or an [`McpServerSpec`] (`ms1` prefix).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::object::{fields, Object, ResourceSpec};
use super::Kind;

pub const MCP_SERVER_FINALIZER: &str = "threadloom.dev/mcp-server";
pub const MCP_SERVER_INSTANCE_FINALIZER: &str = "threadloom.dev/mcp-server-instance";
pub const PROJECT_MCP_SERVER_FINALIZER: &str = "threadloom.dev/project-mcp-server";

pub type McpServer = Object<McpServerSpec>;
pub type McpServerInstance = Object<McpServerInstanceSpec>;
pub type ProjectMcpServer = Object<ProjectMcpServerSpec>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerManifest {
    pub name: String,
    pub url: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerSpec {
    pub manifest: McpServerManifest,
    pub unsupported_tools: Vec<String>,
    pub thread_name: Option<String>,
    pub alias: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    /// Set for multi-user servers shared within a catalog.
    #[serde(rename = "sharedWithinMCPCatalogName")]
    pub shared_within_catalog_name: Option<String>,
    #[serde(rename = "mcpServerCatalogEntryName")]
    pub catalog_entry_name: Option<String>,
}

impl ResourceSpec for McpServerSpec {
    const KIND: Kind = Kind::McpServer;
    type Status = ();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpServerInstanceSpec {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "mcpServerName")]
    pub mcp_server_name: String,
    #[serde(rename = "mcpCatalogName")]
    pub catalog_name: Option<String>,
    #[serde(rename = "mcpServerCatalogEntryName")]
    pub catalog_entry_name: Option<String>,
}

impl ResourceSpec for McpServerInstanceSpec {
    const KIND: Kind = Kind::McpServerInstance;
    type Status = ();
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMcpServerManifest {
    #[serde(rename = "mcpID")]
    pub mcp_id: String,
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMcpServerSpec {
    pub manifest: ProjectMcpServerManifest,
    pub thread_name: String,
    #[serde(rename = "userID")]
    pub user_id: String,
}

impl ResourceSpec for ProjectMcpServerSpec {
    const KIND: Kind = Kind::ProjectMcpServer;
    type Status = ();

    fn index_fields(&self) -> Vec<(&'static str, String)> {
        vec![(fields::THREAD_NAME, self.thread_name.clone())]
    }
}
