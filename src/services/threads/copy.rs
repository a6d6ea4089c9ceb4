//! Copying tasks, tools and MCP bindings from a project's source thread.
//!
//! Only root projects with a source copy anything. Each step raises its
//! completion flag once; a template snapshot bump clears the flags on the
//! template so the copies run one more time.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    fields, FieldSelector, McpServer, McpServerInstance, McpServerInstanceSpec, McpServerSpec,
    ProjectMcpServer, ProjectMcpServerSpec, Thread, ThreadSpec, Tool, ToolSpec, Workflow,
    WorkflowSpec, MCP_SERVER_FINALIZER, MCP_SERVER_INSTANCE_FINALIZER,
    PROJECT_MCP_SERVER_FINALIZER,
};
use crate::services::convergence::{create_if_not_exists, create_or_update};
use crate::services::naming::{
    is_mcp_server_id, is_mcp_server_instance_id, random_token, safe_hash_concat_name,
    MCP_SERVER_INSTANCE_PREFIX, MCP_SERVER_PREFIX, PROJECT_MCP_SERVER_PREFIX, WORKFLOW_PREFIX,
};

fn copy_source(thread: &Thread) -> Option<&str> {
    if thread.copies_from_source() {
        thread.spec.source_thread_name.as_deref()
    } else {
        None
    }
}

// ============================================================================
// CopyTasksFromSource
// ============================================================================

/// Clones the shared tasks that still belong to the source thread into this
/// thread and rewrites `manifest.shared_tasks` to point at the clones.
/// Missing tasks are dropped from the list.
pub struct CopyTasksFromSource;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CopyTasksFromSource {
    fn name(&self) -> &'static str {
        "CopyTasksFromSource"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        let Some(source) = copy_source(thread).map(str::to_string) else {
            return Ok(Outcome::Converged);
        };
        if thread.status.copied_tasks {
            return Ok(Outcome::Converged);
        }

        let mut modified = false;
        let mut task_names = Vec::with_capacity(thread.spec.manifest.shared_tasks.len());
        for task_name in &thread.spec.manifest.shared_tasks {
            let Some(task) = client.try_get::<WorkflowSpec>(thread.namespace(), task_name).await? else {
                modified = true;
                continue;
            };
            if task.spec.thread_name != source {
                task_names.push(task_name.clone());
                continue;
            }

            modified = true;
            let clone_name = safe_hash_concat_name(&[WORKFLOW_PREFIX, thread.name(), task_name]);
            let existing = client.try_get::<WorkflowSpec>(thread.namespace(), &clone_name).await?;
            let mut manifest = task.spec.manifest.clone();
            // A re-sync refreshes the content but keeps the clone's alias.
            manifest.alias = match &existing {
                Some(clone) => clone.spec.manifest.alias.clone(),
                None => random_token(),
            };
            let clone = create_or_update(
                client,
                Workflow::new(
                    thread.namespace(),
                    clone_name,
                    WorkflowSpec {
                        thread_name: thread.name().to_string(),
                        manifest,
                        ..Default::default()
                    },
                ),
            )
            .await?;
            tracing::info!(
                thread = %thread.name(),
                source_task = %task_name,
                task = %clone.name(),
                refreshed = existing.is_some(),
                "synced shared task"
            );
            task_names.push(clone.name().to_string());
        }

        if modified {
            thread.spec.manifest.shared_tasks = task_names;
            client.update(thread).await?;
        }
        thread.status.copied_tasks = true;
        client.update_status(thread).await?;
        Ok(Outcome::Converged)
    }
}

// ============================================================================
// CopyToolsFromSource
// ============================================================================

/// Copies the source thread's tools and rebinds its MCP servers for this
/// thread's user, then prunes bindings that no longer have a source.
pub struct CopyToolsFromSource;

impl CopyToolsFromSource {
    async fn copy_tools(&self, client: &Client, thread: &Thread, source: &str) -> DomainResult<()> {
        let tools: Vec<Tool> = client
            .list(thread.namespace(), FieldSelector::new().field(fields::THREAD_NAME, source))
            .await?;

        for tool in tools {
            let mut copy = Tool::new(
                thread.namespace(),
                safe_hash_concat_name(&[tool.name(), thread.name()]),
                ToolSpec {
                    thread_name: thread.name().to_string(),
                    manifest: tool.spec.manifest.clone(),
                },
            );
            if create_if_not_exists(client, &mut copy).await? {
                tracing::debug!(thread = %thread.name(), tool = %copy.name(), "copied tool");
            }
        }
        Ok(())
    }

    async fn ensure_instance(
        &self,
        client: &Client,
        thread: &Thread,
        server_name: &str,
        catalog_name: Option<String>,
        catalog_entry_name: Option<String>,
    ) -> DomainResult<String> {
        let instance = McpServerInstance::new(
            thread.namespace(),
            safe_hash_concat_name(&[MCP_SERVER_INSTANCE_PREFIX, thread.name(), server_name]),
            McpServerInstanceSpec {
                user_id: thread.spec.user_id.clone(),
                mcp_server_name: server_name.to_string(),
                catalog_name,
                catalog_entry_name,
            },
        )
        .with_finalizer(MCP_SERVER_INSTANCE_FINALIZER);
        Ok(create_or_update(client, instance).await?.name().to_string())
    }

    /// Resolve the backend a copied binding should point at.
    async fn target_mcp_id(&self, client: &Client, thread: &Thread, mcp_id: &str) -> DomainResult<String> {
        if is_mcp_server_instance_id(mcp_id) {
            let source: McpServerInstance = client.get(thread.namespace(), mcp_id).await?;
            return self
                .ensure_instance(
                    client,
                    thread,
                    &source.spec.mcp_server_name,
                    source.spec.catalog_name.clone(),
                    source.spec.catalog_entry_name.clone(),
                )
                .await;
        }

        if !is_mcp_server_id(mcp_id) {
            return Ok(mcp_id.to_string());
        }

        let server: McpServer = client.get(thread.namespace(), mcp_id).await?;
        if let Some(catalog) = &server.spec.shared_within_catalog_name {
            // Multi-user server: every user gets an instance of the same server.
            return self
                .ensure_instance(
                    client,
                    thread,
                    server.name(),
                    Some(catalog.clone()),
                    server.spec.catalog_entry_name.clone(),
                )
                .await;
        }

        if server.spec.user_id == thread.spec.user_id {
            return Ok(server.name().to_string());
        }

        // Single-user server owned by someone else: clone its configuration.
        let clone = McpServer::new(
            thread.namespace(),
            safe_hash_concat_name(&[MCP_SERVER_PREFIX, thread.name(), server.name()]),
            McpServerSpec {
                manifest: server.spec.manifest.clone(),
                unsupported_tools: server.spec.unsupported_tools.clone(),
                thread_name: None,
                alias: server.spec.alias.clone(),
                user_id: thread.spec.user_id.clone(),
                shared_within_catalog_name: None,
                catalog_entry_name: server.spec.catalog_entry_name.clone(),
            },
        )
        .with_finalizer(MCP_SERVER_FINALIZER);
        Ok(create_or_update(client, clone).await?.name().to_string())
    }

    async fn copy_mcp_bindings(&self, client: &Client, thread: &Thread, source: &str) -> DomainResult<()> {
        let bindings: Vec<ProjectMcpServer> = client
            .list(thread.namespace(), FieldSelector::new().field(fields::THREAD_NAME, source))
            .await?;

        let mut desired = HashSet::with_capacity(bindings.len());
        for binding in bindings {
            let mut manifest = binding.spec.manifest.clone();
            manifest.mcp_id = self.target_mcp_id(client, thread, &binding.spec.manifest.mcp_id).await?;

            let copy = ProjectMcpServer::new(
                thread.namespace(),
                safe_hash_concat_name(&[PROJECT_MCP_SERVER_PREFIX, thread.name(), binding.name()]),
                ProjectMcpServerSpec {
                    manifest,
                    thread_name: thread.name().to_string(),
                    user_id: thread.spec.user_id.clone(),
                },
            )
            .with_finalizer(PROJECT_MCP_SERVER_FINALIZER);
            desired.insert(create_or_update(client, copy).await?.name().to_string());
        }

        let existing: Vec<ProjectMcpServer> = client
            .list(thread.namespace(), FieldSelector::new().field(fields::THREAD_NAME, thread.name()))
            .await?;
        for stale in existing.iter().filter(|b| !desired.contains(b.name())) {
            tracing::info!(
                thread = %thread.name(),
                binding = %stale.name(),
                "pruning MCP binding without a source"
            );
            client
                .delete::<ProjectMcpServerSpec>(thread.namespace(), stale.name())
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CopyToolsFromSource {
    fn name(&self) -> &'static str {
        "CopyToolsFromSource"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        let Some(source) = copy_source(thread).map(str::to_string) else {
            return Ok(Outcome::Converged);
        };
        if thread.status.copied_tools {
            return Ok(Outcome::Converged);
        }

        self.copy_tools(client, thread, &source).await?;
        self.copy_mcp_bindings(client, thread, &source).await?;

        thread.status.copied_tools = true;
        client.update_status(thread).await?;
        tracing::info!(thread = %thread.name(), source = %source, "copied tools from source");
        Ok(Outcome::Converged)
    }
}
