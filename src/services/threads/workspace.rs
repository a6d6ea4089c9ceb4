//! Workspace provisioning for threads.

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Thread, ThreadRole, ThreadSpec, Workspace, WorkspaceSpec, WORKSPACE_FINALIZER,
};
use crate::services::ancestry;
use crate::services::convergence::create_if_not_exists;
use crate::services::naming::{safe_hash_concat_name, WORKSPACE_PREFIX};

pub fn thread_workspace_name(thread: &str) -> String {
    safe_hash_concat_name(&[WORKSPACE_PREFIX, thread])
}

pub fn shared_workspace_name(thread: &str) -> String {
    safe_hash_concat_name(&[WORKSPACE_PREFIX, thread, "shared"])
}

// ============================================================================
// CreateWorkspace
// ============================================================================

/// Resolves the thread's own workspace, creating it once the ancestor chain
/// it is seeded from is known, and mirrors its name and ID into status.
pub struct CreateWorkspace;

impl CreateWorkspace {
    async fn resolve(&self, client: &Client, thread: &Thread) -> DomainResult<Option<Workspace>> {
        let existing = thread
            .spec
            .workspace_name
            .as_ref()
            .or(thread.status.workspace_name.as_ref());
        if let Some(name) = existing {
            return client.get::<WorkspaceSpec>(thread.namespace(), name).await.map(Some);
        }

        let Some(parents) = ancestry::parent_workspace_names(client, thread).await? else {
            return Ok(None);
        };

        let mut workspace = Workspace::new(
            thread.namespace(),
            thread_workspace_name(thread.name()),
            WorkspaceSpec {
                thread_name: Some(thread.name().to_string()),
                agent_name: None,
                from_workspace_names: parents,
            },
        )
        .with_finalizer(WORKSPACE_FINALIZER);

        if create_if_not_exists(client, &mut workspace).await? {
            tracing::info!(
                thread = %thread.name(),
                workspace = %workspace.name(),
                parents = ?workspace.spec.from_workspace_names,
                "created workspace"
            );
        }
        Ok(Some(workspace))
    }
}

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CreateWorkspace {
    fn name(&self) -> &'static str {
        "CreateWorkspace"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        // System threads live for one task and never own storage.
        if thread.spec.system_task {
            return Ok(Outcome::Converged);
        }
        let Some(workspace) = self.resolve(client, thread).await? else {
            return Ok(Outcome::Converged);
        };

        let name = Some(workspace.name().to_string());
        let id = workspace.status.workspace_id.clone();
        if thread.status.workspace_name == name && thread.status.workspace_id == id {
            return Ok(Outcome::Converged);
        }

        thread.status.workspace_name = name;
        thread.status.workspace_id = id;
        client.update_status(thread).await?;
        Ok(Outcome::Converged)
    }
}

// ============================================================================
// CreateSharedWorkspace
// ============================================================================

/// Gives every project-based thread a shared workspace pointer.
///
/// User threads take their parent's. A project copied from a source takes
/// the source's. Any other project owns a shared workspace of its own.
pub struct CreateSharedWorkspace;

impl CreateSharedWorkspace {
    async fn inherited(&self, client: &Client, namespace: &str, from: &str) -> DomainResult<Option<String>> {
        let owner: Thread = client.get(namespace, from).await?;
        Ok(owner.status.shared_workspace_name)
    }
}

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CreateSharedWorkspace {
    fn name(&self) -> &'static str {
        "CreateSharedWorkspace"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if thread.status.shared_workspace_name.is_some() {
            return Ok(Outcome::Converged);
        }

        let shared = match (thread.role(), &thread.spec.parent_thread_name, &thread.spec.source_thread_name) {
            (ThreadRole::Standalone, _, _) => return Ok(Outcome::Converged),
            (ThreadRole::User, Some(parent), _) => {
                self.inherited(client, thread.namespace(), parent).await?
            }
            (ThreadRole::Project, _, Some(source)) => {
                self.inherited(client, thread.namespace(), source).await?
            }
            _ => {
                let mut workspace = Workspace::new(
                    thread.namespace(),
                    shared_workspace_name(thread.name()),
                    WorkspaceSpec {
                        thread_name: Some(thread.name().to_string()),
                        ..Default::default()
                    },
                )
                .with_finalizer(WORKSPACE_FINALIZER);
                if create_if_not_exists(client, &mut workspace).await? {
                    tracing::info!(
                        thread = %thread.name(),
                        workspace = %workspace.name(),
                        "created shared workspace"
                    );
                }
                Some(workspace.name().to_string())
            }
        };

        // Owner has no shared workspace yet; its own write re-triggers us.
        let Some(shared) = shared else {
            return Ok(Outcome::Converged);
        };

        thread.status.shared_workspace_name = Some(shared);
        client.update_status(thread).await?;
        Ok(Outcome::Converged)
    }
}
