//! Bounded walks over the thread ownership graph.
//!
//! Threads point at their parents and sources by name only. Every walk here
//! re-reads the chain from the store and stops after [`MAX_CHAIN_DEPTH`]
//! hops, which also turns an accidental cycle into an error.

use crate::domain::client::Client;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentSpec, Thread, ThreadSpec};

pub const MAX_CHAIN_DEPTH: usize = 32;

/// Parents of `thread`, nearest first. Every parent must be a project.
/// A missing parent is an error, not a reason to wait: the name was set by
/// the API layer and the parent is expected to exist.
pub async fn project_ancestors(client: &Client, thread: &Thread) -> DomainResult<Vec<Thread>> {
    let mut ancestors = Vec::new();
    let mut next = thread.spec.parent_thread_name.clone();

    while let Some(parent_name) = next {
        if ancestors.len() >= MAX_CHAIN_DEPTH {
            return Err(DomainError::ChainTooDeep(thread.name().to_string()));
        }
        let parent: Thread = client.get(thread.namespace(), &parent_name).await?;
        if !parent.spec.project {
            return Err(DomainError::InvalidReference(format!(
                "parent thread {parent_name} is not a project"
            )));
        }
        next = parent.spec.parent_thread_name.clone();
        ancestors.push(parent);
    }

    Ok(ancestors)
}

/// Walk `parent_thread_name` to the top of the tree.
pub async fn root_thread(client: &Client, thread: Thread) -> DomainResult<Thread> {
    let start = thread.name().to_string();
    let mut current = thread;
    for _ in 0..MAX_CHAIN_DEPTH {
        let Some(parent_name) = current.spec.parent_thread_name.clone() else {
            return Ok(current);
        };
        current = client.get(current.namespace(), &parent_name).await?;
    }
    Err(DomainError::ChainTooDeep(start))
}

/// Workspaces `thread`'s own workspace is seeded from, farthest first.
///
/// `Ok(None)` means a dependency is not ready yet and the caller should
/// return without error; its own write will trigger another pass.
pub async fn parent_workspace_names(
    client: &Client,
    thread: &Thread,
) -> DomainResult<Option<Vec<String>>> {
    if thread.spec.project {
        // A project only starts from another workspace when copied.
        let Some(source_name) = &thread.spec.source_thread_name else {
            return Ok(Some(Vec::new()));
        };
        let source: Thread = client.get(thread.namespace(), source_name).await?;
        return Ok(source.status.workspace_name.map(|name| vec![name]));
    }

    let mut names = Vec::new();
    for parent in project_ancestors(client, thread).await? {
        match (&parent.status.workspace_name, parent.status.created) {
            (Some(name), true) => names.push(name.clone()),
            _ => return Ok(None),
        }
    }

    if let Some(agent_name) = &thread.spec.agent_name {
        let agent = client.get::<AgentSpec>(thread.namespace(), agent_name).await?;
        match agent.status.workspace_name {
            Some(name) => names.push(name),
            None => return Ok(None),
        }
    }

    names.reverse();
    Ok(Some(names))
}

/// Shared knowledge sets of every project ancestor, nearest first.
/// `Ok(None)` while an ancestor has not published its shared set yet.
pub async fn parent_knowledge_set_names(
    client: &Client,
    thread: &Thread,
) -> DomainResult<Option<Vec<String>>> {
    let mut names = Vec::new();
    for parent in project_ancestors(client, thread).await? {
        match parent.status.shared_knowledge_set_name {
            Some(name) => names.push(name),
            None => return Ok(None),
        }
    }
    Ok(Some(names))
}

/// The source thread of a copied thread, if it has one.
pub async fn source_thread(client: &Client, thread: &Thread) -> DomainResult<Option<Thread>> {
    match &thread.spec.source_thread_name {
        Some(name) => Ok(Some(client.get::<ThreadSpec>(thread.namespace(), name).await?)),
        None => Ok(None),
    }
}
