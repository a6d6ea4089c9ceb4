//! Knowledge set provisioning for agent-bound threads.

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    KnowledgeSet, KnowledgeSetSpec, Thread, ThreadSpec, KNOWLEDGE_SET_FINALIZER,
};
use crate::services::ancestry;
use crate::services::convergence::create_if_not_exists;
use crate::services::naming::{safe_hash_concat_name, KNOWLEDGE_SET_PREFIX};

pub fn shared_knowledge_set_name(thread: &str) -> String {
    safe_hash_concat_name(&[KNOWLEDGE_SET_PREFIX, thread, "shared"])
}

// ============================================================================
// CreateKnowledgeSet
// ============================================================================

/// Creates the thread's shared knowledge set and publishes the ordered list
/// of sets the thread reads from: its own first, then every project ancestor
/// nearest to farthest.
///
/// A project copied from a source seeds its set from the source's shared
/// set instead of relating to ancestors. Status is written once, after all
/// lookups succeeded.
pub struct CreateKnowledgeSet;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CreateKnowledgeSet {
    fn name(&self) -> &'static str {
        "CreateKnowledgeSet"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if !thread.status.knowledge_set_names.is_empty() || thread.spec.agent_name.is_none() {
            return Ok(Outcome::Converged);
        }

        let (related, from) = if thread.copies_from_source() {
            let Some(source) = ancestry::source_thread(client, thread).await? else {
                return Ok(Outcome::Converged);
            };
            match source.status.shared_knowledge_set_name {
                Some(from) => (Vec::new(), Some(from)),
                None => return Ok(Outcome::Converged),
            }
        } else {
            match ancestry::parent_knowledge_set_names(client, thread).await? {
                Some(related) => (related, None),
                None => return Ok(Outcome::Converged),
            }
        };

        let name = thread
            .status
            .shared_knowledge_set_name
            .clone()
            .unwrap_or_else(|| shared_knowledge_set_name(thread.name()));
        let mut knowledge_set = KnowledgeSet::new(
            thread.namespace(),
            name,
            KnowledgeSetSpec {
                thread_name: Some(thread.name().to_string()),
                agent_name: None,
                related_knowledge_set_names: related.clone(),
                from_knowledge_set_name: from,
            },
        )
        .with_finalizer(KNOWLEDGE_SET_FINALIZER);
        if create_if_not_exists(client, &mut knowledge_set).await? {
            tracing::info!(
                thread = %thread.name(),
                knowledge_set = %knowledge_set.name(),
                related = ?related,
                "created shared knowledge set"
            );
        }

        let own = knowledge_set.name().to_string();
        let mut names = Vec::with_capacity(related.len() + 1);
        names.push(own.clone());
        names.extend(related);

        thread.status.shared_knowledge_set_name = Some(own);
        thread.status.knowledge_set_names = names;
        client.update_status(thread).await?;
        Ok(Outcome::Converged)
    }
}
