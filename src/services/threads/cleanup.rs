//! Thread housekeeping: expiry of ephemeral threads and finalizer migration.

use async_trait::async_trait;
use chrono::Utc;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Thread, ThreadSpec, DEPRECATED_THREAD_FINALIZERS};

// ============================================================================
// CleanupEphemeralThreads
// ============================================================================

/// Deletes ephemeral threads once they are older than the configured TTL.
/// Younger ephemeral threads are re-queued for the moment they expire.
pub struct CleanupEphemeralThreads {
    ttl: chrono::Duration,
}

impl CleanupEphemeralThreads {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self { ttl }
    }
}

#[async_trait]
impl ConvergenceStep<ThreadSpec> for CleanupEphemeralThreads {
    fn name(&self) -> &'static str {
        "CleanupEphemeralThreads"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if !thread.spec.ephemeral {
            return Ok(Outcome::Converged);
        }
        let Some(created) = thread.metadata.creation_timestamp else {
            return Ok(Outcome::Converged);
        };

        let age = Utc::now() - created;
        if age < self.ttl {
            let remaining = (self.ttl - age).to_std().unwrap_or_default();
            return Ok(Outcome::RequeueAfter(remaining));
        }

        tracing::info!(
            thread = %thread.name(),
            namespace = %thread.namespace(),
            age_hours = age.num_hours(),
            "deleting expired ephemeral thread"
        );
        client.delete::<ThreadSpec>(thread.namespace(), thread.name()).await?;
        Ok(Outcome::Converged)
    }
}

// ============================================================================
// RemoveOldFinalizers
// ============================================================================

/// Strips finalizer names older releases attached to threads.
pub struct RemoveOldFinalizers;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for RemoveOldFinalizers {
    fn name(&self) -> &'static str {
        "RemoveOldFinalizers"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        let before = thread.metadata.finalizers.len();
        thread
            .metadata
            .finalizers
            .retain(|f| !DEPRECATED_THREAD_FINALIZERS.contains(&f.as_str()));
        if thread.metadata.finalizers.len() == before {
            return Ok(Outcome::Converged);
        }

        client.update(thread).await?;
        tracing::debug!(thread = %thread.name(), "removed deprecated finalizers");
        Ok(Outcome::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryResourceStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (Arc<InMemoryResourceStore>, Client) {
        let store = Arc::new(InMemoryResourceStore::new());
        (store.clone(), Client::new(store))
    }

    #[tokio::test]
    async fn test_young_ephemeral_thread_is_requeued() {
        let (_, client) = setup();
        let mut thread = Thread::new("default", "t1e", ThreadSpec { ephemeral: true, ..Default::default() });
        client.create(&mut thread).await.unwrap();

        let step = CleanupEphemeralThreads::new(chrono::Duration::hours(12));
        let outcome = step.converge(&client, &mut thread).await.unwrap();
        match outcome {
            Outcome::RequeueAfter(after) => {
                assert!(after > Duration::from_secs(11 * 3600));
                assert!(after <= Duration::from_secs(12 * 3600));
            }
            Outcome::Converged => panic!("expected a requeue"),
        }
        assert!(client.try_get::<ThreadSpec>("default", "t1e").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_ephemeral_thread_is_deleted_once() {
        let (_, client) = setup();
        let mut thread = Thread::new("default", "t1e", ThreadSpec { ephemeral: true, ..Default::default() });
        client.create(&mut thread).await.unwrap();

        let step = CleanupEphemeralThreads::new(chrono::Duration::zero());
        step.converge(&client, &mut thread).await.unwrap();
        assert!(client.try_get::<ThreadSpec>("default", "t1e").await.unwrap().is_none());

        // Already gone is not an error.
        step.converge(&client, &mut thread).await.unwrap();
    }

    #[tokio::test]
    async fn test_deprecated_finalizers_removed_in_one_update() {
        let (store, client) = setup();
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        thread.metadata.finalizers = DEPRECATED_THREAD_FINALIZERS
            .iter()
            .map(|f| f.to_string())
            .chain(std::iter::once("threadloom.dev/keep".to_string()))
            .collect();
        client.create(&mut thread).await.unwrap();

        let before = store.write_count();
        RemoveOldFinalizers.converge(&client, &mut thread).await.unwrap();
        RemoveOldFinalizers.converge(&client, &mut thread).await.unwrap();
        assert_eq!(store.write_count(), before + 1);
        assert_eq!(thread.metadata.finalizers, vec!["threadloom.dev/keep".to_string()]);
    }
}
