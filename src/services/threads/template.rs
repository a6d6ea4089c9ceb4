//! Template bookkeeping on threads.

use async_trait::async_trait;

use crate::application::dispatcher::{ConvergenceStep, Outcome};
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Thread, ThreadSpec};
use crate::services::convergence::create_if_not_exists;
use crate::services::naming::random_token;
use crate::services::templates::template_share;

// ============================================================================
// EnsureTemplateShare
// ============================================================================

/// Every template thread has exactly one public share, named after the
/// thread, carrying an unguessable public ID.
pub struct EnsureTemplateShare;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for EnsureTemplateShare {
    fn name(&self) -> &'static str {
        "EnsureTemplateShare"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if !thread.spec.template {
            return Ok(Outcome::Converged);
        }

        let mut share = template_share(thread, &random_token());
        if create_if_not_exists(client, &mut share).await? {
            tracing::info!(
                thread = %thread.name(),
                public_id = %share.spec.public_id,
                "created template share"
            );
        }
        Ok(Outcome::Converged)
    }
}

// ============================================================================
// SnapshotUpgradeStatus
// ============================================================================

/// Flags projects copied from a template whose snapshot revision no longer
/// matches the template's.
pub struct SnapshotUpgradeStatus;

#[async_trait]
impl ConvergenceStep<ThreadSpec> for SnapshotUpgradeStatus {
    fn name(&self) -> &'static str {
        "SnapshotUpgradeStatus"
    }

    async fn converge(&self, client: &Client, thread: &mut Thread) -> DomainResult<Outcome> {
        if !thread.spec.project {
            return Ok(Outcome::Converged);
        }
        let Some(source_name) = thread.spec.source_thread_name.clone() else {
            return Ok(Outcome::Converged);
        };

        // Templates are never nested, so one hop reaches the template.
        let source: Thread = client.get(thread.namespace(), &source_name).await?;
        if !source.spec.template {
            return Ok(Outcome::Converged);
        }

        let desired = match source.snapshot_revision() {
            Some(template_rev) => thread.snapshot_revision() != Some(template_rev),
            None => false,
        };
        if thread.status.snapshot_upgrade_available == desired {
            return Ok(Outcome::Converged);
        }

        thread.status.snapshot_upgrade_available = desired;
        client.update_status(thread).await?;
        tracing::debug!(thread = %thread.name(), available = desired, "updated snapshot upgrade status");
        Ok(Outcome::Converged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryResourceStore;
    use crate::domain::models::{ThreadShare, TEMPLATE_SNAPSHOT_ANNOTATION};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryResourceStore>, Client) {
        let store = Arc::new(InMemoryResourceStore::new());
        (store.clone(), Client::new(store))
    }

    fn annotated(name: &str, spec: ThreadSpec, revision: Option<&str>) -> Thread {
        let mut thread = Thread::new("default", name, spec);
        if let Some(rev) = revision {
            thread
                .metadata
                .annotations
                .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), rev.to_string());
        }
        thread
    }

    #[tokio::test]
    async fn test_template_share_created_once() {
        let (store, client) = setup();
        let mut template = Thread::new(
            "default",
            "t1tmpl",
            ThreadSpec { project: true, template: true, user_id: "u1".to_string(), ..Default::default() },
        );
        client.create(&mut template).await.unwrap();

        EnsureTemplateShare.converge(&client, &mut template).await.unwrap();
        let share: ThreadShare = client.get("default", "t1tmpl").await.unwrap();
        assert!(share.spec.public && share.spec.template);
        assert_eq!(share.spec.public_id.len(), 32);
        assert!(!share.spec.public_id.contains('-'));

        let before = store.write_count();
        EnsureTemplateShare.converge(&client, &mut template).await.unwrap();
        assert_eq!(store.write_count(), before);
        let again: ThreadShare = client.get("default", "t1tmpl").await.unwrap();
        assert_eq!(again.spec.public_id, share.spec.public_id);
    }

    #[tokio::test]
    async fn test_newer_template_snapshot_flags_upgrade() {
        let (store, client) = setup();
        let mut template = annotated(
            "t1tmpl",
            ThreadSpec { project: true, template: true, ..Default::default() },
            Some("2024-01-01T00:00:00Z"),
        );
        client.create(&mut template).await.unwrap();
        let mut project = annotated(
            "t1proj",
            ThreadSpec {
                project: true,
                source_thread_name: Some("t1tmpl".to_string()),
                ..Default::default()
            },
            Some("2023-12-01T00:00:00Z"),
        );
        client.create(&mut project).await.unwrap();

        SnapshotUpgradeStatus.converge(&client, &mut project).await.unwrap();
        assert!(project.status.snapshot_upgrade_available);

        let before = store.write_count();
        SnapshotUpgradeStatus.converge(&client, &mut project).await.unwrap();
        assert_eq!(store.write_count(), before);

        project
            .metadata
            .annotations
            .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), "2024-01-01T00:00:00Z".to_string());
        client.update(&mut project).await.unwrap();
        SnapshotUpgradeStatus.converge(&client, &mut project).await.unwrap();
        assert!(!project.status.snapshot_upgrade_available);
    }

    #[tokio::test]
    async fn test_source_that_is_not_a_template_is_ignored() {
        let (store, client) = setup();
        let mut source = annotated(
            "t1src",
            ThreadSpec { project: true, ..Default::default() },
            Some("2024-01-01T00:00:00Z"),
        );
        client.create(&mut source).await.unwrap();
        let mut project = annotated(
            "t1proj",
            ThreadSpec {
                project: true,
                source_thread_name: Some("t1src".to_string()),
                ..Default::default()
            },
            None,
        );
        client.create(&mut project).await.unwrap();

        let before = store.write_count();
        SnapshotUpgradeStatus.converge(&client, &mut project).await.unwrap();
        assert_eq!(store.write_count(), before);
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let (_, client) = setup();
        let mut project = annotated(
            "t1proj",
            ThreadSpec {
                project: true,
                source_thread_name: Some("t1gone".to_string()),
                ..Default::default()
            },
            None,
        );
        client.create(&mut project).await.unwrap();

        let err = SnapshotUpgradeStatus.converge(&client, &mut project).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
