//! Project template operations.
//!
//! A project has at most one template: a frozen copy of its manifest and
//! agent, published through a [`ThreadShare`]. The template and every
//! project copied from it carry a snapshot revision annotation; a copy whose
//! revision lags the template's is offered an upgrade.

use chrono::{SecondsFormat, Utc};

use crate::domain::client::Client;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    fields, FieldSelector, Kind, Thread, ThreadShare, ThreadShareSpec, ThreadSpec,
    TEMPLATE_SNAPSHOT_ANNOTATION,
};
use crate::services::ancestry;
use crate::services::naming::{generate_name, THREAD_PREFIX};

/// A template thread together with its public share, when one exists yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateView {
    pub thread: Thread,
    pub share: Option<ThreadShare>,
}

/// Current time as a snapshot revision, e.g. `2024-01-01T00:00:00Z`.
pub fn snapshot_revision_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Clone)]
pub struct TemplateService {
    client: Client,
}

impl TemplateService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn find_template(&self, namespace: &str, project: &str) -> DomainResult<Option<Thread>> {
        let mut found: Vec<Thread> = self
            .client
            .list(
                namespace,
                FieldSelector::new()
                    .field(fields::TEMPLATE, "true")
                    .field(fields::SOURCE_THREAD_NAME, project)
                    .limit(1),
            )
            .await?;
        Ok(found.pop())
    }

    async fn find_share(&self, namespace: &str, selector: FieldSelector) -> DomainResult<Option<ThreadShare>> {
        let mut found: Vec<ThreadShare> = self.client.list(namespace, selector.limit(1)).await?;
        Ok(found.pop())
    }

    /// Create or refresh the template of the project that `project` belongs to.
    pub async fn create_project_template(&self, namespace: &str, project: &str) -> DomainResult<Thread> {
        let thread: Thread = self.client.get(namespace, project).await?;
        let root = ancestry::root_thread(&self.client, thread).await?;
        if !root.spec.project || root.spec.template {
            return Err(DomainError::BadRequest(format!("invalid project {project}")));
        }

        if let Some(mut existing) = self.find_template(namespace, root.name()).await? {
            existing.spec.manifest = root.spec.manifest.clone();
            existing.spec.agent_name = root.spec.agent_name.clone();
            existing
                .metadata
                .annotations
                .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), snapshot_revision_now());
            self.client.update(&mut existing).await?;

            // Force the copy steps to run once more against the project.
            existing.status.copied_tools = false;
            existing.status.copied_tasks = false;
            self.client.update_status(&mut existing).await?;

            tracing::info!(project = %root.name(), template = %existing.name(), "refreshed project template");
            return Ok(existing);
        }

        let mut template = Thread::new(
            namespace,
            generate_name(THREAD_PREFIX),
            ThreadSpec {
                manifest: root.spec.manifest.clone(),
                agent_name: root.spec.agent_name.clone(),
                source_thread_name: Some(root.name().to_string()),
                user_id: root.spec.user_id.clone(),
                project: true,
                template: true,
                ..Default::default()
            },
        );
        template
            .metadata
            .annotations
            .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), snapshot_revision_now());
        self.client.create(&mut template).await?;

        tracing::info!(project = %root.name(), template = %template.name(), "created project template");
        Ok(template)
    }

    pub async fn get_project_template(&self, namespace: &str, project: &str) -> DomainResult<TemplateView> {
        let thread = self
            .find_template(namespace, project)
            .await?
            .ok_or_else(|| DomainError::not_found(Kind::Thread, namespace, project))?;
        let share = self
            .find_share(
                namespace,
                FieldSelector::new()
                    .field(fields::TEMPLATE, "true")
                    .field(fields::PROJECT_THREAD_NAME, thread.name()),
            )
            .await?;
        Ok(TemplateView { thread, share })
    }

    pub async fn delete_project_template(&self, namespace: &str, project: &str) -> DomainResult<()> {
        let template = self
            .find_template(namespace, project)
            .await?
            .ok_or_else(|| DomainError::not_found(Kind::Thread, namespace, project))?;
        self.client
            .delete::<ThreadSpec>(namespace, template.name())
            .await
    }

    /// Look a template up by the public ID of its share.
    pub async fn get_template(&self, namespace: &str, public_id: &str) -> DomainResult<TemplateView> {
        let share = self
            .find_share(
                namespace,
                FieldSelector::new()
                    .field(fields::PUBLIC_ID, public_id)
                    .field(fields::TEMPLATE, "true"),
            )
            .await?
            .ok_or_else(|| DomainError::not_found(Kind::ThreadShare, namespace, public_id))?;
        let thread = self
            .client
            .get::<ThreadSpec>(namespace, &share.spec.project_thread_name)
            .await?;
        Ok(TemplateView {
            thread,
            share: Some(share),
        })
    }

    /// Start a new project for `user_id` from the template published under
    /// `public_id`. The project starts at the template's snapshot revision.
    pub async fn copy_template(&self, namespace: &str, public_id: &str, user_id: &str) -> DomainResult<Thread> {
        let TemplateView { thread: template, .. } = self.get_template(namespace, public_id).await?;

        let mut project = Thread::new(
            namespace,
            generate_name(THREAD_PREFIX),
            ThreadSpec {
                manifest: template.spec.manifest.clone(),
                agent_name: template.spec.agent_name.clone(),
                source_thread_name: Some(template.name().to_string()),
                user_id: user_id.to_string(),
                project: true,
                ..Default::default()
            },
        );
        if let Some(revision) = template.snapshot_revision() {
            project
                .metadata
                .annotations
                .insert(TEMPLATE_SNAPSHOT_ANNOTATION.to_string(), revision.to_string());
        }
        self.client.create(&mut project).await?;

        tracing::info!(template = %template.name(), project = %project.name(), user = %user_id, "copied template");
        Ok(project)
    }
}

/// Public share record for `template`, named after it.
pub fn template_share(template: &Thread, public_id: &str) -> ThreadShare {
    ThreadShare::new(
        template.namespace(),
        template.name(),
        ThreadShareSpec {
            user_id: template.spec.user_id.clone(),
            project_thread_name: template.name().to_string(),
            template: true,
            featured: false,
            public: true,
            public_id: public_id.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryResourceStore;
    use crate::domain::models::ThreadManifest;
    use std::sync::Arc;

    fn service() -> (Client, TemplateService) {
        let client = Client::new(Arc::new(InMemoryResourceStore::new()));
        (client.clone(), TemplateService::new(client))
    }

    async fn project(client: &Client) -> Thread {
        let mut project = Thread::new(
            "default",
            "t1proj",
            ThreadSpec {
                project: true,
                user_id: "u1".to_string(),
                agent_name: Some("agentA".to_string()),
                manifest: ThreadManifest { name: "Research".to_string(), ..Default::default() },
                ..Default::default()
            },
        );
        client.create(&mut project).await.unwrap();
        project
    }

    #[test]
    fn test_snapshot_revision_has_seconds_precision() {
        let rev = snapshot_revision_now();
        assert!(rev.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&rev).is_ok());
        assert!(!rev.contains('.'));
    }

    #[tokio::test]
    async fn test_one_template_per_project() {
        let (client, templates) = service();
        let mut project = project(&client).await;

        let first = templates.create_project_template("default", "t1proj").await.unwrap();
        assert!(first.spec.template);
        assert_eq!(first.spec.source_thread_name.as_deref(), Some("t1proj"));
        assert!(first.snapshot_revision().is_some());

        project.spec.manifest.name = "Research v2".to_string();
        client.update(&mut project).await.unwrap();

        let second = templates.create_project_template("default", "t1proj").await.unwrap();
        assert_eq!(second.name(), first.name());
        assert_eq!(second.spec.manifest.name, "Research v2");
        assert!(!second.status.copied_tools && !second.status.copied_tasks);

        let all: Vec<Thread> = client
            .list("default", FieldSelector::new().field(fields::TEMPLATE, "true"))
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_child_thread_resolves_to_root_project() {
        let (client, templates) = service();
        project(&client).await;
        let mut child = Thread::new(
            "default",
            "t1child",
            ThreadSpec { parent_thread_name: Some("t1proj".to_string()), ..Default::default() },
        );
        client.create(&mut child).await.unwrap();

        let template = templates.create_project_template("default", "t1child").await.unwrap();
        assert_eq!(template.spec.source_thread_name.as_deref(), Some("t1proj"));
    }

    #[tokio::test]
    async fn test_template_of_template_is_rejected() {
        let (client, templates) = service();
        project(&client).await;
        let template = templates.create_project_template("default", "t1proj").await.unwrap();

        let err = templates
            .create_project_template("default", template.name())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_copy_carries_snapshot_revision() {
        let (client, templates) = service();
        project(&client).await;
        let template = templates.create_project_template("default", "t1proj").await.unwrap();
        let mut share = template_share(&template, "pub123");
        client.create(&mut share).await.unwrap();

        let view = templates.get_project_template("default", "t1proj").await.unwrap();
        assert_eq!(view.share.map(|s| s.spec.public_id), Some("pub123".to_string()));

        let copy = templates.copy_template("default", "pub123", "u2").await.unwrap();
        assert!(copy.spec.project && !copy.spec.template);
        assert_eq!(copy.spec.user_id, "u2");
        assert_eq!(copy.spec.source_thread_name.as_deref(), Some(template.name()));
        assert_eq!(copy.snapshot_revision(), template.snapshot_revision());
    }

    #[tokio::test]
    async fn test_missing_templates_are_not_found() {
        let (client, templates) = service();
        project(&client).await;

        assert!(templates
            .delete_project_template("default", "t1proj")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(templates
            .get_template("default", "nope")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
