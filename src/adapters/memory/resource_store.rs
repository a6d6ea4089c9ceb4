//! In-memory implementation of the ResourceStore.
//!
//! Keeps the same versioning, finalizer and notification rules as the SQLite
//! adapter. Every accepted write bumps a counter so tests can assert that a
//! convergence step performed no write.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FieldSelector, Kind, ObjectKey, RawObject};
use crate::domain::ports::{ChangeEvent, ChangeType, ResourceStore};

const CHANNEL_CAPACITY: usize = 1024;

pub struct InMemoryResourceStore {
    objects: RwLock<HashMap<ObjectKey, RawObject>>,
    events: broadcast::Sender<ChangeEvent>,
    writes: AtomicU64,
}

impl Default for InMemoryResourceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            objects: RwLock::new(HashMap::new()),
            events,
            writes: AtomicU64::new(0),
        }
    }

    /// Number of accepted writes since creation.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn publish(&self, change: ChangeType, object: RawObject) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.events.send(ChangeEvent { change, object });
    }
}

fn conflict(key: &ObjectKey) -> DomainError {
    DomainError::Conflict {
        kind: key.kind,
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    }
}

#[async_trait]
impl ResourceStore for InMemoryResourceStore {
    async fn get(&self, key: &ObjectKey) -> DomainResult<RawObject> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &FieldSelector,
    ) -> DomainResult<Vec<RawObject>> {
        let objects = self.objects.read().await;
        let mut matched: Vec<RawObject> = objects
            .values()
            .filter(|o| o.kind == kind)
            .filter(|o| namespace.map_or(true, |ns| o.metadata.namespace == ns))
            .filter(|o| selector.matches(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.key().cmp(&b.key()));
        if let Some(limit) = selector.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn create(&self, mut object: RawObject) -> DomainResult<RawObject> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(DomainError::AlreadyExists {
                kind: key.kind,
                namespace: key.namespace,
                name: key.name,
            });
        }

        object.metadata.resource_version = 1;
        object.metadata.deletion_timestamp = None;
        if object.metadata.creation_timestamp.is_none() {
            object.metadata.creation_timestamp = Some(Utc::now());
        }
        objects.insert(key, object.clone());
        drop(objects);

        self.publish(ChangeType::Created, object.clone());
        Ok(object)
    }

    async fn update(&self, object: RawObject) -> DomainResult<RawObject> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))?;
        if stored.metadata.resource_version != object.metadata.resource_version {
            return Err(conflict(&key));
        }

        let mut next = stored.clone();
        next.metadata.annotations = object.metadata.annotations;
        next.metadata.finalizers = object.metadata.finalizers;
        next.metadata.resource_version += 1;
        next.spec = object.spec;
        next.fields = object.fields;

        if next.metadata.is_deleting() && next.metadata.finalizers.is_empty() {
            objects.remove(&key);
            drop(objects);
            self.publish(ChangeType::Deleted, next.clone());
            return Ok(next);
        }

        objects.insert(key, next.clone());
        drop(objects);
        self.publish(ChangeType::Updated, next.clone());
        Ok(next)
    }

    async fn update_status(&self, object: RawObject) -> DomainResult<RawObject> {
        let key = object.key();
        let mut objects = self.objects.write().await;
        let stored = objects
            .get(&key)
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))?;
        if stored.metadata.resource_version != object.metadata.resource_version {
            return Err(conflict(&key));
        }

        let mut next = stored.clone();
        next.metadata.resource_version += 1;
        next.status = object.status;
        objects.insert(key, next.clone());
        drop(objects);

        self.publish(ChangeType::Updated, next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &ObjectKey) -> DomainResult<()> {
        let mut objects = self.objects.write().await;
        let stored = objects
            .get_mut(key)
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))?;

        if stored.metadata.finalizers.is_empty() {
            let removed = objects.remove(key);
            drop(objects);
            if let Some(removed) = removed {
                self.publish(ChangeType::Deleted, removed);
            }
            return Ok(());
        }

        if stored.metadata.is_deleting() {
            return Ok(());
        }
        stored.metadata.deletion_timestamp = Some(Utc::now());
        stored.metadata.resource_version += 1;
        let marked = stored.clone();
        drop(objects);

        self.publish(ChangeType::Updated, marked);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::Client;
    use crate::domain::models::{fields, Thread, ThreadSpec, Workspace, WorkspaceSpec};
    use std::sync::Arc;

    fn client() -> (Arc<InMemoryResourceStore>, Client) {
        let store = Arc::new(InMemoryResourceStore::new());
        (store.clone(), Client::new(store))
    }

    #[tokio::test]
    async fn test_create_assigns_version_and_rejects_duplicates() {
        let (_, client) = client();
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        client.create(&mut thread).await.unwrap();
        assert_eq!(thread.metadata.resource_version, 1);
        assert!(thread.metadata.creation_timestamp.is_some());

        let mut again = Thread::new("default", "t1a", ThreadSpec::default());
        let err = client.create(&mut again).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_stale_write_is_a_conflict() {
        let (_, client) = client();
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        client.create(&mut thread).await.unwrap();

        let mut stale = thread.clone();
        thread.status.created = true;
        client.update_status(&mut thread).await.unwrap();

        stale.status.copied_tools = true;
        let err = client.update_status(&mut stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_status_and_spec_are_written_independently() {
        let (_, client) = client();
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        client.create(&mut thread).await.unwrap();

        let mut with_status = thread.clone();
        with_status.status.created = true;
        // A spec change in the same object must not leak through update_status.
        with_status.spec.abort = true;
        client.update_status(&mut with_status).await.unwrap();
        assert!(with_status.status.created);
        assert!(!with_status.spec.abort);

        with_status.spec.abort = true;
        with_status.status.created = false;
        client.update(&mut with_status).await.unwrap();
        assert!(with_status.spec.abort);
        assert!(with_status.status.created);
    }

    #[tokio::test]
    async fn test_finalizers_hold_deletion_until_cleared() {
        let (store, client) = client();
        let mut ws = Workspace::new("default", "wksp1-a", WorkspaceSpec::default())
            .with_finalizer("threadloom.dev/workspace");
        client.create(&mut ws).await.unwrap();

        client.delete::<WorkspaceSpec>("default", "wksp1-a").await.unwrap();
        let mut marked: Workspace = client.get("default", "wksp1-a").await.unwrap();
        assert!(marked.metadata.is_deleting());

        marked.metadata.finalizers.clear();
        client.update(&mut marked).await.unwrap();
        assert!(client
            .try_get::<WorkspaceSpec>("default", "wksp1-a")
            .await
            .unwrap()
            .is_none());

        let before = store.write_count();
        client.delete::<WorkspaceSpec>("default", "wksp1-a").await.unwrap();
        assert_eq!(store.write_count(), before);
    }

    #[tokio::test]
    async fn test_list_filters_by_index_and_limit() {
        let (_, client) = client();
        for (name, source) in [("t1a", "t1src"), ("t1b", "t1src"), ("t1c", "t1other")] {
            let mut t = Thread::new(
                "default",
                name,
                ThreadSpec {
                    source_thread_name: Some(source.to_string()),
                    ..Default::default()
                },
            );
            client.create(&mut t).await.unwrap();
        }

        let derived: Vec<Thread> = client
            .list(
                "default",
                FieldSelector::new().field(fields::SOURCE_THREAD_NAME, "t1src"),
            )
            .await
            .unwrap();
        assert_eq!(derived.len(), 2);

        let limited: Vec<Thread> = client
            .list(
                "default",
                FieldSelector::new()
                    .field(fields::SOURCE_THREAD_NAME, "t1src")
                    .limit(1),
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_are_published() {
        let (store, client) = client();
        let mut rx = store.subscribe();
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        client.create(&mut thread).await.unwrap();
        client.delete::<ThreadSpec>("default", "t1a").await.unwrap();

        let created = rx.recv().await.unwrap();
        assert_eq!(created.change, ChangeType::Created);
        let deleted = rx.recv().await.unwrap();
        assert_eq!(deleted.change, ChangeType::Deleted);
        assert_eq!(deleted.object.metadata.name, "t1a");
    }
}
