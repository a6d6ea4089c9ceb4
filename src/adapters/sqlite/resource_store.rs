//! SQLite implementation of the ResourceStore.
//!
//! Objects live in `resources` as JSON columns. Index fields are stored twice:
//! as a JSON column so reads can rebuild the `RawObject`, and as rows in
//! `resource_fields` for field-selector queries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::broadcast;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FieldSelector, Kind, ObjectKey, ObjectMeta, RawObject};
use crate::domain::ports::{ChangeEvent, ChangeType, ResourceStore};

const CHANNEL_CAPACITY: usize = 1024;

const SELECT_COLUMNS: &str =
    "SELECT kind, namespace, name, resource_version, metadata, spec, status, fields FROM resources";

#[derive(Clone)]
pub struct SqliteResourceStore {
    pool: SqlitePool,
    events: broadcast::Sender<ChangeEvent>,
}

impl SqliteResourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { pool, events }
    }

    fn publish(&self, change: ChangeType, object: RawObject) {
        let _ = self.events.send(ChangeEvent { change, object });
    }

    async fn fetch(
        tx: &mut Transaction<'_, Sqlite>,
        key: &ObjectKey,
    ) -> DomainResult<Option<RawObject>> {
        let row: Option<ResourceRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE kind = ? AND namespace = ? AND name = ?"
        ))
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(ResourceRow::try_into_raw).transpose()
    }

    async fn write_fields(tx: &mut Transaction<'_, Sqlite>, object: &RawObject) -> DomainResult<()> {
        sqlx::query("DELETE FROM resource_fields WHERE kind = ? AND namespace = ? AND name = ?")
            .bind(object.kind.as_str())
            .bind(&object.metadata.namespace)
            .bind(&object.metadata.name)
            .execute(&mut **tx)
            .await?;

        for (field, value) in &object.fields {
            sqlx::query(
                "INSERT INTO resource_fields (kind, namespace, name, field, value)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(object.kind.as_str())
            .bind(&object.metadata.namespace)
            .bind(&object.metadata.name)
            .bind(field)
            .bind(value)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn remove(tx: &mut Transaction<'_, Sqlite>, key: &ObjectKey) -> DomainResult<()> {
        for table in ["resources", "resource_fields"] {
            sqlx::query(&format!(
                "DELETE FROM {table} WHERE kind = ? AND namespace = ? AND name = ?"
            ))
            .bind(key.kind.as_str())
            .bind(&key.namespace)
            .bind(&key.name)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Compare-and-swap on `resource_version`.
    async fn replace(
        tx: &mut Transaction<'_, Sqlite>,
        expected_version: u64,
        object: &RawObject,
    ) -> DomainResult<()> {
        let key = object.key();
        let result = sqlx::query(
            "UPDATE resources
             SET resource_version = ?, metadata = ?, spec = ?, status = ?, fields = ?
             WHERE kind = ? AND namespace = ? AND name = ? AND resource_version = ?",
        )
        .bind(object.metadata.resource_version as i64)
        .bind(serde_json::to_string(&object.metadata)?)
        .bind(serde_json::to_string(&object.spec)?)
        .bind(serde_json::to_string(&object.status)?)
        .bind(serde_json::to_string(&object.fields)?)
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(expected_version as i64)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(conflict(&key));
        }
        Ok(())
    }

    /// Load the stored object for a write and verify the caller's version.
    async fn load_for_write(
        tx: &mut Transaction<'_, Sqlite>,
        object: &RawObject,
    ) -> DomainResult<RawObject> {
        let key = object.key();
        let stored = Self::fetch(tx, &key)
            .await?
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))?;
        if stored.metadata.resource_version != object.metadata.resource_version {
            return Err(conflict(&key));
        }
        Ok(stored)
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
impl ResourceStore for SqliteResourceStore {
    async fn get(&self, key: &ObjectKey) -> DomainResult<RawObject> {
        let mut tx = self.pool.begin().await?;
        let object = Self::fetch(&mut tx, key).await?;
        tx.commit().await?;
        object.ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))
    }

    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &FieldSelector,
    ) -> DomainResult<Vec<RawObject>> {
        let mut sql = format!("{SELECT_COLUMNS} r WHERE kind = ?");
        if namespace.is_some() {
            sql.push_str(" AND namespace = ?");
        }
        for _ in &selector.terms {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM resource_fields f
                   WHERE f.kind = r.kind AND f.namespace = r.namespace AND f.name = r.name
                   AND f.field = ? AND f.value = ?)",
            );
        }
        sql.push_str(" ORDER BY namespace, name");
        if selector.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, ResourceRow>(&sql).bind(kind.as_str());
        if let Some(namespace) = namespace {
            query = query.bind(namespace);
        }
        for (field, value) in &selector.terms {
            query = query.bind(field).bind(value);
        }
        if let Some(limit) = selector.limit {
            query = query.bind(limit as i64);
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(ResourceRow::try_into_raw)
            .collect()
    }

    async fn create(&self, mut object: RawObject) -> DomainResult<RawObject> {
        object.metadata.resource_version = 1;
        object.metadata.deletion_timestamp = None;
        if object.metadata.creation_timestamp.is_none() {
            object.metadata.creation_timestamp = Some(Utc::now());
        }

        let mut tx = self.pool.begin().await?;
        let key = object.key();
        if Self::fetch(&mut tx, &key).await?.is_some() {
            return Err(DomainError::AlreadyExists {
                kind: key.kind,
                namespace: key.namespace,
                name: key.name,
            });
        }

        sqlx::query(
            "INSERT INTO resources (kind, namespace, name, resource_version, metadata, spec, status, fields)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(key.kind.as_str())
        .bind(&key.namespace)
        .bind(&key.name)
        .bind(1_i64)
        .bind(serde_json::to_string(&object.metadata)?)
        .bind(serde_json::to_string(&object.spec)?)
        .bind(serde_json::to_string(&object.status)?)
        .bind(serde_json::to_string(&object.fields)?)
        .execute(&mut *tx)
        .await?;
        Self::write_fields(&mut tx, &object).await?;
        tx.commit().await?;

        self.publish(ChangeType::Created, object.clone());
        Ok(object)
    }

    async fn update(&self, object: RawObject) -> DomainResult<RawObject> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::load_for_write(&mut tx, &object).await?;

        let mut next = stored.clone();
        next.metadata.annotations = object.metadata.annotations;
        next.metadata.finalizers = object.metadata.finalizers;
        next.metadata.resource_version += 1;
        next.spec = object.spec;
        next.fields = object.fields;

        if next.metadata.is_deleting() && next.metadata.finalizers.is_empty() {
            Self::remove(&mut tx, &next.key()).await?;
            tx.commit().await?;
            self.publish(ChangeType::Deleted, next.clone());
            return Ok(next);
        }

        Self::replace(&mut tx, stored.metadata.resource_version, &next).await?;
        Self::write_fields(&mut tx, &next).await?;
        tx.commit().await?;

        self.publish(ChangeType::Updated, next.clone());
        Ok(next)
    }

    async fn update_status(&self, object: RawObject) -> DomainResult<RawObject> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::load_for_write(&mut tx, &object).await?;

        let mut next = stored.clone();
        next.metadata.resource_version += 1;
        next.status = object.status;
        Self::replace(&mut tx, stored.metadata.resource_version, &next).await?;
        tx.commit().await?;

        self.publish(ChangeType::Updated, next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &ObjectKey) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::fetch(&mut tx, key)
            .await?
            .ok_or_else(|| DomainError::not_found(key.kind, &key.namespace, &key.name))?;

        if stored.metadata.finalizers.is_empty() {
            Self::remove(&mut tx, key).await?;
            tx.commit().await?;
            self.publish(ChangeType::Deleted, stored);
            return Ok(());
        }

        if stored.metadata.is_deleting() {
            return Ok(());
        }

        let mut marked = stored.clone();
        marked.metadata.deletion_timestamp = Some(Utc::now());
        marked.metadata.resource_version += 1;
        Self::replace(&mut tx, stored.metadata.resource_version, &marked).await?;
        tx.commit().await?;

        self.publish(ChangeType::Updated, marked);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    kind: String,
    namespace: String,
    name: String,
    resource_version: i64,
    metadata: String,
    spec: String,
    status: String,
    fields: String,
}

impl ResourceRow {
    fn try_into_raw(self) -> DomainResult<RawObject> {
        let kind = Kind::from_str(&self.kind)
            .ok_or_else(|| DomainError::Serialization(format!("Unknown resource kind: {}", self.kind)))?;
        let mut metadata: ObjectMeta = serde_json::from_str(&self.metadata)?;
        metadata.namespace = self.namespace;
        metadata.name = self.name;
        metadata.resource_version = self.resource_version as u64;
        let fields: BTreeMap<String, String> = serde_json::from_str(&self.fields)?;

        Ok(RawObject {
            kind,
            metadata,
            spec: serde_json::from_str(&self.spec)?,
            status: serde_json::from_str(&self.status)?,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::client::Client;
    use crate::domain::models::{
        fields, Run, RunSpec, RunState, Thread, ThreadSpec, Workspace, WorkspaceSpec,
        WORKSPACE_FINALIZER,
    };
    use std::sync::Arc;

    async fn setup() -> (SqliteResourceStore, Client) {
        let pool = create_migrated_test_pool().await.unwrap();
        let store = SqliteResourceStore::new(pool);
        (store.clone(), Client::new(Arc::new(store)))
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let (_, client) = setup().await;
        let mut thread = Thread::new(
            "default",
            "t1a",
            ThreadSpec {
                agent_name: Some("agentA".to_string()),
                ..Default::default()
            },
        );
        thread.metadata.annotations.insert("k".into(), "v".into());
        client.create(&mut thread).await.unwrap();

        let fetched: Thread = client.get("default", "t1a").await.unwrap();
        assert_eq!(fetched, thread);
        assert_eq!(fetched.metadata.resource_version, 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let (_, client) = setup().await;
        let mut thread = Thread::new("default", "t1a", ThreadSpec::default());
        client.create(&mut thread).await.unwrap();
        let err = client
            .create(&mut Thread::new("default", "t1a", ThreadSpec::default()))
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_version_conflict_on_stale_status() {
        let (_, client) = setup().await;
        let mut run = Run::new("default", "r1", RunSpec::default());
        client.create(&mut run).await.unwrap();

        let mut stale = run.clone();
        run.status.state = Some(RunState::Running);
        client.update_status(&mut run).await.unwrap();
        assert_eq!(run.metadata.resource_version, 2);

        stale.status.state = Some(RunState::Finished);
        assert!(client.update_status(&mut stale).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_field_selector_follows_spec_changes() {
        let (store, client) = setup().await;
        let mut run = Run::new(
            "default",
            "r1",
            RunSpec {
                thread_name: "t1a".to_string(),
                ..Default::default()
            },
        );
        client.create(&mut run).await.unwrap();

        let by_thread = |thread: &'static str| {
            FieldSelector::new().field(fields::THREAD_NAME, thread)
        };
        assert_eq!(
            store.list(Kind::Run, Some("default"), &by_thread("t1a")).await.unwrap().len(),
            1
        );

        run.spec.thread_name = "t1b".to_string();
        client.update(&mut run).await.unwrap();
        assert!(store
            .list(Kind::Run, Some("default"), &by_thread("t1a"))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store.list(Kind::Run, None, &by_thread("t1b")).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_finalizer_delete_flow() {
        let (store, client) = setup().await;
        let mut events = store.subscribe();
        let mut ws = Workspace::new("default", "wksp1-a", WorkspaceSpec::default())
            .with_finalizer(WORKSPACE_FINALIZER);
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

        let changes: Vec<ChangeType> = std::iter::from_fn(|| events.try_recv().ok())
            .map(|e| e.change)
            .collect();
        assert_eq!(
            changes,
            vec![ChangeType::Created, ChangeType::Updated, ChangeType::Deleted]
        );
    }
}
