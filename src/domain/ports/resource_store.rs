use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FieldSelector, Kind, ObjectKey, RawObject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

/// Notification published after every successful write.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub change: ChangeType,
    /// The object after the write; for deletes, its last stored state.
    pub object: RawObject,
}

/// Repository port for the versioned object store.
///
/// Writes are checked against `metadata.resource_version`: a write carrying
/// a stale version fails with `DomainError::Conflict`. `update` replaces
/// metadata and spec; `update_status` replaces only the status. Both keep
/// their own view of the other half from the stored object.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Get an object; `DomainError::NotFound` if it does not exist.
    async fn get(&self, key: &ObjectKey) -> DomainResult<RawObject>;

    /// List objects of a kind, optionally restricted to a namespace.
    async fn list(
        &self,
        kind: Kind,
        namespace: Option<&str>,
        selector: &FieldSelector,
    ) -> DomainResult<Vec<RawObject>>;

    /// Create a new object; `DomainError::AlreadyExists` if the key is taken.
    async fn create(&self, object: RawObject) -> DomainResult<RawObject>;

    /// Update metadata and spec.
    async fn update(&self, object: RawObject) -> DomainResult<RawObject>;

    /// Update the status subresource.
    async fn update_status(&self, object: RawObject) -> DomainResult<RawObject>;

    /// Delete an object. Objects with finalizers are only marked for
    /// deletion and go away once an update clears the last finalizer.
    async fn delete(&self, key: &ObjectKey) -> DomainResult<()>;

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}
