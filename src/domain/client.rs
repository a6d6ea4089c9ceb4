//! Typed access to the resource store.
//!
//! Convergence steps work with `Object<S>` values; the client converts to and
//! from the store's `RawObject` and writes the stored version back into the
//! caller's object so a follow-up write carries the fresh resource version.

use std::sync::Arc;

use crate::domain::errors::{ignore_not_found, DomainResult};
use crate::domain::models::{FieldSelector, Object, ObjectKey, ResourceSpec};
use crate::domain::ports::ResourceStore;

#[derive(Clone)]
pub struct Client {
    store: Arc<dyn ResourceStore>,
}

impl Client {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Get an object; a missing object is `DomainError::NotFound`.
    pub async fn get<S: ResourceSpec>(&self, namespace: &str, name: &str) -> DomainResult<Object<S>> {
        let raw = self
            .store
            .get(&ObjectKey::new(S::KIND, namespace, name))
            .await?;
        Object::from_raw(raw)
    }

    /// Get an object, mapping a missing object to `None`.
    pub async fn try_get<S: ResourceSpec>(
        &self,
        namespace: &str,
        name: &str,
    ) -> DomainResult<Option<Object<S>>> {
        match self.get(namespace, name).await {
            Ok(object) => Ok(Some(object)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn list<S: ResourceSpec>(
        &self,
        namespace: &str,
        selector: FieldSelector,
    ) -> DomainResult<Vec<Object<S>>> {
        self.store
            .list(S::KIND, Some(namespace), &selector)
            .await?
            .into_iter()
            .map(Object::from_raw)
            .collect()
    }

    pub async fn create<S: ResourceSpec>(&self, object: &mut Object<S>) -> DomainResult<()> {
        let stored = self.store.create(object.to_raw()?).await?;
        *object = Object::from_raw(stored)?;
        Ok(())
    }

    pub async fn update<S: ResourceSpec>(&self, object: &mut Object<S>) -> DomainResult<()> {
        let stored = self.store.update(object.to_raw()?).await?;
        *object = Object::from_raw(stored)?;
        Ok(())
    }

    pub async fn update_status<S: ResourceSpec>(&self, object: &mut Object<S>) -> DomainResult<()> {
        let stored = self.store.update_status(object.to_raw()?).await?;
        *object = Object::from_raw(stored)?;
        Ok(())
    }

    /// Delete an object. Deleting something already gone succeeds.
    pub async fn delete<S: ResourceSpec>(&self, namespace: &str, name: &str) -> DomainResult<()> {
        ignore_not_found(
            self.store
                .delete(&ObjectKey::new(S::KIND, namespace, name))
                .await,
        )
    }
}
