//! Idempotent write helpers shared by the convergence steps.

use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{Object, ResourceSpec};

/// Create `object` unless something already holds its name. On return
/// `object` reflects the stored state either way. Returns whether a write
/// happened.
pub async fn create_if_not_exists<S: ResourceSpec>(
    client: &Client,
    object: &mut Object<S>,
) -> DomainResult<bool> {
    if let Some(existing) = client.try_get::<S>(object.namespace(), object.name()).await? {
        *object = existing;
        return Ok(false);
    }

    match client.create(object).await {
        Ok(()) => Ok(true),
        Err(err) if err.is_already_exists() => {
            *object = client.get(object.namespace(), object.name()).await?;
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

/// Create `desired`, or bring an existing object's spec in line with it.
/// Writes only when the stored spec differs.
pub async fn create_or_update<S: ResourceSpec>(
    client: &Client,
    mut desired: Object<S>,
) -> DomainResult<Object<S>> {
    match client.try_get::<S>(desired.namespace(), desired.name()).await? {
        None => {
            client.create(&mut desired).await?;
            Ok(desired)
        }
        Some(mut existing) => {
            if existing.spec != desired.spec {
                existing.spec = desired.spec;
                client.update(&mut existing).await?;
            }
            Ok(existing)
        }
    }
}
