//! Port trait definitions (Hexagonal Architecture)
//!
//! - ResourceStore: the versioned, watchable object store
//! - Invoker: executes runs and system tasks
//!
//! Adapters for the store live in `crate::adapters`; the invoker is external.

pub mod invoker;
pub mod null_invoker;
pub mod resource_store;

pub use invoker::{Invoker, SystemTaskOptions, TaskHandle, ToolDef};
pub use null_invoker::NullInvoker;
pub use resource_store::{ChangeEvent, ChangeType, ResourceStore};
