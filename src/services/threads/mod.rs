//! Convergence steps for Thread objects, in the order they are registered.

pub mod cleanup;
pub mod copy;
pub mod knowledge;
pub mod readiness;
pub mod template;
pub mod title;
pub mod workspace;

pub use cleanup::{CleanupEphemeralThreads, RemoveOldFinalizers};
pub use copy::{CopyTasksFromSource, CopyToolsFromSource};
pub use knowledge::{shared_knowledge_set_name, CreateKnowledgeSet};
pub use readiness::{is_ready, SetCreated};
pub use template::{EnsureTemplateShare, SnapshotUpgradeStatus};
pub use title::GenerateName;
pub use workspace::{shared_workspace_name, thread_workspace_name, CreateSharedWorkspace, CreateWorkspace};
