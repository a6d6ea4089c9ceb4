//! Controller and watch registration.
//!
//! Builds the Thread, Run and Workflow controllers with their steps in
//! execution order and declares which changes re-trigger which objects.

use std::sync::Arc;

use super::dispatcher::{Controller, Dispatcher, Watch};
use crate::domain::models::{fields, Kind, RetentionConfig, RunSpec, ThreadSpec, WorkflowSpec};
use crate::domain::ports::Invoker;
use crate::services::ancestry::MAX_CHAIN_DEPTH;
use crate::services::runs::{DeleteFinished, DeleteRunState, Resume};
use crate::services::threads::{
    CleanupEphemeralThreads, CopyTasksFromSource, CopyToolsFromSource, CreateKnowledgeSet,
    CreateSharedWorkspace, CreateWorkspace, EnsureTemplateShare, GenerateName,
    RemoveOldFinalizers, SetCreated, SnapshotUpgradeStatus,
};
use crate::services::workflows::EnsureShared;

pub fn thread_controller(invoker: Arc<dyn Invoker>, retention: &RetentionConfig) -> Controller<ThreadSpec> {
    Controller::new()
        .step(RemoveOldFinalizers)
        .step(CleanupEphemeralThreads::new(retention.ephemeral_thread_ttl()))
        .step(CreateWorkspace)
        .step(CreateSharedWorkspace)
        .step(CreateKnowledgeSet)
        .step(CopyTasksFromSource)
        .step(CopyToolsFromSource)
        .step(EnsureTemplateShare)
        .step(SnapshotUpgradeStatus)
        .step(GenerateName::new(invoker))
        // Must stay last.
        .step(SetCreated)
}

pub fn run_controller(invoker: Arc<dyn Invoker>, retention: &RetentionConfig) -> Controller<RunSpec> {
    Controller::new()
        .step(Resume::new(invoker))
        .step(DeleteFinished::new(retention.finished_run_ttl()))
        .cleanup(DeleteRunState)
}

pub fn workflow_controller() -> Controller<WorkflowSpec> {
    Controller::new().step(EnsureShared)
}

/// Cross-kind triggers. A step that waits on another object relies on the
/// matching watch here to run again once that object changes.
pub fn watches() -> Vec<Watch> {
    vec![
        // Threads wait on every project above them, not just the parent.
        Watch::descendants(Kind::Thread, fields::PARENT_THREAD_NAME, MAX_CHAIN_DEPTH),
        // Copies wait on their source's shared resources and snapshot.
        Watch::dependents(Kind::Thread, Kind::Thread, fields::SOURCE_THREAD_NAME),
        // Workspace IDs are assigned after creation.
        Watch::owner(Kind::Workspace, Kind::Thread, fields::THREAD_NAME),
        Watch::owner(Kind::KnowledgeSet, Kind::Thread, fields::THREAD_NAME),
        Watch::dependents(Kind::Agent, Kind::Thread, fields::AGENT_NAME),
        Watch::owner(Kind::Run, Kind::Thread, fields::THREAD_NAME),
        // Runs wait for their thread to be created or aborted.
        Watch::dependents(Kind::Thread, Kind::Run, fields::THREAD_NAME),
        Watch::dependents(Kind::Thread, Kind::Workflow, fields::SOURCE_THREAD_NAME),
    ]
}

/// Register every controller and watch on `dispatcher`.
pub fn register_controllers(dispatcher: &mut Dispatcher, invoker: Arc<dyn Invoker>, retention: &RetentionConfig) {
    dispatcher.register(thread_controller(Arc::clone(&invoker), retention));
    dispatcher.register(run_controller(invoker, retention));
    dispatcher.register(workflow_controller());
    for watch in watches() {
        dispatcher.watch(watch);
    }
}
