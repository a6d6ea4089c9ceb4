//! Common test utilities for integration tests
//!
//! Store fixtures, a recording invoker, and helpers that play the part of
//! the external workspace and agent controllers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use threadloom::adapters::memory::InMemoryResourceStore;
use threadloom::application::dispatcher::{ConvergenceStep, Outcome, Reconciler};
use threadloom::application::registration::thread_controller;
use threadloom::domain::models::{
    Agent, AgentSpec, FieldSelector, Kind, ObjectKey, RetentionConfig, Run, Thread, ThreadSpec,
    Workspace, WorkspaceSpec,
};
use threadloom::domain::ports::{Invoker, NullInvoker, SystemTaskOptions, TaskHandle, ToolDef};
use threadloom::domain::{Client, DomainResult};

pub const NS: &str = "default";

pub fn memory_store() -> (Arc<InMemoryResourceStore>, Client) {
    let store = Arc::new(InMemoryResourceStore::new());
    (store.clone(), Client::new(store))
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub async fn create_thread(client: &Client, name: &str, spec: ThreadSpec) -> Thread {
    let mut thread = Thread::new(NS, name, spec);
    client.create(&mut thread).await.expect("create thread");
    thread
}

pub async fn get_thread(client: &Client, name: &str) -> Thread {
    client.get(NS, name).await.expect("get thread")
}

pub fn project() -> ThreadSpec {
    ThreadSpec {
        project: true,
        user_id: "u1".to_string(),
        ..Default::default()
    }
}

pub fn child_of(parent: &str) -> ThreadSpec {
    ThreadSpec {
        parent_thread_name: Some(parent.to_string()),
        user_id: "u1".to_string(),
        ..Default::default()
    }
}

/// An agent whose own workspace is already provisioned.
pub async fn create_agent(client: &Client, name: &str) -> Agent {
    let mut agent = Agent::new(NS, name, AgentSpec::default());
    client.create(&mut agent).await.expect("create agent");
    agent.status.workspace_name = Some(format!("wksp1-{name}"));
    client.update_status(&mut agent).await.expect("update agent");
    agent
}

/// Stand-in for the storage provider: give every workspace without a
/// content address one. Returns how many were assigned.
pub async fn assign_workspace_ids(client: &Client) -> usize {
    let workspaces: Vec<Workspace> = client
        .list(NS, FieldSelector::new())
        .await
        .expect("list workspaces");
    let mut assigned = 0;
    for mut workspace in workspaces {
        if workspace.status.workspace_id.is_none() {
            workspace.status.workspace_id = Some(format!("id-{}", workspace.name()));
            client.update_status(&mut workspace).await.expect("assign id");
            assigned += 1;
        }
    }
    assigned
}

/// The same assignment as a controller step, for dispatcher-driven tests.
pub struct AssignWorkspaceId;

#[async_trait]
impl ConvergenceStep<WorkspaceSpec> for AssignWorkspaceId {
    fn name(&self) -> &'static str {
        "AssignWorkspaceId"
    }

    async fn converge(&self, client: &Client, workspace: &mut Workspace) -> DomainResult<Outcome> {
        if workspace.status.workspace_id.is_none() {
            workspace.status.workspace_id = Some(format!("id-{}", workspace.name()));
            client.update_status(workspace).await?;
        }
        Ok(Outcome::Converged)
    }
}

/// Run the registered thread controller once per name, in order.
pub async fn converge_threads(client: &Client, names: &[&str]) {
    let controller = thread_controller(Arc::new(NullInvoker::new()), &RetentionConfig::default());
    for name in names {
        controller
            .reconcile(client, &ObjectKey::new(Kind::Thread, NS, *name), None)
            .await
            .expect("thread pass");
    }
}

/// Alternate passes and workspace assignment until nothing changes.
pub async fn settle(client: &Client, names: &[&str]) {
    for _ in 0..8 {
        converge_threads(client, names).await;
        if assign_workspace_ids(client).await == 0 {
            converge_threads(client, names).await;
            return;
        }
    }
}

/// Poll `check` every 20ms until it holds or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

/// Invoker that records which runs it resumed.
#[derive(Default)]
pub struct RecordingInvoker {
    resumed: Mutex<Vec<String>>,
    system_tasks: AtomicUsize,
}

impl RecordingInvoker {
    pub fn resumed(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }

    pub fn system_tasks(&self) -> usize {
        self.system_tasks.load(Ordering::SeqCst)
    }
}

struct FixedOutput(String);

#[async_trait]
impl TaskHandle for FixedOutput {
    async fn result(&self) -> DomainResult<String> {
        Ok(self.0.clone())
    }

    fn close(&self) {}
}

#[async_trait]
impl Invoker for RecordingInvoker {
    async fn resume(&self, _client: &Client, _thread: &Thread, run: &Run) -> DomainResult<()> {
        self.resumed.lock().unwrap().push(run.name().to_string());
        Ok(())
    }

    async fn system_task(
        &self,
        _thread: &Thread,
        _tool: &ToolDef,
        _input: &str,
        _options: SystemTaskOptions,
    ) -> DomainResult<Box<dyn TaskHandle>> {
        self.system_tasks.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FixedOutput("  Weekly planning  ".to_string())))
    }
}
