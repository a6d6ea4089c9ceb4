//! Change-driven dispatcher for convergence steps.
//!
//! Every write to the store produces a change event. The dispatcher maps the
//! event to the keys that need another pass (the object itself plus whatever
//! [`Watch`] declarations point at) and feeds them through a [`WorkQueue`]
//! drained by a fixed pool of workers. A pass runs every step registered for
//! the key's kind, in registration order.
//!
//! Steps signal "not ready yet" by returning [`Outcome::Converged`] without
//! writing. The write that makes them ready will trigger them again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::work_queue::WorkQueue;
use crate::domain::client::Client;
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    DispatcherConfig, FieldSelector, Kind, Object, ObjectKey, RawObject, ResourceSpec,
};
use crate::domain::ports::{ChangeEvent, ChangeType};

/// Result of a successful convergence pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Converged,
    /// Run the key again after this long even if nothing changes.
    RequeueAfter(Duration),
}

impl Outcome {
    /// Combine two outcomes, keeping the earliest requeue.
    pub fn merge(self, other: Outcome) -> Outcome {
        match (self, other) {
            (Outcome::Converged, o) | (o, Outcome::Converged) => o,
            (Outcome::RequeueAfter(a), Outcome::RequeueAfter(b)) => Outcome::RequeueAfter(a.min(b)),
        }
    }
}

/// One idempotent step towards the desired state of an object.
#[async_trait]
pub trait ConvergenceStep<S: ResourceSpec>: Send + Sync {
    fn name(&self) -> &'static str;

    /// `object` is freshly read; steps that write leave the stored state in it.
    async fn converge(&self, client: &Client, object: &mut Object<S>) -> DomainResult<Outcome>;
}

/// Runs after an object has left the store, with its last stored state.
#[async_trait]
pub trait CleanupStep<S: ResourceSpec>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn cleanup(&self, client: &Client, object: &Object<S>) -> DomainResult<()>;
}

/// Type-erased per-kind entry point used by the dispatcher.
#[async_trait]
pub trait Reconciler: Send + Sync {
    fn kind(&self) -> Kind;

    async fn reconcile(
        &self,
        client: &Client,
        key: &ObjectKey,
        tombstone: Option<RawObject>,
    ) -> DomainResult<Outcome>;
}

/// Ordered steps for one resource kind.
pub struct Controller<S: ResourceSpec> {
    steps: Vec<Box<dyn ConvergenceStep<S>>>,
    cleanups: Vec<Box<dyn CleanupStep<S>>>,
}

impl<S: ResourceSpec> Default for Controller<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ResourceSpec> Controller<S> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            cleanups: Vec::new(),
        }
    }

    pub fn step(mut self, step: impl ConvergenceStep<S> + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn cleanup(mut self, step: impl CleanupStep<S> + 'static) -> Self {
        self.cleanups.push(Box::new(step));
        self
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl<S: ResourceSpec> Reconciler for Controller<S> {
    fn kind(&self) -> Kind {
        S::KIND
    }

    async fn reconcile(
        &self,
        client: &Client,
        key: &ObjectKey,
        tombstone: Option<RawObject>,
    ) -> DomainResult<Outcome> {
        let mut outcome = Outcome::Converged;

        for step in &self.steps {
            let Some(mut object) = client.try_get::<S>(&key.namespace, &key.name).await? else {
                break;
            };
            let span = tracing::debug_span!(
                "converge",
                step = step.name(),
                kind = %key.kind,
                namespace = %key.namespace,
                name = %key.name,
            );
            let result = step.converge(client, &mut object).instrument(span).await?;
            outcome = outcome.merge(result);
        }

        if let Some(raw) = tombstone {
            if client.try_get::<S>(&key.namespace, &key.name).await?.is_none() {
                let object = Object::<S>::from_raw(raw)?;
                for step in &self.cleanups {
                    let span = tracing::debug_span!(
                        "cleanup",
                        step = step.name(),
                        kind = %key.kind,
                        namespace = %key.namespace,
                        name = %key.name,
                    );
                    step.cleanup(client, &object).instrument(span).await?;
                }
            }
        }

        Ok(outcome)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchTarget {
    /// The changed object names its target in one of its own index fields.
    Owner,
    /// Targets name the changed object in one of their index fields.
    Dependents,
    /// Like `Dependents`, repeated on each level found, down to `max_depth`.
    Descendants { max_depth: usize },
}

/// Declares that a change on one kind should re-trigger another kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    from: Kind,
    to: Kind,
    field: &'static str,
    target: WatchTarget,
}

impl Watch {
    /// A change on a `from` object re-triggers the `to` object named by its
    /// `field` (e.g. a Run re-triggers its Thread via `spec.threadName`).
    pub fn owner(from: Kind, to: Kind, field: &'static str) -> Self {
        Self {
            from,
            to,
            field,
            target: WatchTarget::Owner,
        }
    }

    /// A change on a `from` object re-triggers every `to` object whose
    /// `field` holds its name (e.g. a Thread re-triggers its children via
    /// `spec.parentThreadName`).
    pub fn dependents(from: Kind, to: Kind, field: &'static str) -> Self {
        Self {
            from,
            to,
            field,
            target: WatchTarget::Dependents,
        }
    }

    /// Same-kind transitive form of [`Watch::dependents`]: a change on an
    /// object re-triggers its children, their children, and so on, up to
    /// `max_depth` levels. Used where a step waits on a distant ancestor.
    pub fn descendants(kind: Kind, field: &'static str, max_depth: usize) -> Self {
        Self {
            from: kind,
            to: kind,
            field,
            target: WatchTarget::Descendants { max_depth },
        }
    }

    async fn dependents_of(&self, client: &Client, namespace: &str, name: &str) -> DomainResult<Vec<ObjectKey>> {
        let selector = FieldSelector::new().field(self.field, name);
        Ok(client
            .store()
            .list(self.to, Some(namespace), &selector)
            .await?
            .iter()
            .map(RawObject::key)
            .collect())
    }

    async fn targets(&self, client: &Client, object: &RawObject) -> DomainResult<Vec<ObjectKey>> {
        let namespace = &object.metadata.namespace;
        match self.target {
            WatchTarget::Owner => Ok(object
                .field(self.field)
                .filter(|name| !name.is_empty())
                .map(|name| vec![ObjectKey::new(self.to, namespace, name)])
                .unwrap_or_default()),
            WatchTarget::Dependents => self.dependents_of(client, namespace, &object.metadata.name).await,
            WatchTarget::Descendants { max_depth } => {
                let mut seen = HashSet::from([object.key()]);
                let mut found = Vec::new();
                let mut level = vec![object.metadata.name.clone()];
                for _ in 0..max_depth {
                    let mut next = Vec::new();
                    for name in &level {
                        for key in self.dependents_of(client, namespace, name).await? {
                            if seen.insert(key.clone()) {
                                next.push(key.name.clone());
                                found.push(key);
                            }
                        }
                    }
                    if next.is_empty() {
                        break;
                    }
                    level = next;
                }
                Ok(found)
            }
        }
    }
}

struct RetryState {
    attempts: u32,
    backoff: ExponentialBackoff,
}

pub struct Dispatcher {
    client: Client,
    config: DispatcherConfig,
    reconcilers: HashMap<Kind, Arc<dyn Reconciler>>,
    watches: Vec<Watch>,
    queue: Arc<WorkQueue>,
    retries: Mutex<HashMap<ObjectKey, RetryState>>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(client: Client, config: DispatcherConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            client,
            config,
            reconcilers: HashMap::new(),
            watches: Vec::new(),
            queue: Arc::new(WorkQueue::new()),
            retries: Mutex::new(HashMap::new()),
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Register the controller for a kind. A later registration for the
    /// same kind replaces the earlier one.
    pub fn register(&mut self, reconciler: impl Reconciler + 'static) {
        self.reconcilers.insert(reconciler.kind(), Arc::new(reconciler));
    }

    pub fn watch(&mut self, watch: Watch) {
        self.watches.push(watch);
    }

    pub fn kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self.reconcilers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn enqueue(&self, key: ObjectKey) {
        if self.reconcilers.contains_key(&key.kind) {
            self.queue.add(key);
        }
    }

    /// Run one pass for `key` right now, outside the queue.
    pub async fn reconcile(&self, key: &ObjectKey) -> DomainResult<Outcome> {
        let Some(reconciler) = self.reconcilers.get(&key.kind) else {
            return Ok(Outcome::Converged);
        };
        let outcome = reconciler
            .reconcile(&self.client, key, self.queue.tombstone(key))
            .await?;
        self.queue.clear_tombstone(key);
        Ok(outcome)
    }

    /// Start the event loop and the workers. Existing objects of every
    /// registered kind get an initial pass.
    pub async fn start(self: &Arc<Self>) -> DomainResult<()> {
        // Subscribe before listing so nothing written in between is missed.
        let events = self.client.store().subscribe();
        self.resync().await?;

        let mut handles = Vec::with_capacity(self.config.workers + 1);
        handles.push(tokio::spawn(Arc::clone(self).event_loop(events)));
        for worker in 0..self.config.workers.max(1) {
            handles.push(tokio::spawn(Arc::clone(self).worker(worker)));
        }
        self.lock_handles().extend(handles);

        tracing::info!(
            workers = self.config.workers.max(1),
            kinds = ?self.kinds(),
            "dispatcher started"
        );
        Ok(())
    }

    /// Stop the dispatcher. Passes already running are allowed to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.queue.shut_down();
        let handles: Vec<_> = self.lock_handles().drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(err) = result {
                tracing::error!(error = %err, "dispatcher task failed");
            }
        }
        tracing::info!("dispatcher stopped");
    }

    fn lock_handles(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn resync(&self) -> DomainResult<()> {
        for kind in self.kinds() {
            for object in self
                .client
                .store()
                .list(kind, None, &FieldSelector::new())
                .await?
            {
                self.queue.add(object.key());
            }
        }
        Ok(())
    }

    async fn handle_event(&self, event: ChangeEvent) {
        let ChangeEvent { change, object } = event;
        let key = object.key();

        if self.reconcilers.contains_key(&key.kind) {
            if change == ChangeType::Deleted {
                self.queue.set_tombstone(object.clone());
            }
            self.queue.add(key.clone());
        }

        for watch in self.watches.iter().filter(|w| w.from == key.kind) {
            match watch.targets(&self.client, &object).await {
                Ok(targets) => targets.into_iter().for_each(|target| self.enqueue(target)),
                Err(err) => tracing::warn!(
                    error = %err,
                    from = %watch.from,
                    to = %watch.to,
                    object = %key,
                    "failed to resolve watch targets"
                ),
            }
        }
    }

    async fn event_loop(self: Arc<Self>, mut events: tokio::sync::broadcast::Receiver<ChangeEvent>) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "change events dropped, resyncing");
                        if let Err(err) = self.resync().await {
                            tracing::error!(error = %err, "resync failed");
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = shutdown.changed() => {}
            }
        }
    }

    async fn worker(self: Arc<Self>, id: usize) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow() {
                break;
            }
            let key = tokio::select! {
                key = self.queue.next() => key,
                _ = shutdown.changed() => continue,
            };

            match self.reconcile(&key).await {
                Ok(outcome) => {
                    self.forget(&key);
                    if let Outcome::RequeueAfter(delay) = outcome {
                        tracing::debug!(worker = id, object = %key, ?delay, "requeue scheduled");
                        self.queue.add_after(key.clone(), delay);
                    }
                }
                Err(err) => self.retry(&key, &err.to_string()),
            }
            self.queue.done(&key);
        }
    }

    fn new_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build()
    }

    fn forget(&self, key: &ObjectKey) {
        self.lock_retries().remove(key);
    }

    fn retry(&self, key: &ObjectKey, error: &str) {
        let mut retries = self.lock_retries();
        let state = retries.entry(key.clone()).or_insert_with(|| RetryState {
            attempts: 0,
            backoff: self.new_backoff(),
        });
        state.attempts += 1;

        if state.attempts > self.config.max_retries {
            tracing::error!(
                object = %key,
                attempts = state.attempts,
                error,
                "giving up on object after repeated failures"
            );
            retries.remove(key);
            return;
        }

        let delay = state
            .backoff
            .next_backoff()
            .unwrap_or(Duration::from_millis(self.config.max_backoff_ms));
        tracing::warn!(
            object = %key,
            attempt = state.attempts,
            ?delay,
            error,
            "convergence pass failed, retrying"
        );
        drop(retries);
        self.queue.add_after(key.clone(), delay);
    }

    fn lock_retries(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, RetryState>> {
        self.retries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
