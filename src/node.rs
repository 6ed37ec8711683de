use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::config::NodeConfig;
use crate::error::PipelineError;
use crate::work_item::WorkItem;

/// What a node's action returns: `Ok(())` on success, or the failure that
/// occurred while processing the item.
pub type ActionOutcome = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A synchronous action: runs inline on the node's dedicated worker thread.
pub type SyncActionFn<V> = Arc<dyn Fn(&WorkItem<V>) -> ActionOutcome + Send + Sync>;

/// An asynchronous action, driven to completion via
/// `tokio::runtime::Handle::block_on` from the node's worker thread.
///
/// Takes the item by value (rather than by reference) because it must be
/// moved into a `'static` future; [`WorkItem`] is cheap to clone for exactly
/// this reason.
#[async_trait]
pub trait AsyncAction<V>: Send + Sync {
    async fn call(&self, item: WorkItem<V>) -> ActionOutcome;
}

/// Adapts a plain `async fn`/closure into an [`AsyncAction`].
pub struct FnAsyncAction<F>(F);

impl<F> FnAsyncAction<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<V, F, Fut> AsyncAction<V> for FnAsyncAction<F>
where
    V: Send + Sync + 'static,
    F: Fn(WorkItem<V>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ActionOutcome> + Send,
{
    async fn call(&self, item: WorkItem<V>) -> ActionOutcome {
        (self.0)(item).await
    }
}

/// The "action is sync or async" capability split: a node dispatches on this
/// enum rather than on an inheritance hierarchy.
#[derive(Clone)]
pub enum Action<V> {
    Sync(SyncActionFn<V>),
    Async(Arc<dyn AsyncAction<V>>),
}

impl<V> Action<V> {
    pub fn sync(f: impl Fn(&WorkItem<V>) -> ActionOutcome + Send + Sync + 'static) -> Self {
        Action::Sync(Arc::new(f))
    }

    pub fn r#async<F, Fut>(f: F) -> Self
    where
        V: Send + Sync + 'static,
        F: Fn(WorkItem<V>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ActionOutcome> + Send + 'static,
    {
        Action::Async(Arc::new(FnAsyncAction::new(f)))
    }
}

/// `Fn(&PipelineError) -> bool`; `true` = continue the worker loop, `false`
/// = propagate the error and terminate the worker.
pub type ErrorHandler = Arc<dyn Fn(&PipelineError) -> bool + Send + Sync>;

/// The default error handler: logs via `tracing::error!` and keeps running.
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &PipelineError| {
        error!(trace = ?err.trace(), "an error occurred during queue execution: {err}");
        true
    })
}

/// Lifecycle states a [`Node`] moves through, in order, never backwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeState {
    Created,
    Running,
    Draining,
    Stopped,
}

/// A worker owning a bounded inbound queue, an action, an optional `next`
/// link, and an optional named broadcast map to downstream nodes.
///
/// Also known, in the spec's terms, as a `QueueController`.
pub struct Node<V> {
    identity: String,
    sender: SyncSender<Option<WorkItem<V>>>,
    receiver: Mutex<Option<Receiver<Option<WorkItem<V>>>>>,
    action: Action<V>,
    next: ArcSwapOption<Node<V>>,
    broadcast: ArcSwap<HashMap<String, Arc<Node<V>>>>,
    error_handler: ErrorHandler,
    state: Mutex<NodeState>,
    worker: Mutex<Option<JoinHandle<Result<(), PipelineError>>>>,
}

impl<V> Node<V>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    pub fn new(identity: impl Into<String>, action: Action<V>) -> Arc<Self> {
        Self::with_config(identity, action, NodeConfig::default())
    }

    pub fn with_config(
        identity: impl Into<String>,
        action: Action<V>,
        config: NodeConfig,
    ) -> Arc<Self> {
        let (sender, receiver) = sync_channel(config.queue_capacity);
        Arc::new(Self {
            identity: identity.into(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            action,
            next: ArcSwapOption::empty(),
            broadcast: ArcSwap::from_pointee(HashMap::new()),
            error_handler: config.error_handler.unwrap_or_else(default_error_handler),
            state: Mutex::new(NodeState::Created),
            worker: Mutex::new(None),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Establishes the sole successor for linear forwarding. Must be called
    /// before [`Node::start`]; wiring after start is not supported.
    pub fn set_next(&self, next: Arc<Node<V>>) {
        self.next.store(Some(next));
    }

    /// Establishes named fan-out targets, keyed by the derivative label the
    /// broadcast copy will carry. Must be called before [`Node::start`].
    pub fn set_broadcast(&self, targets: HashMap<String, Arc<Node<V>>>) {
        self.broadcast.store(Arc::new(targets));
    }

    /// Enqueues `item`, blocking if the bounded queue is full.
    ///
    /// # Errors
    /// Returns [`PipelineError::Enqueue`] if this node has already stopped
    /// accepting work.
    pub fn enqueue(&self, item: WorkItem<V>) -> Result<(), PipelineError> {
        self.sender.send(Some(item)).map_err(|_| PipelineError::Enqueue {
            target: self.identity.clone(),
            trace: Vec::new(),
            attributes: String::new(),
        })
    }

    /// Spawns the worker loop on a dedicated OS thread named after this
    /// node's identity, moving `Created` to `Running`.
    pub fn start(self: &Arc<Self>, runtime: tokio::runtime::Handle) {
        let receiver = self
            .receiver
            .lock()
            .take()
            .expect("Node::start called more than once");
        *self.state.lock() = NodeState::Running;

        let node = self.clone();
        let handle = thread::Builder::new()
            .name(format!("node-{}", node.identity))
            .spawn(move || node.run(receiver, runtime))
            .expect("failed to spawn node worker thread");
        *self.worker.lock() = Some(handle);
    }

    /// Enqueues a sentinel and blocks until the worker thread has joined,
    /// i.e. until every item enqueued before the sentinel (and the sentinel
    /// itself) has been fully processed. A second call is a no-op.
    ///
    /// Returns the worker loop's terminal result: `Err` only if the error
    /// handler returned `false` for some item.
    pub fn close(&self) -> Result<(), PipelineError> {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };
        *self.state.lock() = NodeState::Draining;
        // A node that was never enqueued into still needs its sentinel so
        // the worker thread's blocking recv() can observe end-of-stream.
        let _ = self.sender.send(None);
        let result = handle.join().unwrap_or_else(|panic| {
            error!(node = %self.identity, "worker thread panicked: {panic:?}");
            Ok(())
        });
        *self.state.lock() = NodeState::Stopped;
        result
    }

    fn run(
        self: Arc<Self>,
        receiver: Receiver<Option<WorkItem<V>>>,
        runtime: tokio::runtime::Handle,
    ) -> Result<(), PipelineError> {
        debug!(node = %self.identity, "worker thread started");
        while let Ok(Some(item)) = receiver.recv() {
            item.append_trace(self.identity.clone());
            if let Err(err) = self.process(&item, &runtime) {
                if !(self.error_handler)(&err) {
                    warn!(node = %self.identity, "error handler requested shutdown");
                    return Err(err);
                }
            }
        }
        debug!(node = %self.identity, "worker thread stopped");
        Ok(())
    }

    fn process(&self, item: &WorkItem<V>, runtime: &tokio::runtime::Handle) -> Result<(), PipelineError> {
        let outcome = match &self.action {
            Action::Sync(f) => f(item),
            Action::Async(action) => runtime.block_on(action.call(item.clone())),
        };

        // Broadcast happens unconditionally once the action completes, even
        // if it failed; only forwarding to `next` is gated on success.
        for (label, target) in self.broadcast.load().iter() {
            target
                .enqueue(item.derivative_copy(label.clone()))
                .map_err(|_| self.enqueue_failure(item, &target.identity))?;
        }

        if let Err(source) = outcome {
            return Err(self.annotate(item, source));
        }

        if let Some(next) = self.next.load().as_ref() {
            next.enqueue(item.clone())
                .map_err(|_| self.enqueue_failure(item, &next.identity))?;
        }

        Ok(())
    }

    fn annotate(&self, item: &WorkItem<V>, source: Box<dyn std::error::Error + Send + Sync>) -> PipelineError {
        PipelineError::Action {
            trace: item.trace(),
            attributes: format!("{:?}", item.snapshot_all()),
            source,
        }
    }

    fn enqueue_failure(&self, item: &WorkItem<V>, target: &str) -> PipelineError {
        PipelineError::Enqueue {
            target: target.to_string(),
            trace: item.trace(),
            attributes: format!("{:?}", item.snapshot_all()),
        }
    }
}
