use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// A previously-raised failure, replayed verbatim to every later caller of the
/// same `(scope, key)` pair in an [`crate::onceler::Onceler`].
///
/// Cloning a `CachedFailure` is cheap: the inner error is shared, not copied.
#[derive(Clone)]
pub struct CachedFailure(pub(crate) Arc<dyn std::error::Error + Send + Sync + 'static>);

impl CachedFailure {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Display for CachedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CachedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CachedFailure({})", self.0)
    }
}

impl std::error::Error for CachedFailure {}

/// Errors raised by [`crate::multi_index::MultiIndex`].
#[derive(Error, Debug, Clone)]
pub enum MultiIndexError {
    #[error("index '{0}' does not exist")]
    UnknownIndex(String),
}

/// Errors raised by [`crate::onceler::Onceler::store_once`].
#[derive(Error, Debug, Clone)]
pub enum OncelerError {
    /// The thunk for this `(scope, key)` previously failed; the same failure
    /// is replayed to this caller instead of re-running the thunk.
    #[error("cached failure for {scope}:{key}: {source}")]
    Cached {
        scope: String,
        key: String,
        #[source]
        source: CachedFailure,
    },
    /// The same `(scope, key)` was previously completed with a different
    /// result type than the one requested here.
    #[error("onceler value for {0} was stored with a different type")]
    TypeMismatch(String),
}

/// Errors surfaced by a [`crate::node::Node`]'s worker loop.
///
/// Both variants carry the item's trace and a flattened snapshot of its
/// attributes at the time of failure, so the error handler (and whatever logs
/// it) can see the full lineage without re-deriving it.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The node's action failed, or returned a failure value.
    #[error("action failed at node(s) {trace:?}: {source}")]
    Action {
        trace: Vec<String>,
        attributes: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Broadcasting or forwarding a derivative/original item to a downstream
    /// node failed because the target had already stopped accepting work.
    #[error("enqueue to node '{target}' failed at node(s) {trace:?}: target is closed")]
    Enqueue {
        target: String,
        trace: Vec<String>,
        attributes: String,
    },
}

impl PipelineError {
    pub fn trace(&self) -> &[String] {
        match self {
            PipelineError::Action { trace, .. } => trace,
            PipelineError::Enqueue { trace, .. } => trace,
        }
    }
}
