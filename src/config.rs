use serde::{Deserialize, Serialize};

use crate::node::ErrorHandler;

/// Default bounded-queue capacity for a [`crate::node::Node`]'s inbound
/// channel, matching the spec's documented default.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Plain-data configuration for a single [`crate::node::Node`].
///
/// This crate does not load configuration from a file — external
/// configuration loading is explicitly out of scope for the pipeline
/// substrate — but the knobs a node exposes are still collected into one
/// `Default`-able struct rather than threaded through positional
/// constructor arguments, following the teacher's `Parameters`-style plain
/// config objects.
#[derive(Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Capacity of the node's bounded inbound queue.
    pub queue_capacity: usize,
    /// Error handler invoked when an action or a downstream enqueue fails.
    /// Not serializable; defaults to "log and keep running" when omitted.
    #[serde(skip, default)]
    pub error_handler: Option<ErrorHandler>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_handler: None,
        }
    }
}

impl std::fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeConfig")
            .field("queue_capacity", &self.queue_capacity)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

/// Plain-data configuration for an entire pipeline of nodes.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Default queue capacity applied to nodes that don't override it.
    pub default_queue_capacity: Option<usize>,
}

impl PipelineConfig {
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            queue_capacity: self
                .default_queue_capacity
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            error_handler: None,
        }
    }
}
