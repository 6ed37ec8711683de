//! A traced, queue-backed concurrent pipeline substrate.
//!
//! A [`pipeline`]'s building block is a [`node::Node`]: a worker owning a
//! bounded inbound queue and an [`node::Action`], running on its own
//! dedicated OS thread, forwarding to an optional linear successor and
//! fanning out to an optional named set of broadcast targets. Work items
//! ([`work_item::WorkItem`]) carry a keyed attribute store shared across
//! every derivative copy of the same origin, plus an append-only trace of
//! the node identities they've visited.
//!
//! [`multi_index::MultiIndex`] is the thread-safe, multi-namespace registry
//! that backs both `WorkItem`'s per-derivative attribute stores and
//! [`onceler::Onceler`]'s locks-and-results bookkeeping.
//! [`aggregator`] is a ready-made terminal action for collecting throughput
//! statistics at the end of a pipeline.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod multi_index;
pub mod node;
pub mod onceler;
pub mod ordered_sequence;
pub mod pipeline;
pub mod work_item;

pub use aggregator::{aggregate_action, SuperlativeTimes, Stats};
pub use config::{NodeConfig, PipelineConfig};
pub use error::{MultiIndexError, OncelerError, PipelineError};
pub use multi_index::MultiIndex;
pub use node::{Action, ActionOutcome, AsyncAction, ErrorHandler, Node, NodeState};
pub use onceler::Onceler;
pub use ordered_sequence::OrderedSequence;
pub use pipeline::{gather, link, start, stop};
pub use work_item::WorkItem;
