use std::fmt;
use std::sync::Arc;

use crate::error::PipelineError;
use crate::node::Node;

/// Sets each node's `next` to its successor in `nodes`. No-op if fewer than
/// two nodes are given.
pub fn link<V>(nodes: &[Arc<Node<V>>])
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    for pair in nodes.windows(2) {
        pair[0].set_next(pair[1].clone());
    }
}

/// Spawns every node's worker loop on `runtime`.
///
/// Each [`Node`] retains its own join handle internally (see
/// [`Node::start`]), so unlike the source's `start_pipeline`, which returns a
/// list of futures to join separately, this returns nothing: [`gather`] and
/// [`stop`] operate directly on the nodes.
pub fn start<V>(runtime: &tokio::runtime::Handle, nodes: &[Arc<Node<V>>])
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    for node in nodes {
        node.start(runtime.clone());
    }
}

/// Sends sentinels to `nodes` in declaration order, waiting for each to
/// drain before moving on to the next, then surfaces the first unhandled
/// failure (the first node whose worker loop terminated because its error
/// handler returned `false`).
pub fn stop<V>(nodes: &[Arc<Node<V>>]) -> Result<(), PipelineError>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    let mut first_failure = None;
    for node in nodes {
        if let Err(err) = node.close() {
            if first_failure.is_none() {
                first_failure = Some(err);
            }
        }
    }
    match first_failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Waits for every already-`close`d node's worker loop, surfacing the first
/// unhandled failure. Prefer [`stop`], which both closes and gathers in
/// declaration order; `gather` exists for callers that close nodes
/// themselves (e.g. in a different order, or from several threads) and only
/// need to collect the results afterwards.
pub fn gather<V>(nodes: &[Arc<Node<V>>]) -> Result<(), PipelineError>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
{
    stop(nodes)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::node::Action;
    use crate::work_item::WorkItem;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn rt() -> tokio::runtime::Handle {
        use std::sync::OnceLock;
        static RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
        RUNTIME
            .get_or_init(|| tokio::runtime::Runtime::new().unwrap())
            .handle()
            .clone()
    }

    #[test]
    fn link_wires_each_node_to_its_successor() {
        let order = Arc::new(StdMutex::new(Vec::new()));

        let make = |name: &'static str| {
            let order = order.clone();
            Node::<i32>::new(
                name,
                Action::sync(move |_item: &WorkItem<i32>| {
                    order.lock().unwrap().push(name);
                    Ok(())
                }),
            )
        };
        let nodes = vec![make("a"), make("b"), make("c")];
        link(&nodes);

        start(&rt(), &nodes);
        nodes[0].enqueue(WorkItem::new()).unwrap();
        stop(&nodes).unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn stop_surfaces_the_first_unhandled_failure() {
        let failing = Node::<i32>::with_config(
            "failing",
            Action::sync(|_item: &WorkItem<i32>| Err("boom".into())),
            crate::config::NodeConfig {
                queue_capacity: 16,
                error_handler: Some(Arc::new(|_err: &PipelineError| false)),
            },
        );
        let nodes = vec![failing];
        start(&rt(), &nodes);
        nodes[0].enqueue(WorkItem::new()).unwrap();

        // Give the worker a moment to observe the failure and terminate
        // before we close it; close() still works correctly either way
        // since it only waits on the join handle.
        let result = stop(&nodes);
        assert!(result.is_err());
    }

    #[test]
    fn linear_pipeline_processes_every_item_exactly_once() {
        let total = Arc::new(AtomicUsize::new(0));
        let make_counter = |total: Arc<AtomicUsize>| {
            Node::<i32>::new(
                "counter",
                Action::sync(move |_item: &WorkItem<i32>| {
                    total.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
        };
        let nodes = vec![make_counter(total.clone())];
        start(&rt(), &nodes);
        for _ in 0..50 {
            nodes[0].enqueue(WorkItem::new()).unwrap();
        }
        stop(&nodes).unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 50);
    }
}
