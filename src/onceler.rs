use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{CachedFailure, OncelerError};
use crate::multi_index::MultiIndex;

const RESULTS_INDEX: &str = "results";
const LOCKS_INDEX: &str = "locks";

#[derive(Clone)]
enum Outcome {
    Value(Arc<dyn Any + Send + Sync>),
    Failure(CachedFailure),
}

#[derive(Clone)]
enum Slot {
    Lock(Arc<Mutex<()>>),
    Outcome(Outcome),
}

/// Keyed once-only execution with cached values or cached failures.
///
/// Internally this is a single [`MultiIndex`] with two reserved index names,
/// `"locks"` and `"results"` — exactly the composition the spec describes —
/// unified under one `Slot` value type because a `MultiIndex` is generic over
/// a single value type per instance.
pub struct Onceler {
    registry: MultiIndex<String, Slot>,
}

impl Default for Onceler {
    fn default() -> Self {
        Self::new()
    }
}

impl Onceler {
    pub fn new() -> Self {
        let registry = MultiIndex::new();
        registry.create(RESULTS_INDEX);
        registry.create(LOCKS_INDEX);
        Self { registry }
    }

    /// Ensures `thunk` runs at most once for a given `(scope, key)` pair,
    /// caching the returned value or the returned failure for every
    /// subsequent caller.
    ///
    /// If this `(scope, key)` was previously completed with a different `T`
    /// than the one requested here, returns
    /// [`OncelerError::TypeMismatch`] rather than silently misinterpreting
    /// the cached bytes.
    pub fn store_once<T, E>(
        &self,
        scope: &str,
        key: &str,
        thunk: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, OncelerError>
    where
        T: Clone + Send + Sync + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let full_key = format!("{scope}:{key}");

        let (lock_slot, _) = self.registry.load_or_store(
            LOCKS_INDEX,
            full_key.clone(),
            Slot::Lock(Arc::new(Mutex::new(()))),
        );
        let lock = match lock_slot {
            Slot::Lock(lock) => lock,
            Slot::Outcome(_) => unreachable!("locks index never holds an Outcome slot"),
        };

        // Fast path: no lock held, just probe the cache.
        if let Some(outcome) = self.load_outcome(&full_key)? {
            return self.resolve(&full_key, outcome);
        }

        // Slow path: double-checked locking around the thunk invocation.
        let _guard = lock.lock();
        if let Some(outcome) = self.load_outcome(&full_key)? {
            return self.resolve(&full_key, outcome);
        }

        match thunk() {
            Ok(value) => {
                self.registry.store(
                    RESULTS_INDEX,
                    full_key,
                    Slot::Outcome(Outcome::Value(Arc::new(value.clone()))),
                );
                Ok(value)
            }
            Err(err) => {
                let failure = CachedFailure::new(err);
                self.registry.store(
                    RESULTS_INDEX,
                    full_key.clone(),
                    Slot::Outcome(Outcome::Failure(failure.clone())),
                );
                Err(OncelerError::Cached {
                    scope: scope.to_string(),
                    key: key.to_string(),
                    source: failure,
                })
            }
        }
    }

    fn load_outcome(&self, full_key: &str) -> Result<Option<Outcome>, OncelerError> {
        let slot = self
            .registry
            .load(RESULTS_INDEX, &full_key.to_string())
            .expect("results index is created in Onceler::new");
        Ok(slot.map(|slot| match slot {
            Slot::Outcome(outcome) => outcome,
            Slot::Lock(_) => unreachable!("results index never holds a Lock slot"),
        }))
    }

    fn resolve<T>(&self, full_key: &str, outcome: Outcome) -> Result<T, OncelerError>
    where
        T: Clone + Send + Sync + 'static,
    {
        match outcome {
            Outcome::Value(value) => value
                .downcast::<T>()
                .map(|v| (*v).clone())
                .map_err(|_| OncelerError::TypeMismatch(full_key.to_string())),
            Outcome::Failure(failure) => {
                let (scope, key) = full_key
                    .split_once(':')
                    .unwrap_or((full_key, ""));
                Err(OncelerError::Cached {
                    scope: scope.to_string(),
                    key: key.to_string(),
                    source: failure,
                })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn thunk_runs_once_and_caches_the_value() {
        let once = Onceler::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let calls = calls.clone();
            let value = once
                .store_once("S", "K", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Boom>(42)
                })
                .unwrap();
            assert_eq!(value, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_failure_is_replayed_to_every_caller() {
        let once = Arc::new(Onceler::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let once = once.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    once.store_once::<(), _>("S", "K", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err(Boom)
                    })
                })
            })
            .collect();

        let mut failures = 0;
        for h in handles {
            if h.join().unwrap().is_err() {
                failures += 1;
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(failures, 10);
    }

    #[test]
    fn type_mismatch_is_reported_not_ignored() {
        let once = Onceler::new();
        once.store_once("S", "K", || Ok::<i32, Boom>(1)).unwrap();
        let result = once.store_once::<String, Boom>("S", "K", || Ok("nope".to_string()));
        assert!(matches!(result, Err(OncelerError::TypeMismatch(_))));
    }

    #[test]
    fn distinct_keys_do_not_share_outcomes() {
        let once = Onceler::new();
        let a = once.store_once("S", "A", || Ok::<_, Boom>(1)).unwrap();
        let b = once.store_once("S", "B", || Ok::<_, Boom>(2)).unwrap();
        assert_eq!((a, b), (1, 2));
    }
}
