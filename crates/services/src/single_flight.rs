//! Collapses concurrent requests for the same key into one in-flight future.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

type Flight<V> = Shared<BoxFuture<'static, V>>;

/// Mutex-guarded map of in-flight computations keyed by cache key.
///
/// The computation itself is responsible for populating whatever cache the
/// caller consults in `lookup`; it must do so before resolving so that callers
/// arriving after the flight is retired see the cached value.
pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Flight<V>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Flight<V>>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys with an outstanding computation.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Join the flight for `key`, or answer from `lookup`, or start `make`.
    ///
    /// `lookup` runs under the in-flight lock, so a hit and a flight start
    /// can never race.
    pub async fn run<P, M, Fut>(&self, key: K, lookup: P, make: M) -> V
    where
        P: FnOnce() -> Option<V>,
        M: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let flight = {
            let mut inflight = self.lock();
            if let Some(existing) = inflight.get(&key) {
                debug!(?key, "joining in-flight request");
                existing.clone()
            } else if let Some(hit) = lookup() {
                return hit;
            } else {
                let started = make().boxed().shared();
                inflight.insert(key.clone(), started.clone());
                started
            }
        };

        let value = flight.clone().await;

        let mut inflight = self.lock();
        if inflight
            .get(&key)
            .is_some_and(|current| Shared::ptr_eq(current, &flight))
        {
            inflight.remove(&key);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let flights: Arc<SingleFlight<&'static str, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run("k", || None, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn cached_hit_skips_computation() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let out = flights
            .run(1, || Some(9), || async { 0 })
            .await;
        assert_eq!(out, 9);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let flights: SingleFlight<u8, u8> = SingleFlight::new();
        let a = flights.run(1, || None, || async { 1 });
        let b = flights.run(2, || None, || async { 2 });
        assert_eq!(futures::join!(a, b), (1, 2));
    }
}
