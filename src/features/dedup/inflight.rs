//! # In-flight Registry
//!
//! At most one running future per key. Callers that arrive while work for
//! their key is running attach to it and receive a clone of its output.
//! Work runs on its own task, so it finishes even if every caller stops
//! waiting; the key is released before any caller observes the result.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InflightError {
    #[error("in-flight work ended without producing a result")]
    Abandoned,
}

type SharedOutput<T> = Shared<BoxFuture<'static, Result<T, InflightError>>>;

pub struct InflightRegistry<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    pending: Arc<DashMap<K, SharedOutput<T>>>,
}

impl<K, T> Clone for InflightRegistry<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<K, T> Default for InflightRegistry<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the key when the work task finishes, including on panic.
struct PendingGuard<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    pending: Arc<DashMap<K, SharedOutput<T>>>,
    key: K,
}

impl<K, T> Drop for PendingGuard<K, T>
where
    K: Eq + Hash,
    T: Clone,
{
    fn drop(&mut self) {
        self.pending.remove(&self.key);
    }
}

impl<K, T> InflightRegistry<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Run `work` for `key` unless work for that key is already running, in
    /// which case wait for that one instead. `work` is only called by the
    /// first caller.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<T, InflightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (shared, sender) = match self.pending.entry(key.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel::<T>();
                let shared = async move { rx.await.map_err(|_| InflightError::Abandoned) }
                    .boxed()
                    .shared();
                entry.insert(shared.clone());
                (shared, Some(tx))
            }
        };

        if let Some(tx) = sender {
            let guard = PendingGuard {
                pending: Arc::clone(&self.pending),
                key,
            };
            let fut = work();
            tokio::spawn(async move {
                let output = fut.await;
                drop(guard);
                // Nobody listening is fine: caches were already populated by `fut`
                let _ = tx.send(output);
            });
        }

        shared.await
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
