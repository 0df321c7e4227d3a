//! Fingerprint-keyed cache of built reference indexes.
//!
//! Reference documents are often uploaded repeatedly. The cache keeps the
//! most recent `capacity` indexes keyed by a SHA-256 fingerprint of the text
//! and every parameter that affects the index. Each key has its own
//! [`OnceCell`], so concurrent requests for the same reference share one
//! build and never observe a partially built index.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::config::RagConfig;
use crate::error::Result;
use crate::index::EmbeddingIndex;

type Slot = Arc<OnceCell<Arc<EmbeddingIndex>>>;

#[derive(Default)]
struct CacheState {
    slots: HashMap<String, Slot>,
    order: VecDeque<String>,
}

/// Bounded in-memory cache of [`EmbeddingIndex`] values.
///
/// A capacity of zero disables caching: every call builds a fresh index.
pub struct IndexCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl IndexCache {
    /// Create a cache holding at most `capacity` indexes.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, state: Mutex::new(CacheState::default()) }
    }

    /// Maximum number of cached indexes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of keys currently held, including builds still in progress.
    pub async fn len(&self) -> usize {
        self.state.lock().await.slots.len()
    }

    /// Whether the cache holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Return the index for `fingerprint`, building it with `build` if absent.
    ///
    /// At most one `build` runs per fingerprint at a time; other callers wait
    /// for it. If the build fails the error is returned to that caller and
    /// the key is released once no other caller is waiting on it, so the
    /// next caller builds again.
    ///
    /// # Errors
    ///
    /// Returns whatever error `build` returns.
    pub async fn get_or_build<F, Fut>(&self, fingerprint: &str, build: F) -> Result<Arc<EmbeddingIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EmbeddingIndex>>,
    {
        if self.capacity == 0 {
            return build().await.map(Arc::new);
        }

        let slot = self.slot(fingerprint).await;
        if let Some(index) = slot.get() {
            debug!(fingerprint, "index cache hit");
            return Ok(Arc::clone(index));
        }

        match slot.get_or_try_init(|| async move { build().await.map(Arc::new) }).await {
            Ok(index) => Ok(Arc::clone(index)),
            Err(e) => {
                self.release_failed(fingerprint, &slot).await;
                Err(e)
            }
        }
    }

    /// Drop the key of a failed build unless another caller still waits on it.
    async fn release_failed(&self, fingerprint: &str, slot: &Slot) {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        // Clones are only taken under the lock: one held by the map, one by us.
        let unused = state.slots.get(fingerprint).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(slot) <= 2
        });
        if unused {
            state.slots.remove(fingerprint);
            state.order.retain(|key| key != fingerprint);
            debug!(fingerprint, "released failed index build");
        }
    }

    /// Slots still being built are never evicted, so the cache may briefly
    /// hold more than `capacity` keys.
    async fn slot(&self, fingerprint: &str) -> Slot {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if let Some(slot) = state.slots.get(fingerprint) {
            return Arc::clone(slot);
        }

        while state.slots.len() >= self.capacity {
            let built = state
                .order
                .iter()
                .position(|key| state.slots.get(key).is_some_and(|slot| slot.initialized()));
            let Some(oldest) = built.and_then(|pos| state.order.remove(pos)) else { break };
            state.slots.remove(&oldest);
            debug!(evicted = %oldest, "index cache eviction");
        }

        let slot: Slot = Arc::new(OnceCell::new());
        state.slots.insert(fingerprint.to_string(), Arc::clone(&slot));
        state.order.push_back(fingerprint.to_string());
        slot
    }
}

impl std::fmt::Debug for IndexCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCache").field("capacity", &self.capacity).finish_non_exhaustive()
    }
}

/// Fingerprint of a reference text under the parameters that shape its index.
///
/// Two texts share a fingerprint only if the text, chunking parameters,
/// similarity metric and embedding provider all match.
pub fn fingerprint(text: &str, config: &RagConfig, provider: &str, dimensions: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(
        format!(
            "{}:{}:{}:{}:{}",
            config.chunk_size, config.chunk_overlap, config.similarity_metric, provider, dimensions
        )
        .as_bytes(),
    );
    format!("{:x}", hasher.finalize())
}
