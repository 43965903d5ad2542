//! Thread-safe wrapper for sharing an engine between threads.
//!
//! `SyncClusteringEngine` wraps [`ClusteringEngine`] in `Arc<RwLock<..>>`. Readers run
//! concurrently; a batch holds the write lock from its first item until the coarsest
//! level has settled, so a reader either sees the pyramid before the batch or after it.
//!
//! Enable the `sync` feature (on by default) to use this module.
//!
//! # Examples
//!
//! ```rust
//! use spatio_cluster::{ClusterItem, Config, SyncClusteringEngine};
//! use geo::Point;
//! use std::sync::mpsc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine: SyncClusteringEngine<u32> =
//!     SyncClusteringEngine::new(Config::with_fixed_cell_size(0, 4, 25.0, 4))?;
//!
//! let (sender, receiver) = mpsc::channel();
//! let items = (0..100)
//!     .map(|i| ClusterItem::new(format!("p{}", i), Point::new(i as f64, i as f64), i))
//!     .collect();
//! let handle = engine.spawn_add_items(items, sender);
//!
//! for event in receiver {
//!     println!("{:?}", event);
//! }
//! let summary = handle.join().expect("clustering thread panicked");
//!
//! assert_eq!(summary.total_features, 100);
//! assert_eq!(engine.read(|engine| engine.item_count()), 100);
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::engine::{BatchSummary, ClusterSummary, ClusteringEngine, EngineState};
use crate::error::Result;
use crate::progress::{
    CancellationToken, ChannelObserver, NoProgress, ProgressEvent, ProgressObserver,
};
use bytes::Bytes;
use geo::Rect;
use parking_lot::RwLock;
use spatio_cluster_types::{ClusterItem, ZoomLevel};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

/// Thread-safe handle to a [`ClusteringEngine`].
///
/// Clones share the same engine. [`state`](Self::state) can be polled without
/// blocking, even while a batch holds the write lock.
pub struct SyncClusteringEngine<P = Bytes> {
    inner: Arc<RwLock<ClusteringEngine<P>>>,
    clustering: Arc<AtomicBool>,
}

impl<P> Clone for SyncClusteringEngine<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            clustering: Arc::clone(&self.clustering),
        }
    }
}

/// Raises the clustering flag for the lifetime of a write.
struct ClusteringFlag<'a>(&'a AtomicBool);

impl<'a> ClusteringFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ClusteringFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P> SyncClusteringEngine<P> {
    pub fn new(config: Config) -> Result<Self> {
        ClusteringEngine::new(config).map(Self::from_engine)
    }

    pub fn from_engine(engine: ClusteringEngine<P>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
            clustering: Arc::new(AtomicBool::new(false)),
        }
    }

    // ===== Writes =====

    pub fn add_items<I>(&self, items: I) -> BatchSummary
    where
        I: IntoIterator<Item = ClusterItem<P>>,
    {
        self.add_items_with(items, &mut NoProgress, &CancellationToken::new())
    }

    pub fn add_items_with<I, O>(
        &self,
        items: I,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> BatchSummary
    where
        I: IntoIterator<Item = ClusterItem<P>>,
        O: ProgressObserver + ?Sized,
    {
        self.write(|engine| engine.add_items_with(items, observer, cancel))
    }

    pub fn remove_items<I, K>(&self, keys: I) -> BatchSummary
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.write(|engine| engine.remove_items(keys))
    }

    pub fn remove_all_items(&self) {
        self.write(ClusteringEngine::remove_all_items)
    }

    pub fn rebuild(&self) -> BatchSummary {
        self.write(ClusteringEngine::rebuild)
    }

    fn write<R>(&self, f: impl FnOnce(&mut ClusteringEngine<P>) -> R) -> R {
        let mut engine = self.inner.write();
        let _flag = ClusteringFlag::raise(&self.clustering);
        f(&mut engine)
    }

    // ===== Reads =====

    /// Run `f` against a consistent view of the engine.
    ///
    /// Blocks while a batch is being applied.
    pub fn read<R>(&self, f: impl FnOnce(&ClusteringEngine<P>) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn summaries_at_zoom_level(&self, zoom: ZoomLevel) -> Vec<ClusterSummary> {
        self.inner.read().summaries_at_zoom_level(zoom)
    }

    pub fn envelope_at_zoom_level(&self, zoom: ZoomLevel) -> Option<Rect<f64>> {
        self.inner.read().envelope_at_zoom_level(zoom)
    }

    pub fn cluster_count(&self, zoom: ZoomLevel) -> usize {
        self.inner.read().cluster_count(zoom)
    }

    pub fn item_count(&self) -> usize {
        self.inner.read().item_count()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Current state, without waiting for the lock.
    pub fn state(&self) -> EngineState {
        if self.clustering.load(Ordering::Acquire) {
            EngineState::Clustering
        } else {
            EngineState::Idle
        }
    }
}

impl<P> SyncClusteringEngine<P>
where
    P: Send + Sync + 'static,
{
    /// Apply a batch on a background thread, streaming progress into `progress`.
    pub fn spawn_add_items(
        &self,
        items: Vec<ClusterItem<P>>,
        progress: Sender<ProgressEvent>,
    ) -> JoinHandle<BatchSummary> {
        self.spawn_add_items_cancellable(items, progress, CancellationToken::new())
    }

    pub fn spawn_add_items_cancellable(
        &self,
        items: Vec<ClusterItem<P>>,
        progress: Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<BatchSummary> {
        let engine = self.clone();
        thread::spawn(move || {
            let mut observer = ChannelObserver::new(progress);
            engine.add_items_with(items, &mut observer, &cancel)
        })
    }
}

impl<P> std::fmt::Debug for SyncClusteringEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClusteringEngine")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
