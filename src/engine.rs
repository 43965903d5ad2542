//! Clustering engine: the single entry point over the pyramid.
//!
//! The engine owns one grid per zoom level, feeds raw items into the finest one and
//! drives the propagation up to the coarsest. Every write takes `&mut self`, so a
//! reader can never observe a half-settled pyramid; use
//! [`SyncClusteringEngine`](crate::SyncClusteringEngine) to share an engine between
//! threads.

use crate::cluster::{Cluster, Representative};
use crate::config::Config;
use crate::error::Result;
use crate::grid::ClusterGrid;
use crate::lod;
use crate::progress::{CancellationToken, NoProgress, ProgressEvent, ProgressObserver};
use crate::pyramid::Pyramid;
use bytes::Bytes;
use geo::{Point, Rect};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use spatio_cluster_types::coverage::merge_rects;
use spatio_cluster_types::{CellCoord, ClusterId, ClusterItem, Coverage, ZoomLevel};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::RangeInclusive;
use std::time::{Duration, Instant};

/// Whether a batch is currently being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    Clustering,
}

/// Outcome of one add/remove batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub items_added: usize,
    pub items_removed: usize,
    /// Clusters across every level once the batch settled
    pub total_clusters: usize,
    /// Items held by the engine once the batch settled
    pub total_features: usize,
    pub duration: Duration,
    /// The batch stopped early on a cancellation request
    pub cancelled: bool,
}

/// Lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub batches: u64,
    pub items_added: u64,
    pub items_removed: u64,
    pub clears: u64,
    pub load_failures: u64,
    pub last_batch_duration: Option<Duration>,
}

/// Owned, serializable snapshot of a cluster for the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub id: ClusterId,
    pub coordinate: Point<f64>,
    pub display_count: usize,
    /// Drawn as its individual items rather than as a cluster
    pub shows_items: bool,
    pub envelope: Option<Rect<f64>>,
}

/// Multi-resolution clustering index.
///
/// # Examples
///
/// ```rust
/// use spatio_cluster::{ClusterItem, ClusteringEngine, Config};
/// use geo::Point;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // 100 map-unit cells at zoom 5, doubling per coarser level
/// let mut engine: ClusteringEngine<&str> =
///     ClusteringEngine::new(Config::with_fixed_cell_size(3, 5, 100.0, 5))?;
///
/// engine.add_items([
///     ClusterItem::new("a", Point::new(10.0, 10.0), "A"),
///     ClusterItem::new("b", Point::new(50.0, 50.0), "B"),
///     ClusterItem::new("c", Point::new(500.0, 500.0), "C"),
/// ]);
///
/// let counts: Vec<usize> = engine
///     .clusters_at_zoom_level(5)
///     .map(|cluster| cluster.display_count())
///     .collect();
/// assert_eq!(counts, vec![2, 1]);
/// # Ok(())
/// # }
/// ```
pub struct ClusteringEngine<P = Bytes> {
    config: Config,
    pyramid: Pyramid<P>,
    /// Finest-level cell of every item, by key
    keys: FxHashMap<String, CellCoord>,
    state: EngineState,
    stats: EngineStats,
}

impl<P> ClusteringEngine<P> {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        if config.depth() > 24 {
            log::warn!(
                "Pyramid of {} levels requested; every insertion touches each of them",
                config.depth()
            );
        }
        log::debug!(
            "Creating clustering engine: zoom {}..={}, finest cell size {}",
            config.min_zoom,
            config.max_zoom,
            config.cell_size(config.max_zoom)
        );

        Ok(Self {
            pyramid: Pyramid::new(&config),
            config,
            keys: FxHashMap::default(),
            state: EngineState::Idle,
            stats: EngineStats::default(),
        })
    }

    /// Engine whose cells are `cell_size` map units wide at `reference_zoom`.
    pub fn with_cell_size(
        zoom_levels: RangeInclusive<ZoomLevel>,
        cell_size: f64,
        reference_zoom: ZoomLevel,
    ) -> Result<Self> {
        Self::new(Config::with_fixed_cell_size(
            *zoom_levels.start(),
            *zoom_levels.end(),
            cell_size,
            reference_zoom,
        ))
    }

    // ===== Writes =====

    /// Add a batch of items. See [`add_items_with`](Self::add_items_with).
    pub fn add_items<I>(&mut self, items: I) -> BatchSummary
    where
        I: IntoIterator<Item = ClusterItem<P>>,
    {
        self.add_items_with(items, &mut NoProgress, &CancellationToken::new())
    }

    /// Add a batch of items, reporting progress per zoom level.
    ///
    /// The whole batch is checked before the first item goes in. Items then enter the
    /// finest grid one by one; `cancel` is checked before each of them. Whatever was
    /// inserted before a cancellation is still propagated through every level, so the
    /// pyramid is always consistent when this returns.
    ///
    /// # Panics
    ///
    /// Panics if an item has a non-finite coordinate or one outside the addressable
    /// cells of the finest level, or if its key is already held by the engine or
    /// appears twice in the batch. The pyramid is left untouched in that case. Use
    /// [`validation::validate_batch_for`](crate::validation::validate_batch_for) to
    /// check a batch beforehand.
    pub fn add_items_with<I, O>(
        &mut self,
        items: I,
        observer: &mut O,
        cancel: &CancellationToken,
    ) -> BatchSummary
    where
        I: IntoIterator<Item = ClusterItem<P>>,
        O: ProgressObserver + ?Sized,
    {
        let items: Vec<ClusterItem<P>> = items.into_iter().collect();
        self.check_batch(&items);

        let batch_start = Instant::now();
        self.state = EngineState::Clustering;
        let finest = self.pyramid.finest_zoom();
        observer.on_event(ProgressEvent::ZoomLevelStarted { level: finest });

        let mut touched = BTreeSet::new();
        let mut added = 0;
        let mut cancelled = false;
        for item in items {
            if cancel.is_cancelled() {
                log::debug!("Batch cancelled after {} items", added);
                cancelled = true;
                break;
            }
            let key = item.key.clone();
            let cell = self.pyramid.insert_leaf(item);
            self.keys.insert(key, cell);
            touched.insert(cell);
            added += 1;
        }

        let mut summary = self.finish_batch(touched, batch_start, observer);
        summary.items_added = added;
        summary.cancelled = cancelled;
        self.stats.items_added += added as u64;
        summary
    }

    fn check_batch(&self, items: &[ClusterItem<P>]) {
        let cell_size = self.config.cell_size(self.pyramid.finest_zoom());
        let mut batch_keys = FxHashSet::default();
        for item in items {
            assert!(
                item.has_finite_coordinate(),
                "item '{}' has a non-finite coordinate ({}, {})",
                item.key,
                item.x(),
                item.y()
            );
            assert!(
                CellCoord::is_addressable(item.coordinate, cell_size),
                "item '{}' at ({}, {}) lies outside the addressable cells of size {}",
                item.key,
                item.x(),
                item.y(),
                cell_size
            );
            assert!(
                !self.keys.contains_key(item.key()) && batch_keys.insert(item.key()),
                "duplicate item key '{}'",
                item.key
            );
        }
    }

    /// Add a batch delivered by a loader that may have failed.
    ///
    /// A failed load is reported as [`ProgressEvent::LoadFailed`] and processed as an
    /// empty batch; the engine keeps its current contents.
    pub fn add_loaded_batch<E, O>(
        &mut self,
        batch: std::result::Result<Vec<ClusterItem<P>>, E>,
        observer: &mut O,
    ) -> BatchSummary
    where
        E: fmt::Display,
        O: ProgressObserver + ?Sized,
    {
        let items = match batch {
            Ok(items) => items,
            Err(err) => {
                log::warn!("Feature load failed, clustering an empty batch: {}", err);
                self.stats.load_failures += 1;
                observer.on_event(ProgressEvent::LoadFailed {
                    message: err.to_string(),
                });
                Vec::new()
            }
        };
        self.add_items_with(items, observer, &CancellationToken::new())
    }

    /// Remove items by key, retracting them from every level. Unknown keys are ignored.
    pub fn remove_items<I, K>(&mut self, keys: I) -> BatchSummary
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        self.remove_items_with(keys, &mut NoProgress)
    }

    pub fn remove_items_with<I, K, O>(&mut self, keys: I, observer: &mut O) -> BatchSummary
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
        O: ProgressObserver + ?Sized,
    {
        let batch_start = Instant::now();
        self.state = EngineState::Clustering;
        let finest = self.pyramid.finest_zoom();
        observer.on_event(ProgressEvent::ZoomLevelStarted { level: finest });

        let mut touched = BTreeSet::new();
        let mut removed = 0;
        for key in keys {
            let key = key.as_ref();
            let Some(cell) = self.keys.remove(key) else {
                log::trace!("ignoring removal of unknown key '{}'", key);
                continue;
            };
            if self.pyramid.remove_leaf(&cell, key).is_some() {
                touched.insert(cell);
                removed += 1;
            }
        }

        let mut summary = self.finish_batch(touched, batch_start, observer);
        summary.items_removed = removed;
        self.stats.items_removed += removed as u64;
        summary
    }

    /// Empty every grid, finest to coarsest. Calling it on an empty engine is a no-op
    /// and is not counted in [`EngineStats::clears`].
    pub fn remove_all_items(&mut self) {
        if self.keys.is_empty() && self.pyramid.grids().all(ClusterGrid::is_empty) {
            log::trace!("ignoring removal of all items from an empty engine");
            return;
        }
        self.state = EngineState::Clustering;
        self.pyramid.clear();
        self.keys.clear();
        self.stats.clears += 1;
        self.state = EngineState::Idle;
        log::debug!("Removed all items from clustering engine");
    }

    /// Clear the pyramid and re-add every item it held.
    ///
    /// The partition depends on coordinates and cell sizes only, so rebuilding yields
    /// the same clusters.
    pub fn rebuild(&mut self) -> BatchSummary {
        let finest = self.pyramid.finest_zoom();
        let items = self
            .pyramid
            .grid_mut(finest)
            .map(ClusterGrid::drain_leaf_items)
            .unwrap_or_default();
        self.remove_all_items();
        self.add_items(items)
    }

    /// Settle the touched finest cells level by level and report each level.
    fn finish_batch<O>(
        &mut self,
        mut touched: BTreeSet<CellCoord>,
        batch_start: Instant,
        observer: &mut O,
    ) -> BatchSummary
    where
        O: ProgressObserver + ?Sized,
    {
        let finest = self.pyramid.finest_zoom();
        let coarsest = self.pyramid.coarsest_zoom();

        let mut level_start = batch_start;
        let mut total_clusters = 0;
        for zoom in (coarsest..=finest).rev() {
            if zoom != finest {
                observer.on_event(ProgressEvent::ZoomLevelStarted { level: zoom });
                level_start = Instant::now();
            }

            touched = self.pyramid.settle_level(zoom, &touched);

            let (feature_count, cluster_count) = self
                .pyramid
                .grid(zoom)
                .map(|grid| (grid.feature_count(), grid.cluster_count()))
                .unwrap_or_default();
            total_clusters += cluster_count;

            let elapsed = level_start.elapsed();
            log::trace!(
                "Zoom level {} settled: {} clusters, {} features in {:?}",
                zoom,
                cluster_count,
                feature_count,
                elapsed
            );
            observer.on_event(ProgressEvent::ZoomLevelFinished {
                level: zoom,
                feature_count,
                cluster_count,
                elapsed,
            });
        }

        let duration = batch_start.elapsed();
        let total_features = self.keys.len();
        observer.on_event(ProgressEvent::BatchFinished {
            total_duration: duration,
            total_clusters,
            total_features,
        });
        log::debug!(
            "Clustering batch finished in {:?}: {} features, {} clusters",
            duration,
            total_features,
            total_clusters
        );

        self.stats.batches += 1;
        self.stats.last_batch_duration = Some(duration);
        self.state = EngineState::Idle;

        BatchSummary {
            total_clusters,
            total_features,
            duration,
            ..BatchSummary::default()
        }
    }

    // ===== Queries =====

    fn view<'a>(&'a self, cluster: &'a Cluster<P>) -> ClusterRef<'a, P> {
        ClusterRef::new(&self.pyramid, cluster, self.config.min_cluster_count)
    }

    /// Clusters of one zoom level in row-then-column order. Empty for unknown levels.
    pub fn clusters_at_zoom_level(
        &self,
        zoom: ZoomLevel,
    ) -> impl Iterator<Item = ClusterRef<'_, P>> + '_ {
        self.pyramid
            .grid(zoom)
            .into_iter()
            .flat_map(|grid| grid.clusters())
            .map(move |cluster| self.view(cluster))
    }

    /// Clusters of one zoom level whose cell intersects `extent`.
    pub fn clusters_in_extent(
        &self,
        zoom: ZoomLevel,
        extent: &Rect<f64>,
    ) -> Vec<ClusterRef<'_, P>> {
        match self.pyramid.grid(zoom) {
            Some(grid) => grid
                .clusters_in_rect(extent)
                .into_iter()
                .map(|cluster| self.view(cluster))
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn cluster(&self, id: &ClusterId) -> Option<ClusterRef<'_, P>> {
        self.pyramid.cluster(id).map(|cluster| self.view(cluster))
    }

    /// Cluster holding the item `key` at `zoom`.
    pub fn cluster_for_key(&self, key: &str, zoom: ZoomLevel) -> Option<ClusterRef<'_, P>> {
        let cell = self.keys.get(key)?;
        let mut cluster = self.cluster(&ClusterId::new(self.finest_zoom(), *cell))?;
        while cluster.zoom_level() > zoom {
            cluster = cluster.parent()?;
        }
        (cluster.zoom_level() == zoom).then_some(cluster)
    }

    pub fn cluster_count(&self, zoom: ZoomLevel) -> usize {
        self.pyramid.grid(zoom).map_or(0, ClusterGrid::cluster_count)
    }

    /// Union of the coverage extents of every cluster at `zoom`.
    ///
    /// Returns `None`, meaning no coverage at all, when the level holds no clusters or
    /// does not exist.
    pub fn envelope_at_zoom_level(&self, zoom: ZoomLevel) -> Option<Rect<f64>> {
        self.clusters_at_zoom_level(zoom)
            .filter_map(|cluster| cluster.envelope())
            .reduce(merge_rects)
    }

    pub fn summaries_at_zoom_level(&self, zoom: ZoomLevel) -> Vec<ClusterSummary> {
        self.clusters_at_zoom_level(zoom)
            .map(|cluster| cluster.summary())
            .collect()
    }

    pub fn grid(&self, zoom: ZoomLevel) -> Option<&ClusterGrid<P>> {
        self.pyramid.grid(zoom)
    }

    pub fn pyramid(&self) -> &Pyramid<P> {
        &self.pyramid
    }

    /// Configured zoom levels, coarsest first.
    pub fn zoom_levels(&self) -> RangeInclusive<ZoomLevel> {
        self.pyramid.coarsest_zoom()..=self.pyramid.finest_zoom()
    }

    pub fn finest_zoom(&self) -> ZoomLevel {
        self.pyramid.finest_zoom()
    }

    pub fn coarsest_zoom(&self) -> ZoomLevel {
        self.pyramid.coarsest_zoom()
    }

    /// Zoom level whose web mercator scale range covers a map displayed at `scale`.
    pub fn zoom_level_for_scale(&self, scale: f64) -> Option<ZoomLevel> {
        lod::zoom_level_for_scale(scale, self.coarsest_zoom(), self.finest_zoom())
    }

    /// Whether clusters are rendered at `scale`. See [`Config::will_cluster_at_scale`].
    pub fn will_cluster_at_scale(&self, scale: f64) -> bool {
        self.config.will_cluster_at_scale(scale)
    }

    /// Zoom level to render at `scale`, or `None` when clustering is off at that scale.
    pub fn clustering_zoom_level_for_scale(&self, scale: f64) -> Option<ZoomLevel> {
        if !self.will_cluster_at_scale(scale) {
            return None;
        }
        self.zoom_level_for_scale(scale)
    }

    pub fn item_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn state(&self) -> EngineState {
        self.state
    }
}

impl<P> fmt::Debug for ClusteringEngine<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusteringEngine")
            .field("zoom_levels", &self.zoom_levels())
            .field("items", &self.keys.len())
            .field("state", &self.state)
            .finish()
    }
}

/// Read view of one cluster, able to walk into the finer grids it draws from.
pub struct ClusterRef<'a, P = Bytes> {
    pyramid: &'a Pyramid<P>,
    cluster: &'a Cluster<P>,
    min_cluster_count: usize,
}

impl<P> Clone for ClusterRef<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for ClusterRef<'_, P> {}

impl<'a, P> ClusterRef<'a, P> {
    fn new(pyramid: &'a Pyramid<P>, cluster: &'a Cluster<P>, min_cluster_count: usize) -> Self {
        Self {
            pyramid,
            cluster,
            min_cluster_count,
        }
    }

    pub fn cluster(&self) -> &'a Cluster<P> {
        self.cluster
    }

    pub fn id(&self) -> ClusterId {
        self.cluster.id()
    }

    pub fn cell_coordinate(&self) -> CellCoord {
        self.cluster.cell_coordinate()
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.cluster.zoom_level()
    }

    pub fn display_count(&self) -> usize {
        self.cluster.display_count()
    }

    /// Where the marker goes.
    pub fn representative_coordinate(&self) -> Point<f64> {
        self.cluster.representative_coordinate()
    }

    pub fn representative(&self) -> Representative {
        self.cluster.representative()
    }

    pub fn leaf_items(&self) -> &'a [ClusterItem<P>] {
        self.cluster.leaf_items()
    }

    /// The cluster holds fewer items than the configured `min_cluster_count`, so the
    /// renderer draws its [`features`](Self::features) instead of one marker.
    pub fn shows_items(&self) -> bool {
        self.display_count() < self.min_cluster_count
    }

    /// Direct child clusters, one level finer.
    pub fn children(&self) -> impl Iterator<Item = ClusterRef<'a, P>> + use<'a, P> {
        let pyramid = self.pyramid;
        let min_cluster_count = self.min_cluster_count;
        self.cluster
            .child_ids()
            .filter_map(move |id| pyramid.cluster(&id))
            .map(move |cluster| ClusterRef::new(pyramid, cluster, min_cluster_count))
    }

    /// Cluster this one collapses into, one level coarser.
    pub fn parent(&self) -> Option<ClusterRef<'a, P>> {
        let parent = self.cluster.parent()?;
        self.pyramid
            .cluster(&parent)
            .map(|cluster| ClusterRef::new(self.pyramid, cluster, self.min_cluster_count))
    }

    /// Every item transitively held by this cluster. Each call walks the tree afresh.
    pub fn features(&self) -> Features<'a, P> {
        Features {
            pyramid: self.pyramid,
            pending: vec![self.cluster],
            current: Default::default(),
        }
    }

    /// Aggregate geometry of every item transitively held by this cluster.
    ///
    /// Built from this cluster's own leaves and the vertices of its children's
    /// coverages, and cached until the cluster next changes.
    pub fn coverage(&self) -> Option<&'a Coverage> {
        let cluster = self.cluster;
        cluster.coverage_or_init(|| {
            let mut points: Vec<Point<f64>> =
                cluster.leaf_items().iter().map(|item| item.coordinate).collect();
            for child in self.children() {
                if let Some(coverage) = child.coverage() {
                    points.extend(coverage.vertices());
                }
            }
            Coverage::from_points(points)
        })
    }

    pub fn envelope(&self) -> Option<Rect<f64>> {
        self.coverage().map(Coverage::bounding_rect)
    }

    pub fn summary(&self) -> ClusterSummary {
        ClusterSummary {
            id: self.id(),
            coordinate: self.representative_coordinate(),
            display_count: self.display_count(),
            shows_items: self.shows_items(),
            envelope: self.envelope(),
        }
    }
}

impl<P> fmt::Debug for ClusterRef<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterRef")
            .field("id", &self.id())
            .field("display_count", &self.display_count())
            .field("coordinate", &self.representative_coordinate())
            .finish()
    }
}

/// Depth-first walk over the leaves below a cluster.
pub struct Features<'a, P = Bytes> {
    pyramid: &'a Pyramid<P>,
    pending: Vec<&'a Cluster<P>>,
    current: std::slice::Iter<'a, ClusterItem<P>>,
}

impl<'a, P> Iterator for Features<'a, P> {
    type Item = &'a ClusterItem<P>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            let cluster = self.pending.pop()?;
            self.current = cluster.leaf_items().iter();
            let pyramid = self.pyramid;
            self.pending
                .extend(cluster.child_ids().filter_map(|id| pyramid.cluster(&id)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn engine(min: ZoomLevel, max: ZoomLevel, size: f64) -> ClusteringEngine<u32> {
        ClusteringEngine::with_cell_size(min..=max, size, max).unwrap()
    }

    fn item(key: &str, x: f64, y: f64) -> ClusterItem<u32> {
        ClusterItem::new(key, Point::new(x, y), 0)
    }

    #[test]
    fn test_scenario_three_items_at_zoom_five() {
        let mut engine = ClusteringEngine::with_cell_size(5..=5, 100.0, 5).unwrap();
        engine.add_items([
            item("A", 10.0, 10.0),
            item("B", 50.0, 50.0),
            item("C", 500.0, 500.0),
        ]);

        let clusters: Vec<_> = engine.clusters_at_zoom_level(5).collect();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].cell_coordinate(), CellCoord::new(0, 0));
        assert_eq!(clusters[0].display_count(), 2);
        assert_eq!(clusters[1].cell_coordinate(), CellCoord::new(5, 5));
        assert_eq!(clusters[1].display_count(), 1);
        assert_eq!(clusters.iter().map(|c| c.display_count()).sum::<usize>(), 3);
    }

    #[test]
    fn test_features_walk_every_level() {
        let mut engine = engine(0, 3, 10.0);
        engine.add_items([
            item("a", 1.0, 1.0),
            item("b", 12.0, 3.0),
            item("c", 35.0, 20.0),
            item("d", 70.0, 70.0),
        ]);

        let coarsest: Vec<_> = engine.clusters_at_zoom_level(0).collect();
        assert_eq!(coarsest.len(), 1);

        let mut keys: Vec<&str> = coarsest[0].features().map(|item| item.key()).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);

        // restartable: a second walk yields the same items
        assert_eq!(coarsest[0].features().count(), 4);
        assert!(coarsest[0].leaf_items().is_empty());
    }

    #[test]
    fn test_children_and_parent_views() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("a", 1.0, 1.0), item("b", 15.0, 1.0)]);

        let parent = engine.clusters_at_zoom_level(0).next().unwrap();
        let children: Vec<_> = parent.children().collect();
        assert_eq!(children.len(), 2);
        for child in children {
            assert_eq!(child.parent().unwrap().id(), parent.id());
        }
        assert_eq!(parent.representative_coordinate(), Point::new(8.0, 1.0));
    }

    #[test]
    fn test_coverage_spans_children() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([
            item("a", 1.0, 1.0),
            item("b", 15.0, 1.0),
            item("c", 8.0, 18.0),
        ]);

        let top = engine.clusters_at_zoom_level(0).next().unwrap();
        let coverage = top.coverage().unwrap();
        assert!(!coverage.is_degenerate());
        for feature in top.features() {
            assert!(coverage.contains(&feature.coordinate));
        }

        let envelope = engine.envelope_at_zoom_level(0).unwrap();
        assert_eq!(envelope.min(), geo::coord! { x: 1.0, y: 1.0 });
        assert_eq!(envelope.max(), geo::coord! { x: 15.0, y: 18.0 });
    }

    #[test]
    fn test_empty_engine_has_no_envelope() {
        let engine = engine(0, 2, 10.0);
        assert!(engine.envelope_at_zoom_level(1).is_none());
        assert!(engine.envelope_at_zoom_level(9).is_none());
        assert_eq!(engine.clusters_at_zoom_level(9).count(), 0);
    }

    #[test]
    fn test_progress_events_run_finest_to_coarsest() {
        let mut engine = engine(2, 4, 10.0);
        let events = RefCell::new(Vec::new());
        let mut observer = |event: ProgressEvent| events.borrow_mut().push(event);
        engine.add_items_with(
            [item("a", 1.0, 1.0), item("b", 2.0, 2.0)],
            &mut observer,
            &CancellationToken::new(),
        );

        let events = events.into_inner();
        let order: Vec<(bool, ZoomLevel)> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::ZoomLevelStarted { level } => Some((true, *level)),
                ProgressEvent::ZoomLevelFinished { level, feature_count, .. } => {
                    assert_eq!(*feature_count, 2);
                    Some((false, *level))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            order,
            vec![(true, 4), (false, 4), (true, 3), (false, 3), (true, 2), (false, 2)]
        );

        match events.last() {
            Some(ProgressEvent::BatchFinished {
                total_clusters,
                total_features,
                ..
            }) => {
                assert_eq!(*total_clusters, 3);
                assert_eq!(*total_features, 2);
            }
            other => panic!("expected BatchFinished, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_batch_stays_consistent() {
        let mut engine = engine(0, 3, 10.0);
        engine.add_items((0..3).map(|i| item(&format!("k{}", i), i as f64 * 7.0, 0.0)));

        let cancel = CancellationToken::new();
        let mut observer = |event: ProgressEvent| {
            if matches!(event, ProgressEvent::ZoomLevelStarted { level: 3 }) {
                cancel.cancel();
            }
        };
        let items = (3..10).map(|i| item(&format!("k{}", i), i as f64 * 7.0, 0.0));

        let summary = engine.add_items_with(items, &mut observer, &cancel);
        assert!(summary.cancelled);
        assert_eq!(summary.items_added, 0);
        assert_eq!(summary.total_features, 3);
        for zoom in engine.zoom_levels() {
            let total: usize = engine
                .clusters_at_zoom_level(zoom)
                .map(|c| c.display_count())
                .sum();
            assert_eq!(total, 3, "zoom {}", zoom);
        }
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_load_failure_is_an_empty_batch() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("a", 1.0, 1.0)]);

        let mut events = Vec::new();
        let summary = engine.add_loaded_batch(
            Err::<Vec<ClusterItem<u32>>, _>("service unavailable"),
            &mut |event: ProgressEvent| events.push(event),
        );

        assert_eq!(summary.items_added, 0);
        assert_eq!(summary.total_features, 1);
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::LoadFailed {
                message: "service unavailable".into()
            })
        );
        assert_eq!(engine.stats().load_failures, 1);
    }

    #[test]
    fn test_remove_items_retracts_from_every_level() {
        let mut engine = engine(0, 2, 10.0);
        engine.add_items([
            item("a", 1.0, 1.0),
            item("b", 3.0, 3.0),
            item("c", 55.0, 55.0),
        ]);

        let summary = engine.remove_items(["a", "missing", "c"]);
        assert_eq!(summary.items_removed, 2);
        assert_eq!(engine.item_count(), 1);
        for zoom in engine.zoom_levels() {
            let clusters: Vec<_> = engine.clusters_at_zoom_level(zoom).collect();
            assert_eq!(clusters.len(), 1, "zoom {}", zoom);
            assert_eq!(clusters[0].display_count(), 1);
            assert_eq!(clusters[0].representative_coordinate(), Point::new(3.0, 3.0));
        }
    }

    #[test]
    fn test_cluster_for_key() {
        let mut engine = engine(0, 2, 10.0);
        engine.add_items([item("a", 1.0, 1.0), item("b", 25.0, 1.0)]);

        let fine = engine.cluster_for_key("a", 2).unwrap();
        assert_eq!(fine.display_count(), 1);
        let coarse = engine.cluster_for_key("a", 0).unwrap();
        assert_eq!(coarse.display_count(), 2);
        assert!(engine.cluster_for_key("a", 3).is_none());
        assert!(engine.cluster_for_key("zz", 0).is_none());
    }

    #[test]
    fn test_rebuild_reproduces_partition() {
        let mut engine = engine(0, 3, 10.0);
        engine.add_items((0..50).map(|i| {
            item(&format!("k{}", i), (i * 13 % 97) as f64, (i * 7 % 61) as f64)
        }));

        let before: Vec<Vec<ClusterSummary>> = engine
            .zoom_levels()
            .map(|z| engine.summaries_at_zoom_level(z))
            .collect();
        let summary = engine.rebuild();
        assert_eq!(summary.items_added, 50);

        let after: Vec<Vec<ClusterSummary>> = engine
            .zoom_levels()
            .map(|z| engine.summaries_at_zoom_level(z))
            .collect();
        let ids = |levels: &Vec<Vec<ClusterSummary>>| -> Vec<Vec<(ClusterId, usize)>> {
            levels
                .iter()
                .map(|level| level.iter().map(|s| (s.id, s.display_count)).collect())
                .collect()
        };
        assert_eq!(ids(&before), ids(&after));
    }

    #[test]
    #[should_panic(expected = "duplicate item key 'a'")]
    fn test_duplicate_key_within_batch_panics() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("a", 1.0, 1.0), item("a", 2.0, 2.0)]);
    }

    #[test]
    #[should_panic(expected = "duplicate item key 'a'")]
    fn test_duplicate_key_across_batches_panics() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("a", 1.0, 1.0)]);
        engine.add_items([item("a", 2.0, 2.0)]);
    }

    #[test]
    #[should_panic(expected = "duplicate item key 'a'")]
    fn test_duplicate_key_after_valid_items_panics() {
        let mut engine = engine(0, 3, 10.0);
        engine.add_items([
            item("a", 1.0, 1.0),
            item("b", 50.0, 1.0),
            item("a", 2.0, 2.0),
        ]);
    }

    #[test]
    #[should_panic(expected = "addressable")]
    fn test_unaddressable_coordinate_panics() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("far", 1.0e20, 1.0)]);
    }

    #[test]
    fn test_rejected_batch_leaves_pyramid_untouched() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let mut engine = engine(0, 3, 10.0);
        engine.add_items([item("x", 5.0, 5.0)]);
        let before: Vec<Vec<ClusterSummary>> = engine
            .zoom_levels()
            .map(|z| engine.summaries_at_zoom_level(z))
            .collect();

        let batches = [
            vec![
                item("a", 1.0, 1.0),
                item("b", 50.0, 1.0),
                item("a", 2.0, 2.0),
            ],
            vec![item("c", 1.0, 1.0), item("x", 2.0, 2.0)],
            vec![item("d", 1.0, 1.0), item("e", f64::INFINITY, 2.0)],
            vec![item("f", 1.0, 1.0), item("g", -1.0e20, 2.0)],
        ];
        for batch in batches {
            let result = catch_unwind(AssertUnwindSafe(|| engine.add_items(batch)));
            assert!(result.is_err());

            assert_eq!(engine.item_count(), 1);
            assert_eq!(engine.state(), EngineState::Idle);
            let after: Vec<Vec<ClusterSummary>> = engine
                .zoom_levels()
                .map(|z| engine.summaries_at_zoom_level(z))
                .collect();
            assert_eq!(after, before);
        }
        assert_eq!(engine.stats().batches, 1);
    }

    #[test]
    #[should_panic(expected = "non-finite")]
    fn test_nan_coordinate_panics() {
        let mut engine = engine(0, 1, 10.0);
        engine.add_items([item("nan", f64::NAN, 1.0)]);
    }

    #[test]
    fn test_zoom_level_for_scale_is_clamped_to_pyramid() {
        let engine = engine(4, 10, 10.0);
        assert_eq!(engine.zoom_level_for_scale(1.0), Some(10));
        assert_eq!(engine.zoom_level_for_scale(1e12), Some(4));
    }

    #[test]
    fn test_small_clusters_show_their_items() {
        let config = Config::with_fixed_cell_size(0, 1, 10.0, 1).with_min_cluster_count(3);
        let mut engine: ClusteringEngine<u32> = ClusteringEngine::new(config).unwrap();
        engine.add_items([
            item("a", 1.0, 1.0),
            item("b", 2.0, 2.0),
            item("c", 15.0, 1.0),
        ]);

        let fine: Vec<bool> = engine
            .clusters_at_zoom_level(1)
            .map(|c| c.shows_items())
            .collect();
        assert_eq!(fine, vec![true, true]);

        let top = engine.clusters_at_zoom_level(0).next().unwrap();
        assert!(!top.shows_items());
        assert!(top.children().all(|child| child.shows_items()));
        assert!(!engine.summaries_at_zoom_level(0)[0].shows_items);

        engine.remove_items(["c"]);
        assert!(engine.summaries_at_zoom_level(0)[0].shows_items);
    }

    #[test]
    fn test_clustering_is_off_beyond_min_scale() {
        let config = Config::with_fixed_cell_size(4, 10, 10.0, 10)
            .with_min_scale_for_clustering(1_000_000.0);
        let engine: ClusteringEngine<u32> = ClusteringEngine::new(config).unwrap();

        assert!(engine.will_cluster_at_scale(100_000.0));
        assert_eq!(engine.clustering_zoom_level_for_scale(100_000.0), Some(10));
        assert!(!engine.will_cluster_at_scale(1e8));
        assert_eq!(engine.clustering_zoom_level_for_scale(1e8), None);
        assert_eq!(engine.zoom_level_for_scale(1e8), Some(4));
    }

    #[test]
    fn test_stats_and_state() {
        let mut engine = engine(0, 1, 10.0);
        assert_eq!(engine.state(), EngineState::Idle);
        engine.remove_all_items();
        assert_eq!(engine.stats().clears, 0);

        engine.add_items([item("a", 1.0, 1.0)]);
        engine.remove_all_items();
        engine.remove_all_items();

        let stats = engine.stats();
        assert_eq!(stats.batches, 1);
        assert_eq!(stats.items_added, 1);
        assert_eq!(stats.clears, 1);
        assert!(stats.last_batch_duration.is_some());
        assert_eq!(engine.state(), EngineState::Idle);
    }
}
