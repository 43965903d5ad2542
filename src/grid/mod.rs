//! Per-zoom-level spatial hash.
//!
//! A `ClusterGrid` buckets everything it receives into square cells of a fixed size.
//! Rows are keyed by cell row and hold the clusters of that row keyed by column, so
//! enumeration is row-then-column and only occupied cells cost memory.
//!
//! ```text
//! ClusterGrid (zoom 12, cell_size 3584.0)
//! ├─ rows: BTreeMap<i64, GridRow>
//! │  ├─ -2 -> GridRow { 7 -> Cluster, 8 -> Cluster }
//! │  └─  5 -> GridRow { -1 -> Cluster }
//! ├─ finer:   Some(13)
//! └─ coarser: Some(11)
//! ```

mod row;

pub use row::GridRow;

use crate::cluster::{Addable, Cluster};
use bytes::Bytes;
use geo::{Point, Rect};
use spatio_cluster_types::{CellCoord, ClusterItem, ZoomLevel};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub struct ClusterGrid<P = Bytes> {
    zoom: ZoomLevel,
    cell_size: f64,
    rows: BTreeMap<i64, GridRow<P>>,
    finer: Option<ZoomLevel>,
    coarser: Option<ZoomLevel>,
}

impl<P> ClusterGrid<P> {
    /// Create an empty, unlinked grid.
    ///
    /// # Panics
    ///
    /// Panics if `cell_size` is not finite and positive.
    pub fn with_cell_size(zoom: ZoomLevel, cell_size: f64) -> Self {
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell size must be finite and positive, got {}",
            cell_size
        );
        Self {
            zoom,
            cell_size,
            rows: BTreeMap::new(),
            finer: None,
            coarser: None,
        }
    }

    /// Set the links to the adjacent zoom levels. Only the pyramid wires grids.
    pub(crate) fn link(&mut self, finer: Option<ZoomLevel>, coarser: Option<ZoomLevel>) {
        self.finer = finer;
        self.coarser = coarser;
    }

    /// Cell containing `point`.
    ///
    /// # Panics
    ///
    /// Panics on non-finite coordinates.
    pub fn cell_for_point(&self, point: Point<f64>) -> CellCoord {
        CellCoord::for_point(point, self.cell_size)
    }

    /// Existing or new cluster of the cell containing `point`.
    pub fn cluster_for_point(&mut self, point: Point<f64>) -> &mut Cluster<P> {
        let cell = self.cell_for_point(point);
        self.cluster_for_cell(cell, point)
    }

    fn cluster_for_cell(&mut self, cell: CellCoord, point: Point<f64>) -> &mut Cluster<P> {
        let zoom = self.zoom;
        self.rows
            .entry(cell.row)
            .or_insert_with(|| GridRow::new(zoom, cell.row))
            .cluster_for_grid_coord(cell, point)
    }

    /// Assign every element to the cluster of its cell.
    ///
    /// Returns the cells whose clusters changed. Pushing those clusters one level
    /// coarser is the pyramid's job, since it owns this grid's `coarser` neighbor.
    pub fn add_items<I>(&mut self, items: I) -> BTreeSet<CellCoord>
    where
        I: IntoIterator<Item = Addable<P>>,
    {
        let mut touched = BTreeSet::new();
        for item in items {
            let point = item.coordinate();
            let cell = self.cell_for_point(point);
            self.cluster_for_cell(cell, point).add_items([item]);
            touched.insert(cell);
        }
        touched
    }

    pub fn remove_all_items(&mut self) {
        for row in self.rows.values_mut() {
            row.remove_all_clusters();
        }
        self.rows.clear();
    }

    /// Move every leaf item out of the grid in row-then-column order and clear it.
    pub(crate) fn drain_leaf_items(&mut self) -> Vec<ClusterItem<P>> {
        let items = self
            .rows
            .values_mut()
            .flat_map(|row| row.clusters_mut())
            .flat_map(|cluster| cluster.take_leaf_items())
            .collect();
        self.remove_all_items();
        items
    }

    /// Every occupied cluster, row by row, then column by column.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster<P>> + '_ {
        self.rows.values().flat_map(|row| row.clusters())
    }

    /// Clusters whose cell intersects `rect`.
    pub fn clusters_in_rect(&self, rect: &Rect<f64>) -> Vec<&Cluster<P>> {
        let (min, max) = (rect.min(), rect.max());
        if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
            log::warn!("Rejecting cluster extent query with non-finite coordinates");
            return Vec::new();
        }

        let low = self.cell_for_point(Point::from(min));
        let high = self.cell_for_point(Point::from(max));
        self.rows
            .range(low.row..=high.row)
            .flat_map(|(_, row)| row.clusters_in_cols(low.col..=high.col))
            .collect()
    }

    pub fn cluster(&self, cell: &CellCoord) -> Option<&Cluster<P>> {
        self.rows.get(&cell.row)?.cluster(cell.col)
    }

    pub fn cluster_mut(&mut self, cell: &CellCoord) -> Option<&mut Cluster<P>> {
        self.rows.get_mut(&cell.row)?.cluster_mut(cell.col)
    }

    /// Evict the cluster at `cell`, dropping its row once the row is empty.
    pub fn remove_cluster(&mut self, cell: &CellCoord) -> Option<Cluster<P>> {
        let row = self.rows.get_mut(&cell.row)?;
        let removed = row.remove_cluster(cell.col);
        if row.is_empty() {
            self.rows.remove(&cell.row);
        }
        removed
    }

    /// Geometric center of a cell. Depends on nothing but the cell size.
    pub fn cell_centroid(&self, cell: &CellCoord) -> Point<f64> {
        cell.centroid(self.cell_size)
    }

    pub fn cell_extent(&self, cell: &CellCoord) -> Rect<f64> {
        cell.extent(self.cell_size)
    }

    pub fn cluster_count(&self) -> usize {
        self.rows.values().map(GridRow::len).sum()
    }

    /// Sum of the display counts of every cluster.
    pub fn feature_count(&self) -> usize {
        self.clusters().map(Cluster::display_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = &GridRow<P>> + '_ {
        self.rows.values()
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Next finer zoom level, if this grid is not the finest.
    pub fn finer(&self) -> Option<ZoomLevel> {
        self.finer
    }

    /// Next coarser zoom level, if this grid is not the coarsest.
    pub fn coarser(&self) -> Option<ZoomLevel> {
        self.coarser
    }
}
