//! One horizontal strip of a cluster grid.

use crate::cluster::Cluster;
use bytes::Bytes;
use geo::Point;
use spatio_cluster_types::{CellCoord, ClusterId, ZoomLevel};
use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// Clusters of one cell row, keyed by column.
///
/// Cell identity alone decides cluster identity: there is no neighbor search or merge
/// distance at this level.
#[derive(Debug)]
pub struct GridRow<P = Bytes> {
    zoom: ZoomLevel,
    row: i64,
    clusters: BTreeMap<i64, Cluster<P>>,
}

impl<P> GridRow<P> {
    pub fn new(zoom: ZoomLevel, row: i64) -> Self {
        Self {
            zoom,
            row,
            clusters: BTreeMap::new(),
        }
    }

    /// Existing cluster at `cell`, or a new empty one starting at `point`.
    pub fn cluster_for_grid_coord(
        &mut self,
        cell: CellCoord,
        point: Point<f64>,
    ) -> &mut Cluster<P> {
        debug_assert_eq!(cell.row, self.row, "cell belongs to another row");
        let zoom = self.zoom;
        self.clusters.entry(cell.col).or_insert_with(|| {
            log::trace!("creating cluster at zoom {} cell {}", zoom, cell);
            Cluster::for_point(ClusterId::new(zoom, cell), point)
        })
    }

    pub fn cluster(&self, col: i64) -> Option<&Cluster<P>> {
        self.clusters.get(&col)
    }

    pub fn cluster_mut(&mut self, col: i64) -> Option<&mut Cluster<P>> {
        self.clusters.get_mut(&col)
    }

    pub fn remove_cluster(&mut self, col: i64) -> Option<Cluster<P>> {
        self.clusters.remove(&col)
    }

    pub fn remove_all_clusters(&mut self) {
        self.clusters.clear();
    }

    /// Clusters in column order.
    pub fn clusters(&self) -> impl Iterator<Item = &Cluster<P>> + '_ {
        self.clusters.values()
    }

    pub(crate) fn clusters_mut(&mut self) -> impl Iterator<Item = &mut Cluster<P>> + '_ {
        self.clusters.values_mut()
    }

    pub fn clusters_in_cols<R>(&self, cols: R) -> impl Iterator<Item = &Cluster<P>> + '_
    where
        R: RangeBounds<i64>,
    {
        self.clusters.range(cols).map(|(_, cluster)| cluster)
    }

    pub fn row(&self) -> i64 {
        self.row
    }

    pub fn zoom_level(&self) -> ZoomLevel {
        self.zoom
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Addable;
    use spatio_cluster_types::ClusterItem;

    #[test]
    fn test_same_cell_returns_same_cluster() {
        let mut row: GridRow<()> = GridRow::new(5, 0);
        let cell = CellCoord::new(0, 3);

        row.cluster_for_grid_coord(cell, Point::new(310.0, 10.0))
            .add_items([Addable::Item(ClusterItem::new("a", Point::new(310.0, 10.0), ()))]);
        let cluster = row.cluster_for_grid_coord(cell, Point::new(390.0, 90.0));

        assert_eq!(cluster.display_count(), 1);
        assert_eq!(cluster.representative_coordinate(), Point::new(310.0, 10.0));
        assert_eq!(cluster.id(), ClusterId::new(5, cell));
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_clusters_in_column_order() {
        let mut row: GridRow<()> = GridRow::new(2, 1);
        for col in [4, -2, 0] {
            row.cluster_for_grid_coord(CellCoord::new(1, col), Point::new(0.0, 0.0));
        }
        let cols: Vec<i64> = row.clusters().map(|c| c.cell_coordinate().col).collect();
        assert_eq!(cols, vec![-2, 0, 4]);

        let ranged: Vec<i64> = row
            .clusters_in_cols(-1..=4)
            .map(|c| c.cell_coordinate().col)
            .collect();
        assert_eq!(ranged, vec![0, 4]);
    }

    #[test]
    fn test_remove_all_clusters() {
        let mut row: GridRow<()> = GridRow::new(0, 0);
        row.cluster_for_grid_coord(CellCoord::new(0, 0), Point::new(0.0, 0.0));
        row.cluster_for_grid_coord(CellCoord::new(0, 1), Point::new(0.0, 0.0));
        row.remove_all_clusters();
        assert!(row.is_empty());
        assert!(row.cluster(0).is_none());
    }
}
