//! Cluster aggregate nodes.
//!
//! A cluster owns the items that fell into its cell at the finest level, or the
//! representatives of the finer clusters that collapsed into it at coarser levels.
//! Child clusters are referenced by [`ClusterId`] only; the grids of the pyramid own
//! every cluster.

use bytes::Bytes;
use geo::Point;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use spatio_cluster_types::{CellCoord, ClusterId, ClusterItem, Coverage, ZoomLevel};
use std::collections::BTreeMap;

/// Snapshot of a finer cluster, pushed one level coarser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Representative {
    pub id: ClusterId,
    /// Weighted centroid of the cluster at the time it was pushed
    pub coordinate: Point<f64>,
    pub display_count: usize,
}

/// Anything a grid accepts: a raw item, or a cluster from the next finer grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Addable<P = Bytes> {
    Item(ClusterItem<P>),
    Cluster(Representative),
}

impl<P> Addable<P> {
    pub fn coordinate(&self) -> Point<f64> {
        match self {
            Addable::Item(item) => item.coordinate,
            Addable::Cluster(rep) => rep.coordinate,
        }
    }

    /// Number of leaf items this element stands for.
    pub fn display_count(&self) -> usize {
        match self {
            Addable::Item(_) => 1,
            Addable::Cluster(rep) => rep.display_count,
        }
    }
}

impl<P> From<ClusterItem<P>> for Addable<P> {
    fn from(item: ClusterItem<P>) -> Self {
        Addable::Item(item)
    }
}

impl<P> From<Representative> for Addable<P> {
    fn from(rep: Representative) -> Self {
        Addable::Cluster(rep)
    }
}

/// Leaves of one cell; finest-level cells rarely hold more than a couple.
type LeafItems<P> = SmallVec<[ClusterItem<P>; 2]>;

/// One cluster, occupying one cell of one zoom level.
///
/// The display count and representative coordinate are kept in sync with the direct
/// members on every mutation: leaves weigh 1, child clusters weigh their own display
/// count. Each child contributes through the last representative it pushed, so pushing
/// the same child again replaces its contribution instead of adding to it.
#[derive(Debug)]
pub struct Cluster<P = Bytes> {
    id: ClusterId,
    leaf_items: LeafItems<P>,
    children: BTreeMap<ClusterId, Representative>,
    parent: Option<ClusterId>,
    centroid: Point<f64>,
    display_count: usize,
    coverage: OnceCell<Option<Coverage>>,
}

impl<P> Cluster<P> {
    /// Create an empty cluster whose representative coordinate starts at `point`.
    pub fn for_point(id: ClusterId, point: Point<f64>) -> Self {
        Self {
            id,
            leaf_items: SmallVec::new(),
            children: BTreeMap::new(),
            parent: None,
            centroid: point,
            display_count: 0,
            coverage: OnceCell::new(),
        }
    }

    /// Merge items and finer clusters into this cluster.
    ///
    /// Adding nothing leaves the cluster, including its cached coverage, untouched.
    pub fn add_items<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = Addable<P>>,
    {
        let mut changed = false;
        for item in items {
            match item {
                Addable::Item(item) => self.leaf_items.push(item),
                Addable::Cluster(rep) => {
                    debug_assert_eq!(
                        rep.id.zoom,
                        self.id.zoom + 1,
                        "child clusters must come from the next finer zoom level"
                    );
                    self.children.insert(rep.id, rep);
                }
            }
            changed = true;
        }

        if changed {
            self.refresh();
        }
    }

    /// Remove a leaf item by key.
    pub fn remove_item(&mut self, key: &str) -> Option<ClusterItem<P>> {
        let position = self.leaf_items.iter().position(|item| item.key == key)?;
        let item = self.leaf_items.remove(position);
        self.refresh();
        Some(item)
    }

    /// Detach a child cluster. Returns whether it was a child.
    pub fn remove_child(&mut self, id: &ClusterId) -> bool {
        let removed = self.children.remove(id).is_some();
        if removed {
            self.refresh();
        }
        removed
    }

    /// Drop every leaf and child. The owning row must evict the cluster afterwards.
    pub fn remove_all_items(&mut self) {
        self.leaf_items.clear();
        self.children.clear();
        self.refresh();
    }

    /// Move every leaf item out, leaving the cluster without leaves.
    pub(crate) fn take_leaf_items(&mut self) -> Vec<ClusterItem<P>> {
        let items = std::mem::take(&mut self.leaf_items).into_vec();
        self.refresh();
        items
    }

    fn refresh(&mut self) {
        let mut count = 0usize;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;

        for item in &self.leaf_items {
            count += 1;
            sum_x += item.x();
            sum_y += item.y();
        }
        for rep in self.children.values() {
            let weight = rep.display_count as f64;
            count += rep.display_count;
            sum_x += rep.coordinate.x() * weight;
            sum_y += rep.coordinate.y() * weight;
        }

        self.display_count = count;
        if count > 0 {
            self.centroid = Point::new(sum_x / count as f64, sum_y / count as f64);
        }
        self.coverage = OnceCell::new();
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn cell_coordinate(&self) -> CellCoord {
        self.id.cell
    }

    /// Zoom level of the owning grid.
    pub fn zoom_level(&self) -> ZoomLevel {
        self.id.zoom
    }

    pub fn display_count(&self) -> usize {
        self.display_count
    }

    pub fn representative_coordinate(&self) -> Point<f64> {
        self.centroid
    }

    /// The snapshot this cluster pushes to the next coarser grid.
    pub fn representative(&self) -> Representative {
        Representative {
            id: self.id,
            coordinate: self.centroid,
            display_count: self.display_count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_items.is_empty() && self.children.is_empty()
    }

    /// Items added directly to this cluster.
    pub fn leaf_items(&self) -> &[ClusterItem<P>] {
        &self.leaf_items
    }

    pub fn child_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.children.keys().copied()
    }

    pub fn children(&self) -> impl Iterator<Item = &Representative> + '_ {
        self.children.values()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// The coarser cluster this one currently collapses into.
    pub fn parent(&self) -> Option<ClusterId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<ClusterId>) {
        self.parent = parent;
    }

    /// Cached coverage, computed by `init` on first access after a mutation.
    pub(crate) fn coverage_or_init<F>(&self, init: F) -> Option<&Coverage>
    where
        F: FnOnce() -> Option<Coverage>,
    {
        self.coverage.get_or_init(init).as_ref()
    }

    #[cfg(test)]
    pub(crate) fn has_cached_coverage(&self) -> bool {
        self.coverage.get().is_some()
    }
}
