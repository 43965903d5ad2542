//! The chain of grids, one per zoom level, and the propagation between them.
//!
//! Grids live in a single arena ordered coarsest to finest. The finer/coarser links
//! between them are zoom levels, never references, so no grid keeps another alive.
//! Clusters reference their children (one level finer) and their parent (one level
//! coarser) the same way, through [`ClusterId`]s.

use crate::cluster::{Addable, Cluster, Representative};
use crate::config::Config;
use crate::grid::ClusterGrid;
use bytes::Bytes;
use spatio_cluster_types::{CellCoord, ClusterId, ClusterItem, ZoomLevel};
use std::collections::BTreeSet;

#[derive(Debug)]
pub struct Pyramid<P = Bytes> {
    min_zoom: ZoomLevel,
    grids: Vec<ClusterGrid<P>>,
}

/// What happened to a touched cluster while settling its level.
enum Change {
    Evicted {
        id: ClusterId,
        parent: Option<ClusterId>,
    },
    Updated {
        rep: Representative,
        parent: Option<ClusterId>,
    },
}

impl<P> Pyramid<P> {
    /// Build and link one empty grid per zoom level. `config` must be valid.
    pub(crate) fn new(config: &Config) -> Self {
        let mut grids: Vec<ClusterGrid<P>> = (config.min_zoom..=config.max_zoom)
            .map(|zoom| ClusterGrid::with_cell_size(zoom, config.cell_size(zoom)))
            .collect();

        for grid in &mut grids {
            let zoom = grid.zoom_level();
            let finer = (zoom < config.max_zoom).then(|| zoom + 1);
            let coarser = (zoom > config.min_zoom).then(|| zoom - 1);
            grid.link(finer, coarser);
        }

        Self {
            min_zoom: config.min_zoom,
            grids,
        }
    }

    fn index(&self, zoom: ZoomLevel) -> Option<usize> {
        let index = zoom.checked_sub(self.min_zoom)? as usize;
        (index < self.grids.len()).then_some(index)
    }

    pub fn grid(&self, zoom: ZoomLevel) -> Option<&ClusterGrid<P>> {
        self.index(zoom).map(|index| &self.grids[index])
    }

    pub(crate) fn grid_mut(&mut self, zoom: ZoomLevel) -> Option<&mut ClusterGrid<P>> {
        self.index(zoom).map(move |index| &mut self.grids[index])
    }

    pub fn coarsest_zoom(&self) -> ZoomLevel {
        self.min_zoom
    }

    pub fn finest_zoom(&self) -> ZoomLevel {
        self.min_zoom + (self.grids.len() - 1) as ZoomLevel
    }

    /// Grids from finest to coarsest.
    pub fn grids(&self) -> impl Iterator<Item = &ClusterGrid<P>> + '_ {
        self.grids.iter().rev()
    }

    pub fn contains_zoom(&self, zoom: ZoomLevel) -> bool {
        self.index(zoom).is_some()
    }

    pub fn cluster(&self, id: &ClusterId) -> Option<&Cluster<P>> {
        self.grid(id.zoom)?.cluster(&id.cell)
    }

    /// Put a raw item into the finest grid. Returns the touched cell.
    pub(crate) fn insert_leaf(&mut self, item: ClusterItem<P>) -> CellCoord {
        let finest = self.finest_zoom();
        let grid = self
            .grid_mut(finest)
            .unwrap_or_else(|| unreachable!("pyramid always has a finest grid"));
        let point = item.coordinate;
        let cluster = grid.cluster_for_point(point);
        cluster.add_items([Addable::Item(item)]);
        cluster.cell_coordinate()
    }

    /// Take a raw item out of the finest grid's cluster at `cell`.
    pub(crate) fn remove_leaf(&mut self, cell: &CellCoord, key: &str) -> Option<ClusterItem<P>> {
        let finest = self.finest_zoom();
        self.grid_mut(finest)?.cluster_mut(cell)?.remove_item(key)
    }

    /// Settle the touched clusters of one level and push them one level coarser.
    ///
    /// Emptied clusters are evicted and detached from their parent. Surviving ones are
    /// re-added to the coarser cell their representative coordinate falls into,
    /// replacing their previous contribution there; if that cell changed, they are
    /// first detached from the old parent. Returns the coarser cells touched, which
    /// become the input for the next level.
    pub(crate) fn settle_level(
        &mut self,
        zoom: ZoomLevel,
        touched: &BTreeSet<CellCoord>,
    ) -> BTreeSet<CellCoord> {
        let Some(grid) = self.grid_mut(zoom) else {
            return BTreeSet::new();
        };

        let mut changes = Vec::with_capacity(touched.len());
        for cell in touched {
            let Some(cluster) = grid.cluster(cell) else {
                continue;
            };
            if cluster.is_empty() {
                let parent = cluster.parent();
                let id = cluster.id();
                grid.remove_cluster(cell);
                log::trace!("evicted empty cluster {}", id);
                changes.push(Change::Evicted { id, parent });
            } else {
                changes.push(Change::Updated {
                    rep: cluster.representative(),
                    parent: cluster.parent(),
                });
            }
        }

        let Some(coarser_zoom) = grid.coarser() else {
            return BTreeSet::new();
        };
        let Some(coarser) = self.grid_mut(coarser_zoom) else {
            return BTreeSet::new();
        };

        let mut next = BTreeSet::new();
        let mut parents = Vec::new();
        for change in changes {
            match change {
                Change::Evicted { id, parent } => {
                    if let Some(parent) = parent {
                        detach(coarser, &parent, &id);
                        next.insert(parent.cell);
                    }
                }
                Change::Updated { rep, parent } => {
                    let target = coarser.cell_for_point(rep.coordinate);
                    if let Some(parent) = parent
                        && parent.cell != target
                    {
                        detach(coarser, &parent, &rep.id);
                        next.insert(parent.cell);
                    }
                    next.extend(coarser.add_items([Addable::Cluster(rep)]));
                    parents.push((rep.id.cell, ClusterId::new(coarser_zoom, target)));
                }
            }
        }

        if let Some(grid) = self.grid_mut(zoom) {
            for (cell, parent) in parents {
                if let Some(cluster) = grid.cluster_mut(&cell) {
                    cluster.set_parent(Some(parent));
                }
            }
        }

        next
    }

    /// Empty every grid, finest to coarsest.
    pub(crate) fn clear(&mut self) {
        for grid in self.grids.iter_mut().rev() {
            grid.remove_all_items();
        }
    }
}

fn detach<P>(grid: &mut ClusterGrid<P>, parent: &ClusterId, child: &ClusterId) {
    let detached = grid
        .cluster_mut(&parent.cell)
        .is_some_and(|cluster| cluster.remove_child(child));
    debug_assert!(detached, "{} was not a child of {}", child, parent);
}
