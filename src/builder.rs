//! Engine builder
//!
//! Assembles a [`Config`] step by step and validates it once, when the engine is built.

use crate::config::{CellSizing, Config};
use crate::engine::ClusteringEngine;
use crate::error::Result;
use spatio_cluster_types::ZoomLevel;

/// Builder for a [`ClusteringEngine`].
///
/// # Examples
///
/// ```rust
/// use spatio_cluster::EngineBuilder;
///
/// let engine = EngineBuilder::new()
///     .zoom_range(2, 12)
///     .fixed_cell_size(64.0, 12)
///     .build::<String>()
///     .unwrap();
///
/// assert_eq!(engine.grid(12).unwrap().cell_size(), 64.0);
/// assert_eq!(engine.grid(11).unwrap().cell_size(), 128.0);
/// ```
#[derive(Debug, Clone)]
pub struct EngineBuilder {
    config: Config,
}

impl EngineBuilder {
    /// Builder starting from the default web mercator configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Coarsest and finest zoom levels, inclusive.
    pub fn zoom_range(mut self, min_zoom: ZoomLevel, max_zoom: ZoomLevel) -> Self {
        self.config = self.config.with_zoom_range(min_zoom, max_zoom);
        self
    }

    /// Cells of `cell_size` map units at `zoom_level`, doubling per coarser level.
    pub fn fixed_cell_size(mut self, cell_size: f64, zoom_level: ZoomLevel) -> Self {
        self.config = self.config.with_cell_sizing(CellSizing::Fixed {
            cell_size,
            zoom_level,
        });
        self
    }

    /// Cells sized as `size_meters` on screen at the finest web mercator level.
    pub fn screen_cell_size(mut self, size_meters: f64) -> Self {
        self.config = self
            .config
            .with_cell_sizing(CellSizing::ScreenUnits { size_meters });
        self
    }

    /// Clusters with fewer items than `count` are drawn as their items.
    pub fn min_cluster_count(mut self, count: usize) -> Self {
        self.config = self.config.with_min_cluster_count(count);
        self
    }

    /// Stop rendering clusters when the map is zoomed out beyond `scale`.
    pub fn min_scale_for_clustering(mut self, scale: f64) -> Self {
        self.config = self.config.with_min_scale_for_clustering(scale);
        self
    }

    pub fn build<P>(self) -> Result<ClusteringEngine<P>> {
        ClusteringEngine::new(self.config)
    }

    #[cfg(feature = "sync")]
    pub fn build_sync<P>(self) -> Result<crate::sync::SyncClusteringEngine<P>>
    where
        P: Send + Sync + 'static,
    {
        self.build().map(crate::sync::SyncClusteringEngine::from_engine)
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
