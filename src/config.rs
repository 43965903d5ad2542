//! Serializable pyramid configuration.
//!
//! The configuration decides which zoom levels get a grid and how large a grid
//! cell is at each of them. It is designed to be loaded from JSON (or TOML with
//! the `toml` feature) as easily as it is built in code.

use crate::ZoomLevel;
use crate::error::{ClusterError, Result};
use crate::lod::LevelOfDetail;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deepest pyramid accepted; cell sizes would need 2^30 doublings beyond this.
pub const MAX_SUPPORTED_ZOOM: ZoomLevel = 30;

/// How cell sizes are derived for every zoom level.
///
/// Whatever the variant, sizes come from a single base unit that doubles per coarser
/// level, so every cell of a finer level nests inside exactly one cell of the next
/// coarser level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellSizing {
    /// A cell is `size_meters` wide on screen. The finest level's map-unit cell size is
    /// `floor(size_meters * scale(finest))`, taken from the web mercator levels of detail.
    ScreenUnits { size_meters: f64 },
    /// A cell is `cell_size` map units wide at `zoom_level`.
    Fixed { cell_size: f64, zoom_level: ZoomLevel },
}

impl CellSizing {
    /// One inch on screen, the default marker footprint.
    pub const DEFAULT_SCREEN_CELL_METERS: f64 = 0.0254;

    /// Map-unit cell size at `level` for a pyramid whose finest level is `finest`.
    pub fn cell_size(&self, level: ZoomLevel, finest: ZoomLevel) -> f64 {
        match *self {
            CellSizing::ScreenUnits { size_meters } => {
                let base = (size_meters * LevelOfDetail::web_mercator(finest).scale).floor();
                base * 2f64.powi(finest as i32 - level as i32)
            }
            CellSizing::Fixed {
                cell_size,
                zoom_level,
            } => cell_size * 2f64.powi(zoom_level as i32 - level as i32),
        }
    }
}

impl Default for CellSizing {
    fn default() -> Self {
        CellSizing::ScreenUnits {
            size_meters: Self::DEFAULT_SCREEN_CELL_METERS,
        }
    }
}

/// Pyramid configuration
///
/// # Example
///
/// ```rust
/// use spatio_cluster::{CellSizing, Config};
///
/// let config = Config::default();
/// assert_eq!(config.min_zoom, 0);
/// assert_eq!(config.max_zoom, 19);
///
/// let json = r#"{
///     "min_zoom": 2,
///     "max_zoom": 8,
///     "cell_sizing": { "kind": "fixed", "cell_size": 100.0, "zoom_level": 8 }
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.cell_size(8), 100.0);
/// assert_eq!(config.cell_size(7), 200.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Coarsest zoom level with a grid
    #[serde(default = "Config::default_min_zoom")]
    pub min_zoom: ZoomLevel,

    /// Finest zoom level with a grid; raw items enter here
    #[serde(default = "Config::default_max_zoom")]
    pub max_zoom: ZoomLevel,

    #[serde(default)]
    pub cell_sizing: CellSizing,

    /// Clusters holding fewer items than this are drawn as their individual items
    #[serde(default = "Config::default_min_cluster_count")]
    pub min_cluster_count: usize,

    /// Scale denominator beyond which clustering is not rendered: a map zoomed out past
    /// it shows no clusters. Zero means no limit.
    #[serde(default)]
    pub min_scale_for_clustering: f64,
}

impl Config {
    const fn default_min_zoom() -> ZoomLevel {
        0
    }

    const fn default_max_zoom() -> ZoomLevel {
        19
    }

    const fn default_min_cluster_count() -> usize {
        2
    }

    /// Pyramid with a fixed cell size at a reference level.
    pub fn with_fixed_cell_size(
        min_zoom: ZoomLevel,
        max_zoom: ZoomLevel,
        cell_size: f64,
        zoom_level: ZoomLevel,
    ) -> Self {
        Self {
            min_zoom,
            max_zoom,
            cell_sizing: CellSizing::Fixed {
                cell_size,
                zoom_level,
            },
            ..Self::default()
        }
    }

    pub fn with_zoom_range(mut self, min_zoom: ZoomLevel, max_zoom: ZoomLevel) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn with_cell_sizing(mut self, sizing: CellSizing) -> Self {
        self.cell_sizing = sizing;
        self
    }

    pub fn with_min_cluster_count(mut self, count: usize) -> Self {
        self.min_cluster_count = count;
        self
    }

    pub fn with_min_scale_for_clustering(mut self, scale: f64) -> Self {
        self.min_scale_for_clustering = scale;
        self
    }

    /// Whether a cluster of `display_count` items is drawn as a cluster rather than as
    /// its items.
    pub fn displays_as_cluster(&self, display_count: usize) -> bool {
        display_count >= self.min_cluster_count
    }

    /// Whether clusters are rendered on a map displayed at `scale`.
    ///
    /// ```rust
    /// use spatio_cluster::Config;
    ///
    /// let config = Config::default().with_min_scale_for_clustering(1_000_000.0);
    /// assert!(config.will_cluster_at_scale(250_000.0));
    /// assert!(!config.will_cluster_at_scale(5_000_000.0));
    /// assert!(Config::default().will_cluster_at_scale(5_000_000.0));
    /// ```
    pub fn will_cluster_at_scale(&self, scale: f64) -> bool {
        scale.is_finite()
            && scale > 0.0
            && (self.min_scale_for_clustering == 0.0 || scale <= self.min_scale_for_clustering)
    }

    /// Map-unit cell size of the grid at `level`.
    pub fn cell_size(&self, level: ZoomLevel) -> f64 {
        self.cell_sizing.cell_size(level, self.max_zoom)
    }

    /// Number of grids in the pyramid.
    pub fn depth(&self) -> usize {
        (self.max_zoom as usize + 1).saturating_sub(self.min_zoom as usize)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_zoom > self.max_zoom {
            return Err(ClusterError::InvalidConfig(format!(
                "min_zoom ({}) must be <= max_zoom ({})",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(ClusterError::InvalidConfig(format!(
                "max_zoom ({}) exceeds the supported maximum of {}",
                self.max_zoom, MAX_SUPPORTED_ZOOM
            )));
        }

        match self.cell_sizing {
            CellSizing::ScreenUnits { size_meters } => {
                if !size_meters.is_finite() || size_meters <= 0.0 {
                    return Err(ClusterError::InvalidConfig(format!(
                        "screen cell size must be finite and positive, got {}",
                        size_meters
                    )));
                }
            }
            CellSizing::Fixed { cell_size, .. } => {
                if !cell_size.is_finite() || cell_size <= 0.0 {
                    return Err(ClusterError::InvalidConfig(format!(
                        "cell size must be finite and positive, got {}",
                        cell_size
                    )));
                }
            }
        }

        if !self.min_scale_for_clustering.is_finite() || self.min_scale_for_clustering < 0.0 {
            return Err(ClusterError::InvalidConfig(format!(
                "min_scale_for_clustering must be finite and non-negative, got {}",
                self.min_scale_for_clustering
            )));
        }

        for level in [self.min_zoom, self.max_zoom] {
            let size = self.cell_size(level);
            if !size.is_finite() || size <= 0.0 {
                return Err(ClusterError::InvalidConfig(format!(
                    "cell size at zoom level {} resolves to {}; increase the base cell size",
                    level, size
                )));
            }
        }

        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, picking the format from its extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "toml")]
            Some("toml") => Self::from_toml(&contents),
            Some("json") | None => Self::from_json(&contents),
            Some(other) => Err(ClusterError::InvalidConfig(format!(
                "unsupported configuration format '.{}'",
                other
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_zoom: Self::default_min_zoom(),
            max_zoom: Self::default_max_zoom(),
            cell_sizing: CellSizing::default(),
            min_cluster_count: Self::default_min_cluster_count(),
            min_scale_for_clustering: 0.0,
        }
    }
}
