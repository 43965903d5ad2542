//! Multi-resolution spatial clustering index for drawing large point sets on a map.
//!
//! Items enter a grid at the finest zoom level and are grouped by cell. Every cluster
//! is then pushed, as a weighted representative, into the cell of the next coarser
//! grid, level by level, so each zoom level holds a complete partition of all items.
//!
//! ```rust
//! use spatio_cluster::{ClusterError, ClusterItem, ClusteringEngine, EngineBuilder, Point};
//!
//! let mut engine: ClusteringEngine<&str> = EngineBuilder::new()
//!     .zoom_range(3, 5)
//!     .fixed_cell_size(100.0, 5)
//!     .build()?;
//!
//! engine.add_items([
//!     ClusterItem::new("a", Point::new(10.0, 10.0), "A"),
//!     ClusterItem::new("b", Point::new(50.0, 50.0), "B"),
//!     ClusterItem::new("c", Point::new(300.0, 300.0), "C"),
//! ]);
//!
//! // two clusters of 100 units at zoom 5, a single one of 400 units at zoom 3
//! assert_eq!(engine.cluster_count(5), 2);
//! assert_eq!(engine.cluster_count(3), 1);
//!
//! let top = engine.clusters_at_zoom_level(3).next().unwrap();
//! assert_eq!(top.display_count(), 3);
//! assert_eq!(top.features().count(), 3);
//! # Ok::<(), ClusterError>(())
//! ```

pub mod builder;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod grid;
pub mod lod;
pub mod progress;
pub mod pyramid;
pub mod validation;

#[cfg(feature = "geojson")]
pub mod export;

#[cfg(feature = "sync")]
pub mod sync;

pub use builder::EngineBuilder;
pub use cluster::{Addable, Cluster, Representative};
pub use config::{CellSizing, Config};
pub use engine::{
    BatchSummary, ClusterRef, ClusterSummary, ClusteringEngine, EngineState, EngineStats,
    Features,
};
pub use error::{ClusterError, Result};
pub use grid::{ClusterGrid, GridRow};
pub use lod::LevelOfDetail;
pub use progress::{
    CancellationToken, ChannelObserver, NoProgress, ProgressEvent, ProgressObserver,
};
pub use pyramid::Pyramid;

#[cfg(feature = "geojson")]
pub use export::ExportOptions;

#[cfg(feature = "sync")]
pub use sync::SyncClusteringEngine;

pub use spatio_cluster_types::{CellCoord, ClusterId, ClusterItem, Coverage, ZoomLevel};

pub use geo::{Point, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{ClusterError, EngineBuilder, Result};

    pub use geo::{Point, Rect};

    pub use crate::{ClusterId, ClusterItem, Coverage, ZoomLevel};

    pub use crate::{ClusterRef, ClusteringEngine, Config};

    pub use crate::{CancellationToken, ProgressEvent, ProgressObserver};

    #[cfg(feature = "sync")]
    pub use crate::SyncClusteringEngine;
}
