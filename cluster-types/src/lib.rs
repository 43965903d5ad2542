//! # spatio-cluster-types
//!
//! Core value types for the spatio-cluster index.
//!
//! - **Items**: `ClusterItem`, the leaf value callers feed into the index
//! - **Cells**: `CellCoord`, `ClusterId` and `ZoomLevel`, the integer addressing scheme
//!   shared by every zoom level of the pyramid
//! - **Coverage**: `Coverage`, the aggregate geometry of a cluster's members
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use spatio_cluster_types::item::ClusterItem;
//! use geo::Point;
//!
//! let item = ClusterItem::new("station:42", Point::new(1_250.0, -380.5), "Central");
//! assert_eq!(item.key(), "station:42");
//! ```

pub mod cell;
pub mod coverage;
pub mod item;

pub use cell::{CellCoord, ClusterId, ZoomLevel};
pub use coverage::Coverage;
pub use item::ClusterItem;
