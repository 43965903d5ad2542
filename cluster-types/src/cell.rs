use geo::{Point, Rect, coord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer zoom level. Lower numbers are coarser, higher numbers are finer.
pub type ZoomLevel = u8;

/// Integer address of a square grid cell at one zoom level.
///
/// Cells are anchored at the origin of the working coordinate space:
/// `row = floor(y / cell_size)` and `col = floor(x / cell_size)`. Ordering is
/// row-major, which is the enumeration order of a grid's clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: i64,
    pub col: i64,
}

impl CellCoord {
    pub const fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }

    /// Cell containing `point` for the given cell size.
    ///
    /// # Panics
    ///
    /// Panics if either ordinate of `point` is NaN or infinite, if `cell_size` is not a
    /// finite positive number, or if the cell index would not fit in an `i64`.
    ///
    /// # Examples
    ///
    /// ```
    /// use spatio_cluster_types::cell::CellCoord;
    /// use geo::Point;
    ///
    /// let cell = CellCoord::for_point(Point::new(250.0, -10.0), 100.0);
    /// assert_eq!(cell, CellCoord::new(-1, 2));
    /// ```
    pub fn for_point(point: Point<f64>, cell_size: f64) -> Self {
        assert!(
            point.x().is_finite() && point.y().is_finite(),
            "cannot compute a grid cell for non-finite coordinate ({}, {})",
            point.x(),
            point.y()
        );
        assert!(
            cell_size.is_finite() && cell_size > 0.0,
            "cell size must be finite and positive, got {}",
            cell_size
        );

        let row = (point.y() / cell_size).floor();
        let col = (point.x() / cell_size).floor();
        assert!(
            in_index_range(row) && in_index_range(col),
            "coordinate ({}, {}) lies outside the addressable cells of size {}",
            point.x(),
            point.y(),
            cell_size
        );

        Self {
            row: row as i64,
            col: col as i64,
        }
    }

    /// Whether [`for_point`](Self::for_point) accepts `point` at this cell size.
    pub fn is_addressable(point: Point<f64>, cell_size: f64) -> bool {
        point.x().is_finite()
            && point.y().is_finite()
            && cell_size.is_finite()
            && cell_size > 0.0
            && in_index_range((point.y() / cell_size).floor())
            && in_index_range((point.x() / cell_size).floor())
    }

    /// Geometric center of the cell.
    pub fn centroid(&self, cell_size: f64) -> Point<f64> {
        Point::new(
            (self.col as f64 + 0.5) * cell_size,
            (self.row as f64 + 0.5) * cell_size,
        )
    }

    /// Map-unit extent of the cell.
    pub fn extent(&self, cell_size: f64) -> Rect<f64> {
        Rect::new(
            coord! { x: self.col as f64 * cell_size, y: self.row as f64 * cell_size },
            coord! { x: (self.col + 1) as f64 * cell_size, y: (self.row + 1) as f64 * cell_size },
        )
    }
}

/// `i64::MIN as f64` is exactly -2^63 and `i64::MAX as f64` rounds up to 2^63, so the
/// largest accepted index leaves room for `index + 1`.
fn in_index_range(index: f64) -> bool {
    index >= i64::MIN as f64 && index < i64::MAX as f64
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Stable identity of a cluster: the zoom level of its owning grid plus its cell.
///
/// Each occupied cell holds exactly one cluster, so the pair is unique. The zoom
/// level doubles as a non-owning handle to the owning grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId {
    pub zoom: ZoomLevel,
    pub cell: CellCoord,
}

impl ClusterId {
    pub const fn new(zoom: ZoomLevel, cell: CellCoord) -> Self {
        Self { zoom, cell }
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z{}:{}:{}", self.zoom, self.cell.row, self.cell.col)
    }
}
