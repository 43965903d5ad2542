use bytes::Bytes;
use geo::Point;
use serde::{Deserialize, Serialize};

/// A single clusterable point.
///
/// The coordinate is expected in a projected working space (for example web mercator
/// meters), not raw longitude/latitude, so that cell sizes scale consistently across
/// zoom levels. The payload is never inspected by the index; it defaults to raw bytes
/// but any type can be used to point back at the originating domain object.
///
/// # Examples
///
/// ```
/// use spatio_cluster_types::item::ClusterItem;
/// use bytes::Bytes;
/// use geo::Point;
///
/// let payload = Bytes::from_static(b"red");
/// let item: ClusterItem = ClusterItem::new("hydrant:7", Point::new(10.0, 20.0), payload);
/// assert_eq!(item.x(), 10.0);
/// assert_eq!(item.payload().as_ref(), b"red");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterItem<P = Bytes> {
    /// Identity of the item, unique among all items of one index
    pub key: String,
    /// Projected location of the item
    pub coordinate: Point<f64>,
    /// Opaque reference back to the caller's object
    pub payload: P,
}

impl<P> ClusterItem<P> {
    /// Create a new item.
    pub fn new(key: impl Into<String>, coordinate: Point<f64>, payload: P) -> Self {
        Self {
            key: key.into(),
            coordinate,
            payload,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn coordinate(&self) -> Point<f64> {
        self.coordinate
    }

    pub fn x(&self) -> f64 {
        self.coordinate.x()
    }

    pub fn y(&self) -> f64 {
        self.coordinate.y()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Whether both ordinates are finite (neither NaN nor infinite).
    #[inline]
    pub fn has_finite_coordinate(&self) -> bool {
        self.x().is_finite() && self.y().is_finite()
    }
}

impl ClusterItem<Bytes> {
    /// Create an item whose payload is a copy of the given bytes.
    pub fn with_bytes(key: impl Into<String>, coordinate: Point<f64>, payload: &[u8]) -> Self {
        Self::new(key, coordinate, Bytes::copy_from_slice(payload))
    }
}
