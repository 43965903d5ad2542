use geo::{Area, BoundingRect, ConvexHull, Intersects, Line, MultiPoint, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Aggregate geometry of every item a cluster transitively holds.
///
/// The shape degrades with the number of distinct member coordinates: one coordinate
/// is a zero-area point, two (or any collinear set) a segment, anything else the
/// convex hull of the members.
///
/// # Examples
///
/// ```
/// use spatio_cluster_types::coverage::Coverage;
/// use geo::Point;
///
/// let coverage = Coverage::from_points([
///     Point::new(0.0, 0.0),
///     Point::new(10.0, 0.0),
///     Point::new(10.0, 10.0),
///     Point::new(0.0, 10.0),
/// ]).unwrap();
///
/// assert!(coverage.contains(&Point::new(5.0, 5.0)));
/// assert!(coverage.contains(&Point::new(10.0, 5.0))); // boundary counts
/// assert!(!coverage.contains(&Point::new(11.0, 5.0)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Coverage {
    /// A single distinct coordinate
    Point(Point<f64>),
    /// Two distinct coordinates, or collinear coordinates spanning this segment
    Segment(Line<f64>),
    /// Convex hull with non-zero area
    Hull(Polygon<f64>),
}

impl Coverage {
    /// Build the coverage of a set of coordinates. Returns `None` for an empty set.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point<f64>>,
    {
        let mut points: Vec<Point<f64>> = points.into_iter().collect();
        points.sort_by(|a, b| a.x().total_cmp(&b.x()).then(a.y().total_cmp(&b.y())));
        points.dedup();

        match points.as_slice() {
            [] => None,
            [only] => Some(Coverage::Point(*only)),
            [a, b] => Some(Coverage::Segment(Line::new(*a, *b))),
            _ => {
                // Lexicographic extremes of a collinear set are its segment endpoints.
                let first = points[0];
                let last = points[points.len() - 1];
                let hull = MultiPoint::from(points).convex_hull();
                if hull.unsigned_area() == 0.0 {
                    Some(Coverage::Segment(Line::new(first, last)))
                } else {
                    Some(Coverage::Hull(hull))
                }
            }
        }
    }

    /// Coordinates that fully determine this coverage.
    ///
    /// `Coverage::from_points(coverage.vertices())` yields the same coverage.
    pub fn vertices(&self) -> Vec<Point<f64>> {
        match self {
            Coverage::Point(p) => vec![*p],
            Coverage::Segment(line) => vec![line.start_point(), line.end_point()],
            Coverage::Hull(polygon) => {
                let ring = polygon.exterior();
                let mut vertices: Vec<Point<f64>> = ring.points().collect();
                if ring.is_closed() {
                    vertices.pop();
                }
                vertices
            }
        }
    }

    /// Whether `point` lies inside or on the boundary of this coverage.
    pub fn contains(&self, point: &Point<f64>) -> bool {
        match self {
            Coverage::Point(p) => p == point,
            Coverage::Segment(line) => line.intersects(point),
            Coverage::Hull(polygon) => polygon.intersects(point),
        }
    }

    pub fn bounding_rect(&self) -> Rect<f64> {
        match self {
            Coverage::Point(p) => p.bounding_rect(),
            Coverage::Segment(line) => line.bounding_rect(),
            Coverage::Hull(polygon) => polygon.bounding_rect().unwrap_or_else(|| {
                let start = polygon.exterior().0.first().copied().unwrap_or_default();
                Rect::new(start, start)
            }),
        }
    }

    /// Area in square map units. Zero for points and segments.
    pub fn area(&self) -> f64 {
        match self {
            Coverage::Hull(polygon) => polygon.unsigned_area(),
            _ => 0.0,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !matches!(self, Coverage::Hull(_))
    }
}

/// Smallest rectangle containing both inputs.
pub fn merge_rects(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}
