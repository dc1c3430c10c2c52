//! Geographic points and axis-aligned boxes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use envfuse::LatLon;
///
/// let berlin_center = LatLon(52.5200, 13.4050);
/// assert_eq!(berlin_center.0, 52.5200); // Latitude
/// assert_eq!(berlin_center.1, 13.4050); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

/// An axis-aligned box in decimal degrees, ordered `(north, south, east, west)`.
///
/// East and west are taken as given; a box crossing the antimeridian (`east < west`)
/// is not normalised and will not overlap anything on the far side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// The whole globe.
    pub fn world() -> Self {
        Self::new(90.0, -90.0, 180.0, -180.0)
    }

    /// Closed-rectangle containment test.
    pub fn contains(&self, point: LatLon) -> bool {
        let LatLon(lat, lon) = point;
        self.south <= lat && lat <= self.north && self.west <= lon && lon <= self.east
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            north: self.north.max(other.north),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            west: self.west.min(other.west),
        }
    }

    /// Smallest box containing every point, or `None` for an empty iterator.
    pub fn enclosing<I>(points: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = LatLon>,
    {
        points.into_iter().fold(None, |acc, LatLon(lat, lon)| {
            let point_box = BoundingBox::new(lat, lat, lon, lon);
            Some(match acc {
                Some(bbox) => bbox.union(&point_box),
                None => point_box,
            })
        })
    }

    /// `(north, south, east, west)` tuple form.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.north, self.south, self.east, self.west)
    }
}

impl From<(f64, f64, f64, f64)> for BoundingBox {
    fn from((north, south, east, west): (f64, f64, f64, f64)) -> Self {
        BoundingBox::new(north, south, east, west)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(N {}, S {}, E {}, W {})",
            self.north, self.south, self.east, self.west
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_is_envelope() {
        let a = BoundingBox::new(55.0, 49.0, 24.1, 14.1);
        let b = BoundingBox::new(51.1, 48.5, 18.9, 12.1);
        assert_eq!(a.union(&b), BoundingBox::new(55.0, 48.5, 24.1, 12.1));
    }

    #[test]
    fn test_enclosing_points() {
        let bbox = BoundingBox::enclosing([LatLon(1.0, 2.0), LatLon(-3.0, 4.0), LatLon(0.5, -1.0)]);
        assert_eq!(bbox, Some(BoundingBox::new(1.0, -3.0, 4.0, -1.0)));
        assert_eq!(BoundingBox::enclosing(Vec::new()), None);
    }
}
