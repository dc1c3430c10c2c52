//! Intersection predicates used to match a query against provider coverage.
//!
//! Both predicates treat their inputs as closed intervals, so boxes sharing an
//! edge and intervals sharing an endpoint overlap.

use crate::types::bounding_box::BoundingBox;
use crate::types::date_interval::DateInterval;

/// Whether two boxes intersect.
///
/// # Examples
///
/// ```
/// use envfuse::{boxes_overlap, BoundingBox};
///
/// let poland = BoundingBox::new(54.84, 49.00, 24.15, 14.12);
/// let germany = BoundingBox::new(55.06, 47.27, 15.04, 5.87);
/// assert!(boxes_overlap(&poland, &germany));
/// ```
pub fn boxes_overlap(a: &BoundingBox, b: &BoundingBox) -> bool {
    a.south <= b.north && a.north >= b.south && a.west <= b.east && a.east >= b.west
}

/// Whether two inclusive date intervals share at least one day.
pub fn intervals_overlap(a: &DateInterval, b: &DateInterval) -> bool {
    a.start <= b.end && a.end >= b.start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(start: &str, end: &str) -> DateInterval {
        DateInterval::parse(start, end).unwrap()
    }

    #[test]
    fn test_boxes_overlap_symmetric_and_reflexive() {
        let boxes = [
            BoundingBox::new(51.09, 41.33, 9.56, -5.14),
            BoundingBox::new(51.09, 41.33, 9.56, 2.21),
            BoundingBox::new(60.0, 55.0, 30.0, 20.0),
            BoundingBox::new(41.33, 30.0, 0.0, -10.0),
            BoundingBox::world(),
        ];
        for a in &boxes {
            assert!(boxes_overlap(a, a));
            for b in &boxes {
                assert_eq!(boxes_overlap(a, b), boxes_overlap(b, a));
            }
        }
    }

    #[test]
    fn test_boxes_touching_edges_overlap() {
        let a = BoundingBox::new(10.0, 0.0, 10.0, 0.0);
        let east_neighbour = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        let north_neighbour = BoundingBox::new(20.0, 10.0, 10.0, 0.0);
        assert!(boxes_overlap(&a, &east_neighbour));
        assert!(boxes_overlap(&a, &north_neighbour));
    }

    #[test]
    fn test_boxes_disjoint() {
        let a = BoundingBox::new(10.0, 0.0, 10.0, 0.0);
        let far_east = BoundingBox::new(10.0, 0.0, 30.0, 10.001);
        let far_south = BoundingBox::new(-0.001, -10.0, 10.0, 0.0);
        assert!(!boxes_overlap(&a, &far_east));
        assert!(!boxes_overlap(&a, &far_south));
    }

    #[test]
    fn test_intervals_overlap() {
        let january = interval("2020-01-01", "2020-01-31");
        let february = interval("2020-02-01", "2020-02-29");
        let touching = interval("2020-01-31", "2020-02-10");
        let single_day = interval("2020-01-15", "2020-01-15");

        assert!(intervals_overlap(&january, &january));
        assert!(!intervals_overlap(&january, &february));
        assert!(!intervals_overlap(&february, &january));
        assert!(intervals_overlap(&january, &touching));
        assert!(intervals_overlap(&touching, &january));
        assert!(intervals_overlap(&single_day, &january));
        assert!(intervals_overlap(&january, &single_day));
    }
}
