//! Sampling-grid sizing and point-to-cell assignment.

use crate::cells::cell_id::{validate_level, GeoCell};
use crate::cells::error::CellError;
use crate::types::bounding_box::{BoundingBox, LatLon};
use haversine::{distance, Location, Units};
use log::info;

/// Surface area of the Earth used to derive mean cell sizes.
pub const EARTH_SURFACE_AREA_KM2: f64 = 510.1e6;

// Edges are taken at half their mean length so a sampling grid never steps over a cell.
const EDGE_SAFETY_FACTOR: f64 = 0.5;

/// Mean area of a single cell at `level`: the sphere split into `6 * 4^level` cells.
pub fn mean_cell_area_km2(level: u8) -> f64 {
    EARTH_SURFACE_AREA_KM2 / (6.0 * 4f64.powi(i32::from(level)))
}

/// Conservative estimate of a cell edge at `level`, in kilometres.
pub fn mean_cell_edge_km(level: u8) -> f64 {
    mean_cell_area_km2(level).sqrt() * EDGE_SAFETY_FACTOR
}

/// Number of `(rows, cols)` samples needed across `bbox` so that consecutive samples
/// fall in adjacent cells at `level`.
///
/// The height is the great-circle distance along the eastern meridian; the width is
/// measured along the parallel closest to the equator, where the box is widest.
/// Both dimensions are rounded up and never drop below one.
pub fn cells_needed(bbox: &BoundingBox, level: u8) -> Result<(usize, usize), CellError> {
    validate_level(level)?;
    let edge = mean_cell_edge_km(level);

    let height = distance(
        Location {
            latitude: bbox.north,
            longitude: bbox.east,
        },
        Location {
            latitude: bbox.south,
            longitude: bbox.east,
        },
        Units::Kilometers,
    );

    let widest_lat = if bbox.south <= 0.0 && bbox.north >= 0.0 {
        0.0
    } else if bbox.south > 0.0 {
        bbox.south
    } else {
        bbox.north
    };
    let width = distance(
        Location {
            latitude: widest_lat,
            longitude: bbox.west,
        },
        Location {
            latitude: widest_lat,
            longitude: bbox.east,
        },
        Units::Kilometers,
    );

    let rows = ((height / edge).ceil() as usize).max(1);
    let cols = ((width / edge).ceil() as usize).max(1);
    Ok((rows, cols))
}

/// A point that survived the bounding-box filter, together with its cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellAssignment {
    /// Index of the point in the input slice.
    pub index: usize,
    pub location: LatLon,
    pub cell: GeoCell,
}

/// Keeps the points inside `bbox` (closed rectangle) and maps each to its cell at `level`.
///
/// Returns `Ok(None)` when no point lies inside the box. That is a legitimate
/// "no data in range" outcome, not a failure.
pub fn assign_cells(
    points: &[LatLon],
    bbox: &BoundingBox,
    level: u8,
) -> Result<Option<Vec<CellAssignment>>, CellError> {
    validate_level(level)?;

    let assignments = points
        .iter()
        .enumerate()
        .filter(|(_, point)| bbox.contains(**point))
        .map(|(index, point)| {
            GeoCell::from_lat_lon(point.0, point.1, level).map(|cell| CellAssignment {
                index,
                location: *point,
                cell,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if assignments.is_empty() {
        info!("No data in the range {}", bbox);
        return Ok(None);
    }
    Ok(Some(assignments))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn europe() -> BoundingBox {
        BoundingBox::new(51.09, 41.33, 9.56, -5.14)
    }

    #[test]
    fn test_mean_cell_area_shrinks_by_four() {
        let l7 = mean_cell_area_km2(7);
        let l8 = mean_cell_area_km2(8);
        assert!((l7 / l8 - 4.0).abs() < 1e-9);
        assert!((mean_cell_area_km2(0) - EARTH_SURFACE_AREA_KM2 / 6.0).abs() < 1e-3);
    }

    #[test]
    fn test_cells_needed_grows_with_level() {
        let bbox = europe();
        let (rows_8, cols_8) = cells_needed(&bbox, 8).unwrap();
        let (rows_10, cols_10) = cells_needed(&bbox, 10).unwrap();
        assert!(rows_8 > 1 && cols_8 > 1);
        assert!(rows_10 > rows_8);
        assert!(cols_10 > cols_8);
    }

    #[test]
    fn test_cells_needed_spacing_is_finer_than_edge() {
        let bbox = europe();
        let level = 8;
        let (rows, _) = cells_needed(&bbox, level).unwrap();
        // ~1085 km north-south extent sampled at most half a mean edge apart.
        let spacing = 1085.0 / rows as f64;
        assert!(spacing <= mean_cell_area_km2(level).sqrt());
    }

    #[test]
    fn test_cells_needed_degenerate_box() {
        let point_box = BoundingBox::new(10.0, 10.0, 5.0, 5.0);
        assert_eq!(cells_needed(&point_box, 12).unwrap(), (1, 1));
        assert!(cells_needed(&point_box, 31).is_err());
    }

    #[test]
    fn test_assign_cells_filters_closed_rectangle() {
        let bbox = BoundingBox::new(50.0, 40.0, 10.0, 0.0);
        let points = [
            LatLon(50.0, 10.0), // on the north-east corner
            LatLon(45.0, 5.0),
            LatLon(40.0, 0.0), // on the south-west corner
            LatLon(50.0001, 5.0),
            LatLon(45.0, -0.0001),
        ];
        let assigned = assign_cells(&points, &bbox, 10).unwrap().unwrap();
        let indices: Vec<usize> = assigned.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for a in &assigned {
            assert_eq!(a.cell.level(), 10);
            assert_eq!(
                a.cell,
                GeoCell::from_lat_lon(a.location.0, a.location.1, 10).unwrap()
            );
        }
    }

    #[test]
    fn test_assign_cells_no_data_in_range() {
        let bbox = BoundingBox::new(50.0, 40.0, 10.0, 0.0);
        let points = [LatLon(-10.0, 5.0), LatLon(60.0, 5.0)];
        assert_eq!(assign_cells(&points, &bbox, 10).unwrap(), None);
        assert_eq!(assign_cells(&[], &bbox, 10).unwrap(), None);
    }
}
