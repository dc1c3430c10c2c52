//! Densifies a sparse cell table onto every cell of a region.
//!
//! For each variable and day the known cell centres are triangulated in the
//! `(lon, lat)` plane and the target cell centres are interpolated linearly.
//! Targets outside the convex hull, and days with fewer than three
//! non-collinear points, fall back to the nearest known value.

pub mod nearest;
pub mod triangulation;

use crate::cells::{cells_needed, CellError, GeoCell};
use crate::interpolate::nearest::NearestNeighbour;
use crate::interpolate::triangulation::Triangulation;
use crate::types::bounding_box::{BoundingBox, LatLon};
use crate::types::error::TableError;
use crate::types::observation_table::{ObservationTable, TableBuilder};
use chrono::NaiveDate;
use log::debug;
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Upper bound on sampling points when rasterizing a region.
pub const MAX_SAMPLES: usize = 4_000_000;

#[derive(Debug, Error)]
pub enum InterpolationError {
    #[error(transparent)]
    Cell(#[from] CellError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Sampling grid of {rows}x{cols} points is too large, use a coarser level or a smaller region")]
    GridTooLarge { rows: usize, cols: usize },
}

/// `n` evenly spaced values from `start` to `end`, both included.
fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![(start + end) / 2.0];
    }
    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// `(rows, cols)` of the sampling grid used to rasterize `region` at `level`.
///
/// Both edges of the region are sampled, so consecutive samples are never
/// further apart than [`cells_needed`] allows.
///
/// # Errors
///
/// [`InterpolationError::GridTooLarge`] when the grid exceeds [`MAX_SAMPLES`].
pub fn sampling_grid(region: &BoundingBox, level: u8) -> Result<(usize, usize), InterpolationError> {
    let (rows, cols) = cells_needed(region, level)?;
    let (rows, cols) = (rows + 1, cols + 1);
    if rows.saturating_mul(cols) > MAX_SAMPLES {
        return Err(InterpolationError::GridTooLarge { rows, cols });
    }
    Ok((rows, cols))
}

/// The cells at `level` covering `region`, sorted by id.
///
/// The region is sampled on a grid dense enough to hit every cell; only cells
/// whose centre lies inside the region are kept, unless that would leave none.
pub fn target_cells(region: &BoundingBox, level: u8) -> Result<Vec<GeoCell>, InterpolationError> {
    let (rows, cols) = sampling_grid(region, level)?;

    let mut sampled = BTreeSet::new();
    for lat in linspace(region.south, region.north, rows) {
        for lon in linspace(region.west, region.east, cols) {
            sampled.insert(GeoCell::from_lat_lon(lat, lon, level)?);
        }
    }

    let inside: Vec<GeoCell> = sampled
        .iter()
        .copied()
        .filter(|cell| {
            let (lat, lon) = cell.center();
            region.contains(LatLon(lat, lon))
        })
        .collect();
    if inside.is_empty() {
        return Ok(sampled.into_iter().collect());
    }
    Ok(inside)
}

fn plane_point(cell: GeoCell) -> [f64; 2] {
    let (lat, lon) = cell.center();
    [lon, lat]
}

/// Estimates a value at every target from the known `(point, value)` pairs.
fn estimate(known: &[([f64; 2], f64)], targets: &[[f64; 2]]) -> Vec<Option<f64>> {
    // Coincident points would make the triangulation degenerate; average them.
    let mut unique: BTreeMap<(OrderedFloat<f64>, OrderedFloat<f64>), (f64, u32)> = BTreeMap::new();
    for (point, value) in known {
        let entry = unique
            .entry((OrderedFloat(point[0]), OrderedFloat(point[1])))
            .or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    if unique.is_empty() {
        return vec![None; targets.len()];
    }
    let (points, values): (Vec<[f64; 2]>, Vec<f64>) = unique
        .into_iter()
        .map(|((x, y), (sum, count))| ([x.into_inner(), y.into_inner()], sum / f64::from(count)))
        .unzip();

    let nearest = NearestNeighbour::new(&points, &values);
    let triangulation = Triangulation::new(&points);
    if triangulation.is_none() {
        debug!(
            "{} points cannot be triangulated, using nearest neighbour",
            points.len()
        );
    }

    let mut fallbacks = 0;
    let estimates: Vec<Option<f64>> = targets
        .iter()
        .map(|target| {
            triangulation
                .as_ref()
                .and_then(|t| t.interpolate(&values, *target))
                .or_else(|| {
                    fallbacks += 1;
                    nearest.value_at(*target)
                })
        })
        .collect();
    if triangulation.is_some() && fallbacks > 0 {
        debug!("{fallbacks} targets outside the convex hull, using nearest neighbour");
    }
    estimates
}

/// Fills every cell of `region` at `level` for each day present in `table`.
///
/// The output has the same columns as `table` but is keyed by the target cell
/// set. A variable with no known value on a day stays missing for that day.
pub fn interpolate(
    table: &ObservationTable,
    region: &BoundingBox,
    level: u8,
) -> Result<ObservationTable, InterpolationError> {
    let targets = target_cells(region, level)?;
    let target_points: Vec<[f64; 2]> = targets.iter().copied().map(plane_point).collect();

    let timestamps = table.timestamps()?;
    let cells = table.cells()?;
    let columns = table.value_columns();
    let column_values = columns
        .iter()
        .map(|column| table.values(column))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows_by_day: BTreeMap<NaiveDate, Vec<usize>> = BTreeMap::new();
    for (row, day) in timestamps.iter().enumerate() {
        rows_by_day.entry(*day).or_default().push(row);
    }
    debug!(
        "Interpolating {} rows onto {} cells over {} days",
        table.height(),
        targets.len(),
        rows_by_day.len()
    );

    let mut builder = TableBuilder::new().with_columns(&columns);
    for (day, rows) in &rows_by_day {
        for cell in &targets {
            builder.push_key(*day, *cell);
        }
        for (column, values) in columns.iter().zip(&column_values) {
            let known: Vec<([f64; 2], f64)> = rows
                .iter()
                .filter_map(|&row| values[row].map(|value| (plane_point(cells[row]), value)))
                .collect();
            for (cell, value) in targets.iter().zip(estimate(&known, &target_points)) {
                builder.push(*day, *cell, column, value);
            }
        }
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP: &str = "Temperature [°C]";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn region() -> BoundingBox {
        BoundingBox::new(50.0, 48.0, 4.0, 1.0)
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(0.0, 1.0, 3), vec![0.0, 0.5, 1.0]);
        assert_eq!(linspace(2.0, 4.0, 1), vec![3.0]);
    }

    /// Every cell centred inside `region` that a much finer grid can find.
    fn cells_on_fine_grid(region: &BoundingBox, level: u8, n: usize) -> BTreeSet<GeoCell> {
        let mut cells = BTreeSet::new();
        for lat in linspace(region.south, region.north, n) {
            for lon in linspace(region.west, region.east, n) {
                let cell = GeoCell::from_lat_lon(lat, lon, level).unwrap();
                let (c_lat, c_lon) = cell.center();
                if region.contains(LatLon(c_lat, c_lon)) {
                    cells.insert(cell);
                }
            }
        }
        cells
    }

    #[test]
    fn test_target_cells_cover_region() {
        let targets = target_cells(&region(), 8).unwrap();
        assert!(targets.len() > 1);
        for cell in &targets {
            assert_eq!(cell.level(), 8);
            let (lat, lon) = cell.center();
            assert!(region().contains(LatLon(lat, lon)));
        }
    }

    #[test]
    fn test_sampling_grid_skips_no_cell() {
        let high_latitude = BoundingBox::new(70.0, 60.0, 30.0, 5.0);
        for (bbox, level) in [(region(), 8), (high_latitude, 6), (high_latitude, 7)] {
            let targets: BTreeSet<GeoCell> = target_cells(&bbox, level).unwrap().into_iter().collect();
            let expected = cells_on_fine_grid(&bbox, level, 1000);
            assert!(expected.len() > 10, "{bbox} at level {level}");
            let missing: Vec<&GeoCell> = expected.difference(&targets).collect();
            assert!(
                missing.is_empty(),
                "{} cells skipped in {bbox} at level {level}: {missing:?}",
                missing.len()
            );
        }
    }

    #[test]
    fn test_sampling_grid_includes_both_edges() {
        let (rows, cols) = cells_needed(&region(), 8).unwrap();
        assert_eq!(sampling_grid(&region(), 8).unwrap(), (rows + 1, cols + 1));
    }

    #[test]
    fn test_tiny_region_keeps_sampled_cell() {
        let tiny = BoundingBox::new(49.0001, 49.0, 2.0001, 2.0);
        let targets = target_cells(&tiny, 3).unwrap();
        assert_eq!(targets, vec![GeoCell::from_lat_lon(49.0, 2.0, 3).unwrap()]);
    }

    #[test]
    fn test_grid_too_large() {
        assert!(matches!(
            target_cells(&BoundingBox::new(51.09, 41.33, 9.56, -5.14), 19),
            Err(InterpolationError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_fewer_than_three_points_use_nearest_neighbour() {
        let level = 8;
        let west = GeoCell::from_lat_lon(49.0, 1.5, level).unwrap();
        let east = GeoCell::from_lat_lon(49.0, 3.5, level).unwrap();
        let mut builder = TableBuilder::new();
        builder.push(day(1), west, TEMP, Some(1.0));
        builder.push(day(1), east, TEMP, Some(9.0));
        let sparse = builder.build().unwrap();

        let dense = interpolate(&sparse, &region(), level).unwrap();
        let targets = target_cells(&region(), level).unwrap();
        assert_eq!(dense.height(), targets.len());

        let distance_2 = |a: [f64; 2], b: [f64; 2]| (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2);
        let (west_point, east_point) = (plane_point(west), plane_point(east));
        let values = dense.values(TEMP).unwrap();
        for (cell, value) in dense.cells().unwrap().into_iter().zip(values) {
            let point = plane_point(cell);
            let expected = if distance_2(point, west_point) < distance_2(point, east_point) {
                1.0
            } else {
                9.0
            };
            assert_eq!(value, Some(expected));
        }
    }

    #[test]
    fn test_linear_interpolation_inside_hull() {
        let level = 8;
        let corners = [(48.1, 1.1), (48.1, 3.9), (49.9, 3.9), (49.9, 1.1)];
        let mut builder = TableBuilder::new();
        for (lat, lon) in corners {
            let cell = GeoCell::from_lat_lon(lat, lon, level).unwrap();
            builder.push(day(1), cell, TEMP, Some(5.0));
        }
        let dense = interpolate(&builder.build().unwrap(), &region(), level).unwrap();
        // A constant field stays constant under linear and nearest interpolation.
        for value in dense.values(TEMP).unwrap() {
            assert!((value.unwrap() - 5.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_days_and_missing_columns() {
        let level = 8;
        let cell = GeoCell::from_lat_lon(49.0, 2.5, level).unwrap();
        let mut builder = TableBuilder::new().with_columns(["Snow depth [mm]"]);
        builder.push(day(1), cell, TEMP, Some(3.0));
        builder.push(day(2), cell, TEMP, Some(4.0));
        let dense = interpolate(&builder.build().unwrap(), &region(), level).unwrap();

        let targets = target_cells(&region(), level).unwrap().len();
        assert_eq!(dense.height(), 2 * targets);
        assert!(dense
            .values("Snow depth [mm]")
            .unwrap()
            .iter()
            .all(Option::is_none));
        assert_eq!(dense.date_range().unwrap(), Some((day(1), day(2))));
    }
}
