//! The canonical `(Timestamp, GeoCell)`-keyed table exchanged between providers,
//! the merger and the interpolator.

use crate::cells::GeoCell;
use crate::types::bounding_box::{BoundingBox, LatLon};
use crate::types::error::TableError;
use chrono::NaiveDate;
use log::debug;
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Name of the date key column.
pub const TIMESTAMP: &str = "Timestamp";
/// Name of the cell key column (raw `u64` cell ids).
pub const GEO_CELL: &str = "GeoCell";

/// A table of observations keyed by `(Timestamp, GeoCell)`.
///
/// The wrapped `DataFrame` always starts with the two key columns (`Date` and
/// `UInt64`), followed by one `Float64` column per variable, labelled with a
/// human-readable name and unit such as `"Temperature [°C]"`. Keys are unique.
#[derive(Debug, Clone)]
pub struct ObservationTable {
    frame: DataFrame,
}

impl ObservationTable {
    /// A table with the key columns and no rows.
    pub fn empty() -> Self {
        let schema = Schema::from_iter([
            Field::new(TIMESTAMP.into(), DataType::Date),
            Field::new(GEO_CELL.into(), DataType::UInt64),
        ]);
        Self {
            frame: DataFrame::empty_with_schema(&schema),
        }
    }

    /// Validates an adapter-supplied frame and normalises its value columns to `Float64`.
    ///
    /// # Errors
    ///
    /// Fails if a key column is missing, has the wrong type, contains nulls or
    /// invalid cell ids, or if a `(Timestamp, GeoCell)` key occurs twice.
    pub fn try_from_frame(mut frame: DataFrame) -> Result<Self, TableError> {
        check_key_type(&frame, TIMESTAMP, DataType::Date, "date")?;
        check_key_type(&frame, GEO_CELL, DataType::UInt64, "u64")?;

        let names: Vec<String> = frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let value_columns: Vec<String> = names
            .into_iter()
            .filter(|name| name != TIMESTAMP && name != GEO_CELL)
            .collect();

        for name in &value_columns {
            let casted = frame.column(name)?.cast(&DataType::Float64)?;
            frame.with_column(casted)?;
        }

        let ordered = [TIMESTAMP.to_string(), GEO_CELL.to_string()]
            .into_iter()
            .chain(value_columns);
        let table = Self {
            frame: frame.select(ordered)?,
        };

        let timestamps = table.timestamps()?;
        let cells = table.cells()?;
        let mut seen = HashSet::with_capacity(timestamps.len());
        for (timestamp, cell) in timestamps.into_iter().zip(cells) {
            if !seen.insert((timestamp, cell)) {
                return Err(TableError::DuplicateKey {
                    timestamp,
                    cell: cell.token(),
                });
            }
        }
        Ok(table)
    }

    /// Wraps a frame produced inside the crate that already satisfies the invariants.
    pub(crate) fn from_valid_frame(frame: DataFrame) -> Self {
        Self { frame }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn height(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Names of the non-key columns, in table order.
    pub fn value_columns(&self) -> Vec<String> {
        self.frame
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != TIMESTAMP && name.as_str() != GEO_CELL)
            .map(|name| name.to_string())
            .collect()
    }

    pub fn timestamps(&self) -> Result<Vec<NaiveDate>, TableError> {
        let dates = self
            .frame
            .column(TIMESTAMP)?
            .as_materialized_series()
            .date()?;
        dates
            .as_date_iter()
            .map(|date| date.ok_or(TableError::NullKey(TIMESTAMP)))
            .collect()
    }

    pub fn cells(&self) -> Result<Vec<GeoCell>, TableError> {
        let ids = self
            .frame
            .column(GEO_CELL)?
            .as_materialized_series()
            .u64()?;
        ids.into_iter()
            .map(|id| {
                let id = id.ok_or(TableError::NullKey(GEO_CELL))?;
                GeoCell::from_raw(id).ok_or(TableError::InvalidCell(id))
            })
            .collect()
    }

    /// Values of one variable column, `None` where missing.
    pub fn values(&self, column: &str) -> Result<Vec<Option<f64>>, TableError> {
        let series = self
            .frame
            .column(column)
            .map_err(|_| TableError::ColumnNotFound(column.to_string()))?
            .as_materialized_series()
            .cast(&DataType::Float64)?;
        let values = series.f64()?;
        Ok(values.into_iter().collect())
    }

    /// Earliest and latest timestamp present.
    pub fn date_range(&self) -> Result<Option<(NaiveDate, NaiveDate)>, TableError> {
        let timestamps = self.timestamps()?;
        let min = timestamps.iter().min().copied();
        let max = timestamps.iter().max().copied();
        Ok(min.zip(max))
    }

    /// Box enclosing the centres of every cell in the table.
    pub fn cell_bounds(&self) -> Result<Option<BoundingBox>, TableError> {
        let cells: BTreeSet<GeoCell> = self.cells()?.into_iter().collect();
        Ok(BoundingBox::enclosing(cells.into_iter().map(|cell| {
            let (lat, lon) = cell.center();
            LatLon(lat, lon)
        })))
    }

    /// Appends ` (suffix)` to every value column name.
    pub fn with_suffix(mut self, suffix: &str) -> Result<Self, TableError> {
        for name in self.value_columns() {
            let renamed = format!("{name} ({suffix})");
            self.frame.rename(&name, renamed.into())?;
        }
        Ok(self)
    }
}

fn check_key_type(
    frame: &DataFrame,
    name: &'static str,
    expected: DataType,
    expected_name: &'static str,
) -> Result<(), TableError> {
    let column = frame
        .column(name)
        .map_err(|_| TableError::MissingKeyColumn(name))?;
    if column.dtype() != &expected {
        return Err(TableError::KeyColumnType {
            column: name,
            expected: expected_name,
            found: column.dtype().to_string(),
        });
    }
    if column.null_count() > 0 {
        return Err(TableError::NullKey(name));
    }
    Ok(())
}

/// Accumulates observations and builds an [`ObservationTable`].
///
/// Observations landing on the same `(timestamp, cell, column)` are averaged,
/// which is how several stations inside one cell collapse into a single row.
///
/// # Examples
///
/// ```
/// use envfuse::{GeoCell, TableBuilder};
/// use chrono::NaiveDate;
///
/// let day = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let cell = GeoCell::from_lat_lon(50.0, 4.0, 8).unwrap();
///
/// let mut builder = TableBuilder::new();
/// builder.push(day, cell, "Temperature [°C]", Some(2.0));
/// builder.push(day, cell, "Temperature [°C]", Some(4.0));
/// let table = builder.build().unwrap();
///
/// assert_eq!(table.height(), 1);
/// assert_eq!(table.values("Temperature [°C]").unwrap(), vec![Some(3.0)]);
/// ```
#[derive(Debug, Default)]
pub struct TableBuilder {
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: BTreeMap<(NaiveDate, GeoCell), HashMap<usize, (f64, u32)>>,
    collapsed: usize,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares columns up front so they exist even when every value is missing.
    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in columns {
            self.column_slot(column.as_ref());
        }
        self
    }

    /// Registers a row key without any values.
    pub fn push_key(&mut self, timestamp: NaiveDate, cell: GeoCell) {
        self.rows.entry((timestamp, cell)).or_default();
    }

    /// Adds one observation. Missing and non-finite values only register the key.
    pub fn push(&mut self, timestamp: NaiveDate, cell: GeoCell, column: &str, value: Option<f64>) {
        let slot = self.column_slot(column);
        let row = self.rows.entry((timestamp, cell)).or_default();
        if let Some(value) = value.filter(|v| v.is_finite()) {
            let entry = row.entry(slot).or_insert((0.0, 0));
            if entry.1 > 0 {
                self.collapsed += 1;
            }
            entry.0 += value;
            entry.1 += 1;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Builds the table, rows sorted by `(Timestamp, GeoCell)`.
    pub fn build(self) -> Result<ObservationTable, TableError> {
        if self.collapsed > 0 {
            debug!(
                "Averaged {} observations sharing a cell and day",
                self.collapsed
            );
        }

        let mut timestamps = Vec::with_capacity(self.rows.len());
        let mut cells = Vec::with_capacity(self.rows.len());
        let mut values: Vec<Vec<Option<f64>>> =
            vec![Vec::with_capacity(self.rows.len()); self.columns.len()];

        for ((timestamp, cell), row) in &self.rows {
            timestamps.push(*timestamp);
            cells.push(cell.id());
            for (slot, column_values) in values.iter_mut().enumerate() {
                column_values.push(row.get(&slot).map(|(sum, count)| sum / f64::from(*count)));
            }
        }

        let mut columns = vec![
            Column::new(TIMESTAMP.into(), timestamps),
            Column::new(GEO_CELL.into(), cells),
        ];
        for (name, column_values) in self.columns.iter().zip(values) {
            columns.push(Column::new(name.as_str().into(), column_values));
        }
        Ok(ObservationTable::from_valid_frame(DataFrame::new(columns)?))
    }

    fn column_slot(&mut self, column: &str) -> usize {
        if let Some(slot) = self.column_index.get(column) {
            return *slot;
        }
        let slot = self.columns.len();
        self.columns.push(column.to_string());
        self.column_index.insert(column.to_string(), slot);
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, d).unwrap()
    }

    fn cell(lat: f64, lon: f64) -> GeoCell {
        GeoCell::from_lat_lon(lat, lon, 8).unwrap()
    }

    #[test]
    fn test_empty_table() {
        let table = ObservationTable::empty();
        assert!(table.is_empty());
        assert!(table.value_columns().is_empty());
        assert_eq!(table.date_range().unwrap(), None);
        assert_eq!(table.cell_bounds().unwrap(), None);
    }

    #[test]
    fn test_builder_sorts_and_averages() {
        let (a, b) = (cell(50.0, 4.0), cell(45.0, 2.0));
        let mut builder = TableBuilder::new().with_columns(["Snow depth [mm]"]);
        builder.push(day(2), a, "Temperature [°C]", Some(1.0));
        builder.push(day(1), b, "Temperature [°C]", Some(5.0));
        builder.push(day(1), b, "Temperature [°C]", Some(7.0));
        builder.push(day(1), b, "Temperature [°C]", None);
        builder.push(day(1), a, "Temperature [°C]", Some(f64::NAN));

        let table = builder.build().unwrap();
        assert_eq!(table.height(), 3);
        assert_eq!(
            table.value_columns(),
            vec!["Snow depth [mm]", "Temperature [°C]"]
        );
        assert_eq!(table.timestamps().unwrap(), vec![day(1), day(1), day(2)]);
        let temps = table.values("Temperature [°C]").unwrap();
        let first_day: Vec<(GeoCell, Option<f64>)> = table
            .cells()
            .unwrap()
            .into_iter()
            .zip(temps)
            .take(2)
            .collect();
        assert!(first_day.contains(&(b, Some(6.0))));
        assert!(first_day.contains(&(a, None)));
        assert_eq!(
            table.values("Snow depth [mm]").unwrap(),
            vec![None, None, None]
        );
        assert_eq!(table.date_range().unwrap(), Some((day(1), day(2))));
    }

    #[test]
    fn test_try_from_frame_validates_keys() {
        let c = cell(50.0, 4.0).id();
        let valid = df!(
            GEO_CELL => &[c, c],
            TIMESTAMP => &[day(1), day(2)],
            "Precipitation total [mm]" => &[1i32, 2]
        )
        .unwrap();
        let table = ObservationTable::try_from_frame(valid).unwrap();
        assert_eq!(table.frame().get_column_names()[0].as_str(), TIMESTAMP);
        assert_eq!(
            table.values("Precipitation total [mm]").unwrap(),
            vec![Some(1.0), Some(2.0)]
        );

        let duplicate = df!(
            TIMESTAMP => &[day(1), day(1)],
            GEO_CELL => &[c, c],
            "x" => &[1.0, 2.0]
        )
        .unwrap();
        assert!(matches!(
            ObservationTable::try_from_frame(duplicate),
            Err(TableError::DuplicateKey { .. })
        ));

        let missing = df!(TIMESTAMP => &[day(1)], "x" => &[1.0]).unwrap();
        assert!(matches!(
            ObservationTable::try_from_frame(missing),
            Err(TableError::MissingKeyColumn(GEO_CELL))
        ));

        let wrong_type = df!(TIMESTAMP => &["2020-01-01"], GEO_CELL => &[c]).unwrap();
        assert!(matches!(
            ObservationTable::try_from_frame(wrong_type),
            Err(TableError::KeyColumnType { .. })
        ));

        let bad_cell = df!(TIMESTAMP => &[day(1)], GEO_CELL => &[0u64]).unwrap();
        assert!(matches!(
            ObservationTable::try_from_frame(bad_cell),
            Err(TableError::InvalidCell(0))
        ));
    }

    #[test]
    fn test_with_suffix_and_bounds() {
        let (a, b) = (cell(50.0, 4.0), cell(45.0, 2.0));
        let mut builder = TableBuilder::new();
        builder.push(day(1), a, "Temperature [°C]", Some(1.0));
        builder.push(day(1), b, "Temperature [°C]", Some(2.0));
        let table = builder.build().unwrap().with_suffix("imgw").unwrap();
        assert_eq!(table.value_columns(), vec!["Temperature [°C] (imgw)"]);

        let bounds = table.cell_bounds().unwrap().unwrap();
        let (a_lat, a_lon) = a.center();
        let (b_lat, b_lon) = b.center();
        assert_eq!(bounds.north, a_lat.max(b_lat));
        assert_eq!(bounds.south, a_lat.min(b_lat));
        assert_eq!(bounds.east, a_lon.max(b_lon));
        assert_eq!(bounds.west, a_lon.min(b_lon));
    }
}
