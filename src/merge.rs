//! Combines per-provider tables into one, averaging rows that share a key.

use crate::types::error::TableError;
use crate::types::observation_table::{ObservationTable, GEO_CELL, TIMESTAMP};
use log::{debug, warn};
use polars::prelude::*;

/// Result of [`merge`], with the row counts needed to detect averaging.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub table: ObservationTable,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl MergeOutput {
    /// Whether any rows were collapsed into a shared `(Timestamp, GeoCell)` key.
    pub fn aggregated(&self) -> bool {
        self.rows_in != self.rows_out
    }
}

/// Concatenates `tables` and averages every value column per `(Timestamp, GeoCell)`.
///
/// Tables with different columns are concatenated diagonally, so a column
/// missing from one table is null for its rows. Missing values do not count
/// towards a mean. The output is sorted by key.
pub fn merge(tables: Vec<ObservationTable>) -> Result<MergeOutput, TableError> {
    let rows_in: usize = tables.iter().map(ObservationTable::height).sum();

    let mut value_columns: Vec<String> = Vec::new();
    for table in &tables {
        for column in table.value_columns() {
            if !value_columns.contains(&column) {
                value_columns.push(column);
            }
        }
    }

    let frames: Vec<LazyFrame> = tables
        .into_iter()
        .map(|table| table.into_frame().lazy())
        .collect();
    if frames.is_empty() {
        return Ok(MergeOutput {
            table: ObservationTable::empty(),
            rows_in: 0,
            rows_out: 0,
        });
    }

    let means: Vec<Expr> = value_columns
        .iter()
        .map(|column| col(column.as_str()).mean())
        .collect();
    let frame = concat_lf_diagonal(frames, UnionArgs::default())?
        .group_by([col(TIMESTAMP), col(GEO_CELL)])
        .agg(means)
        .sort([TIMESTAMP, GEO_CELL], SortMultipleOptions::default())
        .collect()?;

    let rows_out = frame.height();
    if rows_out != rows_in {
        warn!("some data were aggregated");
        debug!("Merged {rows_in} rows into {rows_out}");
    }

    Ok(MergeOutput {
        table: ObservationTable::from_valid_frame(frame),
        rows_in,
        rows_out,
    })
}
