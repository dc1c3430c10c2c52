//! Writes query results to disk: the table as CSV, the metadata as JSON.

use crate::types::error::TableError;
use crate::types::metadata::QueryMetadataRecord;
use crate::types::observation_table::{ObservationTable, GEO_CELL};
use log::info;
use polars::prelude::*;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write export file")]
    Io(#[from] io::Error),

    #[error("Failed to serialize table")]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("Failed to serialize metadata")]
    Json(#[from] serde_json::Error),
}

/// Writes `table` as comma-separated text with a header row.
///
/// Cells are written as tokens rather than raw ids, so they survive tools
/// that read numbers as doubles.
pub fn write_csv(table: &ObservationTable, path: &Path) -> Result<(), ExportError> {
    let tokens: Vec<String> = table.cells()?.iter().map(|cell| cell.token()).collect();
    let mut frame = table.frame().clone();
    frame.with_column(Column::new(GEO_CELL.into(), tokens))?;

    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut frame)?;
    info!("Wrote {} rows to {}", table.height(), path.display());
    Ok(())
}

pub fn write_metadata_json(records: &[QueryMetadataRecord], path: &Path) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.flush()?;
    Ok(())
}
