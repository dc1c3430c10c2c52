use crate::cells::CellError;
use crate::interpolate::InterpolationError;
use crate::registry::regions::RegionError;
use crate::types::error::{DateError, TableError};
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDateFormat(String, #[source] chrono::ParseError),

    #[error("Date range starts after it ends: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Unknown region '{0}'")]
    UnknownRegion(String),

    #[error("Either a bounding box or a list of regions is required")]
    MissingRegion,

    #[error("A bounding box and a list of regions are mutually exclusive")]
    AmbiguousRegion,

    #[error("Invalid level {0}, expected 1..=19")]
    InvalidLevel(u8),

    #[error("Invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("Unknown factor '{0}'")]
    UnknownFactor(String),

    #[error("At least one factor is required")]
    NoFactors,

    #[error("Region too large to densify at level {level} ({rows}x{cols} samples), use a coarser level or a smaller region")]
    DensifyGridTooLarge { level: u8, rows: usize, cols: usize },

    #[error(transparent)]
    Cell(CellError),

    #[error("Failed to parse region catalogue")]
    RegionCatalogue(#[source] serde_json::Error),

    #[error("Failed to merge provider tables")]
    Merge(#[from] TableError),

    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),
}

impl AggregateError {
    /// Whether the error stems from malformed query parameters rather than processing.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            AggregateError::InvalidDateFormat(..)
                | AggregateError::InvalidDateRange { .. }
                | AggregateError::UnknownRegion(_)
                | AggregateError::MissingRegion
                | AggregateError::AmbiguousRegion
                | AggregateError::InvalidLevel(_)
                | AggregateError::InvalidBoundingBox(_)
                | AggregateError::UnknownFactor(_)
                | AggregateError::NoFactors
                | AggregateError::DensifyGridTooLarge { .. }
                | AggregateError::Cell(_)
        )
    }
}

impl From<DateError> for AggregateError {
    fn from(e: DateError) -> Self {
        match e {
            DateError::InvalidDateFormat(value, source) => {
                AggregateError::InvalidDateFormat(value, source)
            }
            DateError::InvalidDateRange { start, end } => {
                AggregateError::InvalidDateRange { start, end }
            }
        }
    }
}

impl From<RegionError> for AggregateError {
    fn from(e: RegionError) -> Self {
        match e {
            RegionError::UnknownRegion(name) => AggregateError::UnknownRegion(name),
            RegionError::MissingRegion => AggregateError::MissingRegion,
            RegionError::CatalogueParse(source) => AggregateError::RegionCatalogue(source),
        }
    }
}

impl From<CellError> for AggregateError {
    fn from(e: CellError) -> Self {
        match e {
            CellError::InvalidLevel(level) => AggregateError::InvalidLevel(level),
            other => AggregateError::Cell(other),
        }
    }
}
