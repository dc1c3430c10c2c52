use chrono::NaiveDate;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DateError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDateFormat(String, #[source] chrono::ParseError),

    #[error("Date range starts after it ends: {start} > {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Required key column '{0}' not found")]
    MissingKeyColumn(&'static str),

    #[error("Key column '{column}' has type {found}, expected {expected}")]
    KeyColumnType {
        column: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Duplicate row key ({timestamp}, {cell})")]
    DuplicateKey { timestamp: NaiveDate, cell: String },

    #[error("Key column '{0}' contains missing values")]
    NullKey(&'static str),

    #[error("Cell id {0:#x} is not a valid cell")]
    InvalidCell(u64),

    #[error("Failed processing DataFrame: {0}")]
    DataFrameProcessing(#[from] PolarsError),
}
