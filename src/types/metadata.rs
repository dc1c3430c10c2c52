use crate::types::bounding_box::BoundingBox;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Failure,
}

/// What one provider contributed to a single query.
///
/// Records live only as long as the query response; nothing is persisted unless
/// the caller exports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadataRecord {
    pub provider: String,
    /// Column names as returned, before any per-provider suffix.
    pub columns: Vec<String>,
    /// Earliest and latest timestamp actually observed.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    /// Box enclosing the centres of the returned cells.
    pub bounding_box: Option<BoundingBox>,
    pub rows: usize,
    pub status: FetchStatus,
    pub error: Option<String>,
}

impl QueryMetadataRecord {
    pub fn success(
        provider: impl Into<String>,
        columns: Vec<String>,
        date_range: Option<(NaiveDate, NaiveDate)>,
        bounding_box: Option<BoundingBox>,
        rows: usize,
    ) -> Self {
        Self {
            provider: provider.into(),
            columns,
            date_range,
            bounding_box,
            rows,
            status: FetchStatus::Success,
            error: None,
        }
    }

    /// A provider that answered but had nothing for the query.
    pub fn no_rows(provider: impl Into<String>) -> Self {
        Self::success(provider, Vec::new(), None, None, 0)
    }

    pub fn failure(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            columns: Vec::new(),
            date_range: None,
            bounding_box: None,
            rows: 0,
            status: FetchStatus::Failure,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}
