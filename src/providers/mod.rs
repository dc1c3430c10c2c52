//! The uniform fetch contract every data source implements, plus the built-in adapters.

pub mod error;
pub mod meteostat;

pub use error::ProviderError;

use crate::types::bounding_box::BoundingBox;
use crate::types::date_interval::DateInterval;
use crate::types::observation_table::ObservationTable;
use async_trait::async_trait;
use std::collections::BTreeSet;

/// What the orchestrator asks of one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub spatial_range: BoundingBox,
    pub time_range: DateInterval,
    /// Factors requested by the caller that this provider declares support for.
    pub factors: BTreeSet<String>,
    /// Cell level the returned table must be keyed at.
    pub level: u8,
}

/// A data source that can answer a [`FetchRequest`].
///
/// Implementations return a table keyed by `(Timestamp, GeoCell)` at the
/// requested level, with stable variable+unit column labels so the merger can
/// align columns across providers. "No data" is an empty table, never an error;
/// errors are reserved for transport and parsing failures.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ObservationTable, ProviderError>;
}
