//! Runs one query against every matching provider and combines the answers.

pub mod fetch;
pub mod retry;

pub use fetch::{FetchFailure, ProviderResult};
pub use retry::RetryPolicy;

use crate::error::AggregateError;
use crate::interpolate::interpolate;
use crate::merge::merge;
use crate::providers::FetchRequest;
use crate::query::validate_densify;
use crate::registry::SourceRegistry;
use crate::types::bounding_box::BoundingBox;
use crate::types::date_interval::DateInterval;
use crate::types::error::TableError;
use crate::types::metadata::QueryMetadataRecord;
use crate::types::observation_table::ObservationTable;
use log::{info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// A validated query with its region already resolved to a box.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub region: BoundingBox,
    pub time_range: DateInterval,
    pub level: u8,
    pub factors: BTreeSet<String>,
    pub separate_sources: bool,
    pub densify: bool,
    /// Overrides the orchestrator's default when set.
    pub per_source_timeout: Option<Duration>,
}

/// Result of a query. `NoData` means no provider returned anything usable,
/// which is distinct from a valid but empty table.
#[derive(Debug)]
pub enum AggregateOutcome {
    Data {
        table: ObservationTable,
        metadata: Vec<QueryMetadataRecord>,
    },
    NoData {
        metadata: Vec<QueryMetadataRecord>,
    },
}

impl AggregateOutcome {
    pub fn metadata(&self) -> &[QueryMetadataRecord] {
        match self {
            AggregateOutcome::Data { metadata, .. } | AggregateOutcome::NoData { metadata } => {
                metadata
            }
        }
    }

    pub fn table(&self) -> Option<&ObservationTable> {
        match self {
            AggregateOutcome::Data { table, .. } => Some(table),
            AggregateOutcome::NoData { .. } => None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, AggregateOutcome::NoData { .. })
    }
}

#[derive(Debug)]
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    retry: RetryPolicy,
    per_source_timeout: Duration,
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, retry: RetryPolicy, per_source_timeout: Duration) -> Self {
        Self {
            registry,
            retry,
            per_source_timeout,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Selects candidate providers, fetches from them concurrently, and merges
    /// (and optionally densifies) whatever came back.
    ///
    /// Provider failures never fail the query; they are recorded in the metadata.
    /// A region too large to densify is rejected before any provider is called.
    pub async fn aggregate(&self, query: &AggregateQuery) -> Result<AggregateOutcome, AggregateError> {
        if query.densify {
            validate_densify(&query.region, query.level)?;
        }
        let candidates = self
            .registry
            .candidates(&query.region, &query.time_range, &query.factors);
        if candidates.is_empty() {
            warn!("No provider covers {} over {}", query.region, query.time_range);
            return Ok(AggregateOutcome::NoData {
                metadata: Vec::new(),
            });
        }
        info!("Querying {} providers", candidates.len());

        let base = FetchRequest {
            spatial_range: query.region,
            time_range: query.time_range,
            factors: query.factors.clone(),
            level: query.level,
        };
        let timeout = query.per_source_timeout.unwrap_or(self.per_source_timeout);
        let results = fetch::dispatch(candidates, &base, &self.retry, timeout).await;

        let mut metadata = Vec::with_capacity(results.len());
        let mut tables = Vec::new();
        for ProviderResult { id, outcome } in results {
            match outcome {
                Ok(table) if table.is_empty() => {
                    metadata.push(QueryMetadataRecord::no_rows(&id));
                }
                Ok(table) => match summarize(&id, table, query.separate_sources) {
                    Ok((record, table)) => {
                        metadata.push(record);
                        tables.push(table);
                    }
                    Err(e) => {
                        warn!("Discarding table from provider '{id}': {e}");
                        metadata.push(QueryMetadataRecord::failure(&id, e.to_string()));
                    }
                },
                Err(failure) => {
                    metadata.push(QueryMetadataRecord::failure(&id, failure.to_string()));
                }
            }
        }

        if tables.is_empty() {
            warn!("No provider returned data");
            return Ok(AggregateOutcome::NoData { metadata });
        }

        let merged = merge(tables)?;
        let table = if query.densify {
            interpolate(&merged.table, &query.region, query.level)?
        } else {
            merged.table
        };
        Ok(AggregateOutcome::Data { table, metadata })
    }
}

/// Metadata for a non-empty provider table, and the table renamed if sources stay separate.
fn summarize(
    id: &str,
    table: ObservationTable,
    separate_sources: bool,
) -> Result<(QueryMetadataRecord, ObservationTable), TableError> {
    let record = QueryMetadataRecord::success(
        id,
        table.value_columns(),
        table.date_range()?,
        table.cell_bounds()?,
        table.height(),
    );
    let table = if separate_sources {
        table.with_suffix(id)?
    } else {
        table
    };
    Ok((record, table))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cells::GeoCell;
    use crate::providers::{ProviderAdapter, ProviderError};
    use crate::registry::tests::descriptor;
    use crate::types::metadata::FetchStatus;
    use crate::types::observation_table::TableBuilder;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    pub(crate) const TEMP: &str = "Temperature [°C]";

    /// Returns one fixed reading, recording the factors it was asked for.
    pub(crate) struct FixedAdapter {
        pub(crate) lat: f64,
        pub(crate) lon: f64,
        pub(crate) value: f64,
        pub(crate) seen_factors: Mutex<Vec<BTreeSet<String>>>,
    }

    impl FixedAdapter {
        pub(crate) fn new(lat: f64, lon: f64, value: f64) -> Self {
            Self {
                lat,
                lon,
                value,
                seen_factors: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for FixedAdapter {
        async fn fetch(&self, request: &FetchRequest) -> Result<ObservationTable, ProviderError> {
            self.seen_factors.lock().unwrap().push(request.factors.clone());
            let cell = GeoCell::from_lat_lon(self.lat, self.lon, request.level)?;
            let mut builder = TableBuilder::new();
            builder.push(request.time_range.start, cell, TEMP, Some(self.value));
            Ok(builder.build()?)
        }
    }

    struct SlowAdapter;

    #[async_trait]
    impl ProviderAdapter for SlowAdapter {
        async fn fetch(&self, _request: &FetchRequest) -> Result<ObservationTable, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ObservationTable::empty())
        }
    }

    struct FailingAdapter;

    #[async_trait]
    impl ProviderAdapter for FailingAdapter {
        async fn fetch(&self, _request: &FetchRequest) -> Result<ObservationTable, ProviderError> {
            Err(ProviderError::Other("upstream returned garbage".to_string()))
        }
    }

    struct PanickingAdapter;

    #[async_trait]
    impl ProviderAdapter for PanickingAdapter {
        async fn fetch(&self, _request: &FetchRequest) -> Result<ObservationTable, ProviderError> {
            panic!("adapter bug")
        }
    }

    fn query() -> AggregateQuery {
        AggregateQuery {
            region: BoundingBox::new(51.09, 41.33, 9.56, -5.14),
            time_range: DateInterval::parse("2020-01-01", "2020-01-02").unwrap(),
            level: 8,
            factors: ["temperature".to_string()].into(),
            separate_sources: false,
            densify: false,
            per_source_timeout: Some(Duration::from_millis(200)),
        }
    }

    fn orchestrator(registry: SourceRegistry) -> Orchestrator {
        Orchestrator::new(Arc::new(registry), RetryPolicy::none(), Duration::from_secs(600))
    }

    #[tokio::test]
    async fn test_timeout_and_error_do_not_affect_siblings() {
        let registry = SourceRegistry::builder()
            .register(descriptor("slow", BoundingBox::world(), &["temperature"]), Arc::new(SlowAdapter))
            .register(descriptor("broken", BoundingBox::world(), &["temperature"]), Arc::new(FailingAdapter))
            .register(
                descriptor("good", BoundingBox::world(), &["temperature"]),
                Arc::new(FixedAdapter::new(48.85, 2.35, 4.5)),
            )
            .build();

        let outcome = orchestrator(registry).aggregate(&query()).await.unwrap();
        let AggregateOutcome::Data { table, metadata } = outcome else {
            panic!("expected data");
        };
        assert_eq!(table.height(), 1);
        assert_eq!(table.values(TEMP).unwrap(), vec![Some(4.5)]);

        let ids: Vec<&str> = metadata.iter().map(|m| m.provider.as_str()).collect();
        assert_eq!(ids, vec!["slow", "broken", "good"]);
        assert_eq!(metadata[0].status, FetchStatus::Failure);
        assert_eq!(metadata[0].error.as_deref(), Some("timeout"));
        assert_eq!(metadata[1].status, FetchStatus::Failure);
        assert_eq!(metadata[1].error.as_deref(), Some("upstream returned garbage"));
        assert!(metadata[2].is_success());
        assert_eq!(metadata[2].rows, 1);
        assert_eq!(metadata[2].columns, vec![TEMP]);
    }

    #[tokio::test]
    async fn test_panicking_provider_is_recorded() {
        let registry = SourceRegistry::builder()
            .register(descriptor("panics", BoundingBox::world(), &["temperature"]), Arc::new(PanickingAdapter))
            .register(
                descriptor("good", BoundingBox::world(), &["temperature"]),
                Arc::new(FixedAdapter::new(48.85, 2.35, 1.0)),
            )
            .build();
        let outcome = orchestrator(registry).aggregate(&query()).await.unwrap();
        assert!(!outcome.is_no_data());
        assert!(!outcome.metadata()[0].is_success());
        assert!(outcome.metadata()[1].is_success());
    }

    #[tokio::test]
    async fn test_all_failures_is_no_data() {
        let registry = SourceRegistry::builder()
            .register(descriptor("broken", BoundingBox::world(), &["temperature"]), Arc::new(FailingAdapter))
            .build();
        let outcome = orchestrator(registry).aggregate(&query()).await.unwrap();
        assert!(outcome.is_no_data());
        assert_eq!(outcome.metadata().len(), 1);
        assert!(outcome.table().is_none());

        let nothing_matches = SourceRegistry::builder()
            .register(descriptor("soil", BoundingBox::world(), &["soil"]), Arc::new(FailingAdapter))
            .build();
        let outcome = orchestrator(nothing_matches).aggregate(&query()).await.unwrap();
        assert!(outcome.is_no_data());
        assert!(outcome.metadata().is_empty());
    }

    #[tokio::test]
    async fn test_separate_sources_and_factor_intersection() {
        let a = Arc::new(FixedAdapter::new(48.85, 2.35, 2.0));
        let b = Arc::new(FixedAdapter::new(48.85, 2.35, 6.0));
        let registry = SourceRegistry::builder()
            .register(descriptor("a", BoundingBox::world(), &["temperature", "wind"]), a.clone())
            .register(descriptor("b", BoundingBox::world(), &["temperature"]), b.clone())
            .build();

        let mut separate = query();
        separate.factors = ["temperature".to_string(), "precipitation".to_string()].into();
        separate.separate_sources = true;
        let outcome = orchestrator(registry).aggregate(&separate).await.unwrap();
        let table = outcome.table().unwrap();

        assert_eq!(table.height(), 1);
        assert_eq!(
            table.value_columns(),
            vec!["Temperature [°C] (a)", "Temperature [°C] (b)"]
        );
        assert_eq!(table.values("Temperature [°C] (a)").unwrap(), vec![Some(2.0)]);
        assert_eq!(table.values("Temperature [°C] (b)").unwrap(), vec![Some(6.0)]);
        // Metadata keeps the unsuffixed names.
        assert_eq!(outcome.metadata()[0].columns, vec![TEMP]);

        let expected: BTreeSet<String> = ["temperature".to_string()].into();
        assert_eq!(*a.seen_factors.lock().unwrap(), vec![expected.clone()]);
        assert_eq!(*b.seen_factors.lock().unwrap(), vec![expected]);
    }

    #[tokio::test]
    async fn test_oversized_densify_is_rejected_before_dispatch() {
        let adapter = Arc::new(FixedAdapter::new(48.85, 2.35, 2.0));
        let registry = SourceRegistry::builder()
            .register(descriptor("a", BoundingBox::world(), &["temperature"]), adapter.clone())
            .build();
        let mut dense = query();
        dense.level = 13;
        dense.densify = true;

        let result = orchestrator(registry).aggregate(&dense).await;
        assert!(matches!(
            result,
            Err(AggregateError::DensifyGridTooLarge { level: 13, .. })
        ));
        assert!(adapter.seen_factors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_cell_is_averaged_without_separation() {
        let registry = SourceRegistry::builder()
            .register(
                descriptor("a", BoundingBox::world(), &["temperature"]),
                Arc::new(FixedAdapter::new(48.85, 2.35, 2.0)),
            )
            .register(
                descriptor("b", BoundingBox::world(), &["temperature"]),
                Arc::new(FixedAdapter::new(48.85, 2.35, 6.0)),
            )
            .build();
        let outcome = orchestrator(registry).aggregate(&query()).await.unwrap();
        let table = outcome.table().unwrap();
        assert_eq!(table.values(TEMP).unwrap(), vec![Some(4.0)]);
        assert_eq!(
            table.timestamps().unwrap(),
            vec![NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()]
        );
    }
}
