//! The main entry point: configuration plus the [`Aggregator`] client.

use crate::error::AggregateError;
use crate::orchestrator::{AggregateOutcome, AggregateQuery, Orchestrator, RetryPolicy};
use crate::query::{validate_densify, validate_factors, validate_level, AggregateRequest, Region};
use crate::registry::regions::RegionCatalogue;
use crate::registry::SourceRegistry;
use crate::types::date_interval::DateInterval;
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::{bon, Builder};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Process-wide settings, fixed when the [`Aggregator`] is created.
///
/// # Examples
///
/// ```
/// use envfuse::AggregatorConfig;
/// use std::time::Duration;
///
/// let config = AggregatorConfig::builder()
///     .per_source_timeout(Duration::from_secs(60))
///     .station_concurrency(4)
///     .build();
/// assert_eq!(config.cache_max_age, Duration::from_secs(7 * 24 * 3600));
/// ```
#[derive(Debug, Clone, Builder)]
pub struct AggregatorConfig {
    /// Budget for one provider call, retries included.
    #[builder(default = Duration::from_secs(600))]
    pub per_source_timeout: Duration,
    #[builder(default)]
    pub retry: RetryPolicy,
    /// Where adapters keep their disk caches. Defaults to the system cache directory.
    pub cache_dir: Option<PathBuf>,
    /// Disk caches older than this are refreshed.
    #[builder(default = Duration::from_secs(7 * 24 * 3600))]
    pub cache_max_age: Duration,
    /// Concurrent sub-requests per provider.
    #[builder(default = 8)]
    pub station_concurrency: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AggregatorConfig {
    /// The configured cache directory, or the system default.
    pub fn resolve_cache_dir(&self) -> Result<PathBuf, AggregateError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => get_cache_dir().map_err(AggregateError::CacheDirResolution),
        }
    }
}

/// Aggregates environmental observations from every registered provider.
///
/// # Examples
///
/// ```no_run
/// use envfuse::{Aggregator, AggregateError, AggregateOutcome, BoundingBox, DateInterval};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), AggregateError> {
/// let aggregator = Aggregator::new().await?;
/// let outcome = aggregator
///     .aggregate()
///     .region(BoundingBox::new(51.09, 41.33, 9.56, -5.14))
///     .time_range(DateInterval::parse("2020-01-01", "2020-01-02")?)
///     .level(8)
///     .factors(vec!["temperature".to_string()])
///     .call()
///     .await?;
///
/// match outcome {
///     AggregateOutcome::Data { table, metadata } => {
///         println!("{} rows from {} providers", table.height(), metadata.len());
///     }
///     AggregateOutcome::NoData { .. } => println!("No data could be retrieved"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Aggregator {
    orchestrator: Orchestrator,
    regions: RegionCatalogue,
}

#[bon]
impl Aggregator {
    /// Creates an aggregator with the built-in providers and default settings.
    pub async fn new() -> Result<Self, AggregateError> {
        Self::with_config(AggregatorConfig::default()).await
    }

    /// Creates an aggregator with the built-in providers, creating the cache directory if needed.
    pub async fn with_config(config: AggregatorConfig) -> Result<Self, AggregateError> {
        let cache_dir = config.resolve_cache_dir()?;
        ensure_cache_dir_exists(&cache_dir)
            .await
            .map_err(|e| AggregateError::CacheDirCreation(cache_dir.clone(), e))?;
        let config = AggregatorConfig {
            cache_dir: Some(cache_dir),
            ..config
        };
        let registry = SourceRegistry::with_default_providers(&config)?;
        Ok(Self::with_registry(registry, config))
    }

    /// Creates an aggregator over a caller-built registry.
    pub fn with_registry(registry: SourceRegistry, config: AggregatorConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(
                Arc::new(registry),
                config.retry,
                config.per_source_timeout,
            ),
            regions: RegionCatalogue::default(),
        }
    }

    /// Replaces the built-in European region catalogue.
    pub fn with_regions(self, regions: RegionCatalogue) -> Self {
        Self { regions, ..self }
    }

    pub fn registry(&self) -> &SourceRegistry {
        self.orchestrator.registry()
    }

    pub fn regions(&self) -> &RegionCatalogue {
        &self.regions
    }

    /// Aggregates `factors` over `region` and `time_range` onto cells at `level`.
    ///
    /// # Arguments
    ///
    /// * `.region(impl Into<Region>)`: **Required.** A [`BoundingBox`](crate::BoundingBox) or named regions.
    /// * `.time_range(DateInterval)`: **Required.** Inclusive dates.
    /// * `.level(u8)`: **Required.** Cell level, `1..=19`.
    /// * `.factors(Vec<String>)`: **Required.** Factor names, e.g. `"temperature"`.
    /// * `.separate_sources(bool)`: Optional. Suffix columns with the provider id instead of averaging across providers. Defaults to `false`.
    /// * `.per_source_timeout(Duration)`: Optional. Overrides the configured per-provider budget.
    /// * `.densify(bool)`: Optional. Interpolate onto every cell of the region. Defaults to `false`.
    ///
    /// # Errors
    ///
    /// Only malformed parameters fail the call. Provider failures are reported
    /// in the metadata, and a query no provider could answer yields
    /// [`AggregateOutcome::NoData`].
    #[builder]
    pub async fn aggregate(
        &self,
        #[builder(into)] region: Region,
        time_range: DateInterval,
        level: u8,
        factors: Vec<String>,
        separate_sources: Option<bool>,
        per_source_timeout: Option<Duration>,
        densify: Option<bool>,
    ) -> Result<AggregateOutcome, AggregateError> {
        validate_level(level)?;
        let factors = validate_factors(&factors, &self.registry().supported_factors())?;
        let region = region.resolve(&self.regions)?;
        let densify = densify.unwrap_or(false);
        if densify {
            validate_densify(&region, level)?;
        }

        let query = AggregateQuery {
            region,
            time_range,
            level,
            factors,
            separate_sources: separate_sources.unwrap_or(false),
            densify,
            per_source_timeout,
        };
        self.orchestrator.aggregate(&query).await
    }

    /// Validates a caller request and runs it.
    pub async fn run(&self, request: &AggregateRequest) -> Result<AggregateOutcome, AggregateError> {
        let validated = request.validate(&self.registry().supported_factors())?;
        self.aggregate()
            .region(validated.region)
            .time_range(validated.time_range)
            .level(validated.level)
            .factors(validated.factors.into_iter().collect())
            .separate_sources(validated.separate_sources)
            .densify(validated.densify)
            .call()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cells::GeoCell;
    use crate::orchestrator::tests::{FixedAdapter, TEMP};
    use crate::registry::tests::{descriptor, EmptyAdapter};
    use crate::types::bounding_box::BoundingBox;
    use chrono::NaiveDate;

    fn scenario_aggregator() -> Aggregator {
        let registry = SourceRegistry::builder()
            .register(
                descriptor("A", BoundingBox::new(51.09, 41.33, 9.56, -5.14), &["temperature"]),
                Arc::new(FixedAdapter::new(48.85, 2.35, 3.7)),
            )
            .register(
                descriptor("B", BoundingBox::new(51.09, 41.33, 9.56, 2.21), &["temperature"]),
                Arc::new(EmptyAdapter),
            )
            .build();
        Aggregator::with_registry(registry, AggregatorConfig::default())
    }

    #[tokio::test]
    async fn test_end_to_end_two_providers() {
        let aggregator = scenario_aggregator();
        let outcome = aggregator
            .aggregate()
            .region(BoundingBox::new(51.09, 41.33, 9.56, -5.14))
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(8)
            .factors(vec!["temperature".to_string()])
            .call()
            .await
            .unwrap();

        let AggregateOutcome::Data { table, metadata } = outcome else {
            panic!("expected data");
        };
        assert_eq!(table.height(), 1);
        assert_eq!(
            table.cells().unwrap(),
            vec![GeoCell::from_lat_lon(48.85, 2.35, 8).unwrap()]
        );
        assert_eq!(
            table.timestamps().unwrap(),
            vec![NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()]
        );
        assert_eq!(table.values(TEMP).unwrap(), vec![Some(3.7)]);

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].provider, "A");
        assert_eq!(metadata[0].rows, 1);
        assert_eq!(metadata[1].provider, "B");
        assert!(metadata[1].is_success());
        assert_eq!(metadata[1].rows, 0);
    }

    #[tokio::test]
    async fn test_named_region_and_request_validation() {
        let aggregator = scenario_aggregator();
        let outcome = aggregator
            .aggregate()
            .region(vec!["France".to_string()])
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(8)
            .factors(vec!["temperature".to_string()])
            .densify(false)
            .call()
            .await
            .unwrap();
        assert_eq!(outcome.table().unwrap().height(), 1);

        let unknown = aggregator
            .aggregate()
            .region(vec!["Atlantis".to_string()])
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(8)
            .factors(vec!["temperature".to_string()])
            .call()
            .await;
        assert!(matches!(unknown, Err(AggregateError::UnknownRegion(_))));

        let missing = aggregator
            .aggregate()
            .region(Vec::<String>::new())
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(8)
            .factors(vec!["temperature".to_string()])
            .call()
            .await;
        assert!(matches!(missing, Err(AggregateError::MissingRegion)));

        let unsupported = aggregator
            .aggregate()
            .region(BoundingBox::new(51.09, 41.33, 9.56, -5.14))
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(8)
            .factors(vec!["groundwater".to_string()])
            .call()
            .await;
        assert!(matches!(unsupported, Err(AggregateError::UnknownFactor(_))));
    }

    #[tokio::test]
    async fn test_run_with_densify() {
        let aggregator = scenario_aggregator();
        let request = AggregateRequest {
            bounding_box: Some((49.5, 48.5, 3.0, 1.5)),
            countries: Vec::new(),
            level: 8,
            time_from: "2020-01-01".to_string(),
            time_to: "2020-01-01".to_string(),
            factors: vec!["temperature".to_string()],
            separate_sources: false,
            interpolation: true,
        };
        let outcome = aggregator.run(&request).await.unwrap();
        let table = outcome.table().unwrap();
        assert!(table.height() > 1);
        assert!(table
            .values(TEMP)
            .unwrap()
            .iter()
            .all(|value| *value == Some(3.7)));
    }

    #[tokio::test]
    async fn test_oversized_densify_fails_before_fetching() {
        let adapter = Arc::new(FixedAdapter::new(48.85, 2.35, 3.7));
        let registry = SourceRegistry::builder()
            .register(
                descriptor("A", BoundingBox::new(51.09, 41.33, 9.56, -5.14), &["temperature"]),
                adapter.clone(),
            )
            .build();
        let aggregator = Aggregator::with_registry(registry, AggregatorConfig::default());

        let result = aggregator
            .aggregate()
            .region(BoundingBox::new(51.09, 41.33, 9.56, -5.14))
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(13)
            .factors(vec!["temperature".to_string()])
            .densify(true)
            .call()
            .await;

        let error = result.unwrap_err();
        assert!(matches!(error, AggregateError::DensifyGridTooLarge { level: 13, .. }));
        assert!(error.is_input_error());
        assert!(adapter.seen_factors.lock().unwrap().is_empty());

        // The same query without densification goes through.
        let outcome = aggregator
            .aggregate()
            .region(BoundingBox::new(51.09, 41.33, 9.56, -5.14))
            .time_range(DateInterval::parse("2020-01-01", "2020-01-02").unwrap())
            .level(13)
            .factors(vec!["temperature".to_string()])
            .call()
            .await
            .unwrap();
        assert_eq!(outcome.table().unwrap().height(), 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = AggregatorConfig::default();
        assert_eq!(config.per_source_timeout, Duration::from_secs(600));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.station_concurrency, 8);
        assert!(config.cache_dir.is_none());

        let dir = tempfile::tempdir().unwrap();
        let custom = AggregatorConfig::builder()
            .cache_dir(dir.path().to_path_buf())
            .build();
        assert_eq!(custom.resolve_cache_dir().unwrap(), dir.path());
    }
}
