//! Daily station observations from the Meteostat bulk data service.
//!
//! Stations inside the requested box are looked up in a cached catalogue,
//! their daily files are downloaded through a bounded worker pool, and every
//! station is snapped to its cell. Stations sharing a cell are averaged.

pub mod error;
pub mod loader;
pub mod stations;

use crate::cells::assign_cells;
use crate::providers::meteostat::loader::DailyDataLoader;
use crate::providers::meteostat::stations::{Station, StationIndex};
use crate::providers::{FetchRequest, ProviderAdapter, ProviderError};
use crate::registry::{Cadence, ProviderDescriptor, SpatialType};
use crate::types::bounding_box::{BoundingBox, LatLon};
use crate::types::date_interval::DateInterval;
use crate::types::observation_table::{ObservationTable, TableBuilder};
use crate::utils::ensure_cache_dir_exists;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use log::{debug, info, warn};
use polars::prelude::*;
use reqwest::Client;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::OnceCell;

/// A raw Meteostat daily column and the canonical label it is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyColumn {
    pub raw: &'static str,
    pub label: &'static str,
    pub factor: &'static str,
}

pub const DAILY_COLUMNS: [DailyColumn; 10] = [
    DailyColumn { raw: "tavg", label: "Temperature [°C]", factor: "temperature" },
    DailyColumn { raw: "tmin", label: "Minimum temperature [°C]", factor: "temperature" },
    DailyColumn { raw: "tmax", label: "Maximum temperature [°C]", factor: "temperature" },
    DailyColumn { raw: "prcp", label: "Precipitation total [mm]", factor: "precipitation" },
    DailyColumn { raw: "snow", label: "Snow depth [mm]", factor: "snow cover" },
    DailyColumn { raw: "wdir", label: "Wind direction [°]", factor: "wind" },
    DailyColumn { raw: "wspd", label: "Wind speed [km/h]", factor: "wind" },
    DailyColumn { raw: "wpgt", label: "Peak wind gust [km/h]", factor: "wind" },
    DailyColumn { raw: "pres", label: "Air pressure [hPa]", factor: "pressure" },
    DailyColumn { raw: "tsun", label: "Sunshine duration [min]", factor: "sunshine" },
];

pub const SUPPORTED_FACTORS: [&str; 6] = [
    "temperature",
    "precipitation",
    "snow cover",
    "wind",
    "pressure",
    "sunshine",
];

/// Columns to publish for the requested factors, in [`DAILY_COLUMNS`] order.
pub fn columns_for_factors(factors: &BTreeSet<String>) -> Vec<DailyColumn> {
    DAILY_COLUMNS
        .iter()
        .filter(|column| factors.contains(column.factor))
        .copied()
        .collect()
}

pub struct MeteostatAdapter {
    client: Client,
    cache_dir: PathBuf,
    cache_max_age: Duration,
    concurrency: usize,
    loader: DailyDataLoader,
    stations: OnceCell<StationIndex>,
}

impl MeteostatAdapter {
    pub const ID: &'static str = "meteostat";

    /// Creates the adapter. The station catalogue is loaded lazily on first fetch.
    pub fn new(cache_dir: &Path, cache_max_age: Duration, concurrency: usize) -> Self {
        let client = Client::new();
        Self {
            loader: DailyDataLoader::new(cache_dir, client.clone(), cache_max_age),
            client,
            cache_dir: cache_dir.to_path_buf(),
            cache_max_age,
            concurrency: concurrency.max(1),
            stations: OnceCell::new(),
        }
    }

    /// Uses an already loaded catalogue instead of the cached download.
    pub fn with_station_index(self, index: StationIndex) -> Self {
        Self {
            stations: OnceCell::new_with(Some(index)),
            ..self
        }
    }

    pub fn descriptor() -> ProviderDescriptor {
        let today: NaiveDate = Utc::now().date_naive();
        let since = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN);
        ProviderDescriptor {
            id: Self::ID.to_string(),
            spatial_coverage: BoundingBox::world(),
            temporal_coverage: DateInterval {
                start: since,
                end: today.max(since),
            },
            supported_factors: SUPPORTED_FACTORS.iter().map(|f| f.to_string()).collect(),
            cadence: Cadence::Daily,
            spatial_type: SpatialType::Point,
            quality_rank: 2,
        }
    }

    async fn station_index(&self) -> Result<&StationIndex, ProviderError> {
        let index = self
            .stations
            .get_or_try_init(|| async {
                ensure_cache_dir_exists(&self.cache_dir).await?;
                let index =
                    StationIndex::load(&self.cache_dir, self.cache_max_age, &self.client).await?;
                Ok::<_, ProviderError>(index)
            })
            .await?;
        Ok(index)
    }

    /// Daily rows of one station inside the request interval, with the raw
    /// columns cast to `Float64`.
    async fn station_rows(
        &self,
        station: &Station,
        time_range: &DateInterval,
        columns: &[DailyColumn],
    ) -> Result<Option<DataFrame>, ProviderError> {
        let Some(frame) = self.loader.daily_frame(&station.id).await? else {
            return Ok(None);
        };

        let mut selection = vec![col("date").cast(DataType::Date)];
        selection.extend(
            columns
                .iter()
                .map(|column| col(column.raw).cast(DataType::Float64)),
        );
        let df = frame
            .select(selection)
            .filter(
                col("date")
                    .gt_eq(lit(time_range.start))
                    .and(col("date").lt_eq(lit(time_range.end))),
            )
            .collect()?;
        Ok(Some(df))
    }
}

#[async_trait]
impl ProviderAdapter for MeteostatAdapter {
    async fn fetch(&self, request: &FetchRequest) -> Result<ObservationTable, ProviderError> {
        let columns = columns_for_factors(&request.factors);
        if columns.is_empty() {
            return Ok(ObservationTable::empty());
        }

        let index = self.station_index().await?;
        let stations = index.within(&request.spatial_range, &request.time_range);
        debug!(
            "{} Meteostat stations inside {} with daily data",
            stations.len(),
            request.spatial_range
        );
        let points: Vec<LatLon> = stations.iter().map(|station| station.lat_lon()).collect();
        let Some(assignments) = assign_cells(&points, &request.spatial_range, request.level)?
        else {
            return Ok(ObservationTable::empty());
        };

        let total = assignments.len();
        let results: Vec<_> = stream::iter(assignments)
            .map(|assignment| {
                let station = stations[assignment.index];
                let columns = &columns;
                async move {
                    let rows = self
                        .station_rows(station, &request.time_range, columns)
                        .await;
                    (assignment.cell, station, rows)
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut builder =
            TableBuilder::new().with_columns(columns.iter().map(|column| column.label));
        let mut failures = Vec::new();
        for (cell, station, rows) in results {
            let df = match rows {
                Ok(Some(df)) => df,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping Meteostat station {}: {}", station.id, e);
                    failures.push(e);
                    continue;
                }
            };

            let dates: Vec<Option<NaiveDate>> = df
                .column("date")?
                .as_materialized_series()
                .date()?
                .as_date_iter()
                .collect();
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let series = df.column(column.raw)?.as_materialized_series();
                values.push(series.f64()?.into_iter().collect::<Vec<Option<f64>>>());
            }

            for (row, date) in dates.into_iter().enumerate() {
                let Some(date) = date else { continue };
                builder.push_key(date, cell);
                for (column, column_values) in columns.iter().zip(&values) {
                    builder.push(date, cell, column.label, column_values[row]);
                }
            }
        }

        if failures.len() == total {
            if let Some(error) = failures.pop() {
                return Err(error);
            }
        }

        let table = builder.build()?;
        info!(
            "Meteostat returned {} rows from {} stations",
            table.height(),
            total - failures.len()
        );
        Ok(table)
    }
}
