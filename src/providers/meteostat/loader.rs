//! Per-station daily CSV download with a Parquet cache.

use crate::providers::error::ProviderError;
use crate::utils::{ensure_cache_dir_exists, is_cache_fresh};
use async_compression::tokio::bufread::GzipDecoder;
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use polars::prelude::*;
use reqwest::{Client, StatusCode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::task;
use tokio_util::io::StreamReader;

const DAILY_URL_BASE: &str = "https://bulk.meteostat.net/v2/daily";

/// Column order of the headerless daily CSV files.
pub const DAILY_SCHEMA: [&str; 11] = [
    "date", "tavg", "tmin", "tmax", "prcp", "snow", "wdir", "wspd", "wpgt", "pres", "tsun",
];

pub struct DailyDataLoader {
    cache_dir: PathBuf,
    client: Client,
    max_age: Duration,
}

impl DailyDataLoader {
    pub fn new(cache_dir: &Path, client: Client, max_age: Duration) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
            client,
            max_age,
        }
    }

    /// Daily observations of one station with the columns of [`DAILY_SCHEMA`].
    ///
    /// Returns `Ok(None)` when Meteostat has no daily file for the station.
    pub async fn daily_frame(&self, station: &str) -> Result<Option<LazyFrame>, ProviderError> {
        let parquet_path = self.cache_dir.join(format!("daily_{station}.parquet"));

        if is_cache_fresh(&parquet_path, self.max_age).await {
            info!("Cache hit for daily data of station {station}");
        } else {
            warn!("Cache miss for daily data of station {station}, downloading");
            let Some(raw_bytes) = self.download(station).await? else {
                return Ok(None);
            };
            let df = Self::csv_to_dataframe(raw_bytes, station).await?;
            ensure_cache_dir_exists(&self.cache_dir).await?;
            Self::cache_dataframe(df, &parquet_path).await?;
        }

        Ok(Some(LazyFrame::scan_parquet(
            &parquet_path,
            Default::default(),
        )?))
    }

    async fn download(&self, station: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let url = format!("{DAILY_URL_BASE}/{station}.csv.gz");
        debug!("Downloading {url}");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkRequest(url.clone(), e))?;
        if response.status() == StatusCode::NOT_FOUND {
            info!("No daily data published for station {station}");
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| ProviderError::from_status_error(url.clone(), e))?;

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let mut decoder = GzipDecoder::new(StreamReader::new(stream));
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).await?;

        if decompressed.is_empty() {
            return Ok(None);
        }
        Ok(Some(decompressed))
    }

    /// Parses headerless CSV bytes in a blocking task and names the columns.
    async fn csv_to_dataframe(bytes: Vec<u8>, station: &str) -> Result<DataFrame, ProviderError> {
        let station = station.to_string();
        task::spawn_blocking(move || {
            let mut temp_file = NamedTempFile::new()?;
            temp_file.write_all(&bytes)?;
            temp_file.flush()?;

            let mut df = CsvReadOptions::default()
                .with_has_header(false)
                .try_into_reader_with_file_path(Some(temp_file.path().to_path_buf()))?
                .finish()?;

            if df.width() != DAILY_SCHEMA.len() {
                return Err(ProviderError::SchemaMismatch {
                    station,
                    expected: DAILY_SCHEMA.len(),
                    found: df.width(),
                });
            }
            df.set_column_names(DAILY_SCHEMA.iter().copied())?;
            Ok(df)
        })
        .await?
    }

    async fn cache_dataframe(mut df: DataFrame, path: &Path) -> Result<(), ProviderError> {
        let path = path.to_path_buf();
        task::spawn_blocking(move || {
            let file = std::fs::File::create(&path)?;
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)?;
            Ok::<(), ProviderError>(())
        })
        .await?
    }
}
