//! Meteostat station catalogue: download, disk cache and spatial index.

use crate::providers::meteostat::error::StationCacheError;
use crate::types::bounding_box::{BoundingBox, LatLon};
use crate::types::date_interval::DateInterval;
use crate::utils::is_cache_fresh;
use async_compression::tokio::bufread::GzipDecoder;
use bincode::config::{Configuration, Fixint, LittleEndian};
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use log::{info, warn};
use reqwest::Client;
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::io::StreamReader;

const STATIONS_URL: &str = "https://bulk.meteostat.net/v2/stations/lite.json.gz";
const BINCODE_CACHE_FILE_NAME: &str = "stations_lite.bin";
const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();

/// A Meteostat weather station, reduced to what the adapter needs.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Station {
    /// Meteostat station identifier, e.g. "10637".
    pub id: String,
    pub country: String,
    /// Station names by language code.
    pub name: HashMap<String, String>,
    pub location: Location,
    pub inventory: Inventory,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above sea level.
    pub elevation: Option<i32>,
}

/// Data availability as reported by the catalogue. Gaps may exist inside the range.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Inventory {
    pub daily: DateRange,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Station {
    pub fn lat_lon(&self) -> LatLon {
        LatLon(self.location.latitude, self.location.longitude)
    }

    /// Whether the daily inventory overlaps `interval`. Stations without a
    /// reported daily range never match.
    pub fn has_daily_data_in(&self, interval: &DateInterval) -> bool {
        let (Some(start), Some(end)) = (self.inventory.daily.start, self.inventory.daily.end) else {
            return false;
        };
        start <= interval.end && end >= interval.start
    }
}

impl RTreeObject for Station {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.latitude, self.location.longitude])
    }
}

/// R-tree over the station catalogue, keyed on `[latitude, longitude]`.
#[derive(Debug, Clone)]
pub struct StationIndex {
    rtree: RTree<Station>,
}

impl StationIndex {
    pub fn from_stations(stations: Vec<Station>) -> Self {
        Self {
            rtree: RTree::bulk_load(stations),
        }
    }

    /// Loads the catalogue from `cache_dir`, downloading it when the cache is
    /// missing or older than `max_age`.
    pub async fn load(
        cache_dir: &Path,
        max_age: Duration,
        client: &Client,
    ) -> Result<Self, StationCacheError> {
        let cache_file = cache_dir.join(BINCODE_CACHE_FILE_NAME);

        let stations = if is_cache_fresh(&cache_file, max_age).await {
            info!("Loading station catalogue from {}", cache_file.display());
            let path = cache_file.clone();
            tokio::task::spawn_blocking(move || Self::read_cache(&path)).await??
        } else {
            warn!(
                "Station catalogue cache missing or stale, fetching {}",
                STATIONS_URL
            );
            let stations = Self::download(client).await?;
            Self::write_cache(stations.clone(), &cache_file).await?;
            stations
        };

        Ok(Self::from_stations(stations))
    }

    pub fn len(&self) -> usize {
        self.rtree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.rtree.size() == 0
    }

    /// Stations inside `bbox` (edges included) with daily data overlapping `interval`.
    pub fn within(&self, bbox: &BoundingBox, interval: &DateInterval) -> Vec<&Station> {
        let envelope = AABB::from_corners([bbox.south, bbox.west], [bbox.north, bbox.east]);
        self.rtree
            .locate_in_envelope(&envelope)
            .filter(|station| station.has_daily_data_in(interval))
            .collect()
    }

    fn read_cache(cache_path: &Path) -> Result<Vec<Station>, StationCacheError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| StationCacheError::CacheRead(cache_path.to_path_buf(), e))?;
        let (stations, _) = bincode::serde::decode_from_slice::<Vec<Station>, _>(
            &bytes,
            BINCODE_CONFIG,
        )
        .map_err(|e| StationCacheError::CacheDecode(cache_path.to_path_buf(), Box::new(e)))?;
        Ok(stations)
    }

    async fn download(client: &Client) -> Result<Vec<Station>, StationCacheError> {
        let response = client
            .get(STATIONS_URL)
            .send()
            .await
            .map_err(|e| StationCacheError::NetworkRequest(STATIONS_URL.to_string(), e))?;
        let response = response.error_for_status().map_err(|e| match e.status() {
            Some(status) => StationCacheError::HttpStatus {
                url: STATIONS_URL.to_string(),
                status,
                source: e,
            },
            None => StationCacheError::NetworkRequest(STATIONS_URL.to_string(), e),
        })?;

        let stream = response.bytes_stream().map_err(io::Error::other);
        let gzip_decoder = GzipDecoder::new(BufReader::new(StreamReader::new(stream)));
        let mut reader = BufReader::new(gzip_decoder);
        let mut json = Vec::with_capacity(20_000_000);
        reader.read_to_end(&mut json).await?;

        let parse_start = Instant::now();
        let stations = tokio::task::spawn_blocking(move || {
            serde_json::from_slice::<Vec<Station>>(&json).map_err(StationCacheError::from)
        })
        .await??;
        info!(
            "Parsed {} stations in {:?}",
            stations.len(),
            parse_start.elapsed()
        );
        Ok(stations)
    }

    async fn write_cache(stations: Vec<Station>, cache_path: &Path) -> Result<(), StationCacheError> {
        let bytes = tokio::task::spawn_blocking(move || {
            bincode::serde::encode_to_vec(stations, BINCODE_CONFIG)
                .map_err(|e| StationCacheError::CacheEncode(Box::new(e)))
        })
        .await??;
        tokio::fs::write(cache_path, &bytes)
            .await
            .map_err(|e| StationCacheError::CacheWrite(cache_path.to_path_buf(), e))?;
        info!(
            "Wrote station cache ({} bytes) to {}",
            bytes.len(),
            cache_path.display()
        );
        Ok(())
    }
}
