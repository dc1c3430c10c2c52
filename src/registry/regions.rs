//! Named regions (countries) and their bounding boxes.

use crate::types::bounding_box::BoundingBox;
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Unknown region '{0}'")]
    UnknownRegion(String),

    #[error("No region given")]
    MissingRegion,

    #[error("Failed to parse region catalogue")]
    CatalogueParse(#[from] serde_json::Error),
}

/// `(name, north, south, east, west)` for the built-in European countries.
const EUROPE: [(&str, f64, f64, f64, f64); 44] = [
    ("Albania", 42.66, 39.64, 21.06, 19.26),
    ("Andorra", 42.66, 42.43, 1.79, 1.41),
    ("Austria", 49.02, 46.37, 17.16, 9.53),
    ("Belarus", 56.17, 51.26, 32.78, 23.18),
    ("Belgium", 51.51, 49.50, 6.41, 2.54),
    ("Bosnia and Herzegovina", 45.28, 42.56, 19.62, 15.72),
    ("Bulgaria", 44.22, 41.24, 28.61, 22.36),
    ("Croatia", 46.55, 42.39, 19.45, 13.49),
    ("Cyprus", 35.70, 34.56, 34.60, 32.27),
    ("Czechia", 51.06, 48.55, 18.86, 12.09),
    ("Denmark", 57.75, 54.56, 15.19, 8.07),
    ("Estonia", 59.68, 57.51, 28.21, 21.76),
    ("Finland", 70.09, 59.81, 31.59, 20.55),
    ("France", 51.09, 41.33, 9.56, -5.14),
    ("Germany", 55.06, 47.27, 15.04, 5.87),
    ("Greece", 41.75, 34.80, 29.65, 19.37),
    ("Hungary", 48.59, 45.74, 22.90, 16.11),
    ("Iceland", 66.57, 63.30, -13.50, -24.55),
    ("Ireland", 55.39, 51.42, -5.99, -10.48),
    ("Italy", 47.09, 35.49, 18.52, 6.63),
    ("Kosovo", 43.27, 41.86, 21.79, 20.01),
    ("Latvia", 58.09, 55.67, 28.24, 20.97),
    ("Liechtenstein", 47.27, 47.05, 9.64, 9.47),
    ("Lithuania", 56.45, 53.90, 26.84, 20.94),
    ("Luxembourg", 50.18, 49.45, 6.53, 5.73),
    ("Malta", 36.08, 35.80, 14.58, 14.18),
    ("Moldova", 48.49, 45.47, 30.16, 26.62),
    ("Monaco", 43.75, 43.72, 7.44, 7.41),
    ("Montenegro", 43.56, 41.85, 20.36, 18.43),
    ("Netherlands", 53.56, 50.75, 7.23, 3.36),
    ("North Macedonia", 42.37, 40.85, 23.03, 20.45),
    ("Norway", 71.19, 57.96, 31.17, 4.65),
    ("Poland", 54.84, 49.00, 24.15, 14.12),
    ("Portugal", 42.15, 36.96, -6.19, -9.50),
    ("Romania", 48.27, 43.62, 29.69, 20.26),
    ("San Marino", 43.99, 43.89, 12.52, 12.40),
    ("Serbia", 46.19, 42.23, 23.01, 18.82),
    ("Slovakia", 49.61, 47.73, 22.57, 16.83),
    ("Slovenia", 46.88, 45.42, 16.61, 13.38),
    ("Spain", 43.79, 36.00, 3.32, -9.30),
    ("Sweden", 69.06, 55.34, 24.17, 11.11),
    ("Switzerland", 47.81, 45.82, 10.49, 5.96),
    ("Ukraine", 52.38, 44.39, 40.23, 22.14),
    ("United Kingdom", 60.86, 49.86, 1.76, -8.65),
];

#[derive(Deserialize)]
struct CountryRecord {
    name: String,
    region: String,
    #[serde(rename = "boundingBox")]
    bounding_box: RecordBox,
}

#[derive(Deserialize)]
struct RecordBox {
    ne: Corner,
    sw: Corner,
}

#[derive(Deserialize)]
struct Corner {
    lat: f64,
    lon: f64,
}

/// Lookup table from region name to bounding box. Names match case-insensitively.
#[derive(Debug, Clone)]
pub struct RegionCatalogue {
    regions: BTreeMap<String, (String, BoundingBox)>,
}

impl Default for RegionCatalogue {
    fn default() -> Self {
        Self::europe()
    }
}

impl RegionCatalogue {
    /// The built-in catalogue of European countries.
    pub fn europe() -> Self {
        Self::from_entries(EUROPE.iter().map(|(name, north, south, east, west)| {
            (name.to_string(), BoundingBox::new(*north, *south, *east, *west))
        }))
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, BoundingBox)>,
    {
        let regions = entries
            .into_iter()
            .map(|(name, bbox)| (name.to_lowercase(), (name, bbox)))
            .collect();
        Self { regions }
    }

    /// Reads a country file shaped as
    /// `{"FR": {"name": ..., "region": "Europe", "boundingBox": {"ne": {"lat", "lon"}, "sw": {...}}}}`,
    /// keeping only European entries.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, RegionError> {
        let records: HashMap<String, CountryRecord> = serde_json::from_reader(reader)?;
        let total = records.len();
        let catalogue = Self::from_entries(
            records
                .into_values()
                .filter(|record| record.region == "Europe")
                .map(|record| {
                    let b = record.bounding_box;
                    (
                        record.name,
                        BoundingBox::new(b.ne.lat, b.sw.lat, b.ne.lon, b.sw.lon),
                    )
                }),
        );
        debug!(
            "Loaded {} of {} regions from catalogue",
            catalogue.len(),
            total
        );
        Ok(catalogue)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Region names in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.values().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<BoundingBox> {
        self.regions
            .get(&name.trim().to_lowercase())
            .map(|(_, bbox)| *bbox)
    }

    /// The min/max envelope of all named regions.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<BoundingBox, RegionError> {
        let mut envelope: Option<BoundingBox> = None;
        for name in names {
            let name = name.as_ref();
            let bbox = self
                .get(name)
                .ok_or_else(|| RegionError::UnknownRegion(name.to_string()))?;
            envelope = Some(match envelope {
                Some(current) => current.union(&bbox),
                None => bbox,
            });
        }
        envelope.ok_or(RegionError::MissingRegion)
    }
}
