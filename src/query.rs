//! Validation of top-level query parameters, before any network activity.

use crate::error::AggregateError;
use crate::interpolate::{sampling_grid, InterpolationError};
use crate::registry::regions::RegionCatalogue;
use crate::types::bounding_box::BoundingBox;
use crate::types::date_interval::DateInterval;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_QUERY_LEVEL: u8 = 19;

/// Where to aggregate: an explicit box or a list of named regions.
#[derive(Debug, Clone, PartialEq)]
pub enum Region {
    Box(BoundingBox),
    Named(Vec<String>),
}

impl From<BoundingBox> for Region {
    fn from(bbox: BoundingBox) -> Self {
        Region::Box(bbox)
    }
}

impl From<Vec<String>> for Region {
    fn from(names: Vec<String>) -> Self {
        Region::Named(names)
    }
}

impl Region {
    /// The box to query; named regions resolve to their combined envelope.
    pub fn resolve(&self, catalogue: &RegionCatalogue) -> Result<BoundingBox, AggregateError> {
        match self {
            Region::Box(bbox) => {
                validate_bounding_box(bbox)?;
                Ok(*bbox)
            }
            Region::Named(names) => Ok(catalogue.resolve(names)?),
        }
    }
}

/// Rejects boxes that are inverted, flat, or outside valid coordinates.
pub fn validate_bounding_box(bbox: &BoundingBox) -> Result<(), AggregateError> {
    let BoundingBox {
        north,
        south,
        east,
        west,
    } = *bbox;
    if !(-90.0..=90.0).contains(&north) || !(-90.0..=90.0).contains(&south) {
        return Err(AggregateError::InvalidBoundingBox(format!(
            "latitudes must lie in [-90, 90], got {bbox}"
        )));
    }
    if !(-180.0..=180.0).contains(&east) || !(-180.0..=180.0).contains(&west) {
        return Err(AggregateError::InvalidBoundingBox(format!(
            "longitudes must lie in [-180, 180], got {bbox}"
        )));
    }
    if north <= south {
        return Err(AggregateError::InvalidBoundingBox(format!(
            "north ({north}) must be greater than south ({south})"
        )));
    }
    if east <= west {
        return Err(AggregateError::InvalidBoundingBox(format!(
            "east ({east}) must be greater than west ({west})"
        )));
    }
    Ok(())
}

pub fn validate_level(level: u8) -> Result<(), AggregateError> {
    if !(MIN_LEVEL..=MAX_QUERY_LEVEL).contains(&level) {
        return Err(AggregateError::InvalidLevel(level));
    }
    Ok(())
}

/// Checks that `region` can be densified at `level` without exceeding the sampling cap.
pub fn validate_densify(region: &BoundingBox, level: u8) -> Result<(), AggregateError> {
    match sampling_grid(region, level) {
        Ok(_) => Ok(()),
        Err(InterpolationError::GridTooLarge { rows, cols }) => {
            Err(AggregateError::DensifyGridTooLarge { level, rows, cols })
        }
        Err(InterpolationError::Cell(e)) => Err(e.into()),
        Err(e) => Err(e.into()),
    }
}

/// Checks that `factors` is non-empty and every entry is offered by some provider.
pub fn validate_factors<I, S>(factors: I, supported: &BTreeSet<String>) -> Result<BTreeSet<String>, AggregateError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut requested = BTreeSet::new();
    for factor in factors {
        let factor = factor.as_ref().trim();
        if !supported.contains(factor) {
            return Err(AggregateError::UnknownFactor(factor.to_string()));
        }
        requested.insert(factor.to_string());
    }
    if requested.is_empty() {
        return Err(AggregateError::NoFactors);
    }
    Ok(requested)
}

/// A query as received from a caller, e.g. deserialized from a JSON body.
///
/// # Examples
///
/// ```
/// use envfuse::AggregateRequest;
///
/// let request: AggregateRequest = serde_json::from_str(r#"{
///     "bounding_box": [51.09, 41.33, 9.56, -5.14],
///     "level": 8,
///     "time_from": "2020-01-01",
///     "time_to": "2020-01-02",
///     "factors": ["temperature"]
/// }"#).unwrap();
/// assert!(!request.separate_sources);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    /// `(north, south, east, west)`.
    #[serde(default)]
    pub bounding_box: Option<(f64, f64, f64, f64)>,
    #[serde(default)]
    pub countries: Vec<String>,
    pub level: u8,
    pub time_from: String,
    pub time_to: String,
    pub factors: Vec<String>,
    #[serde(default)]
    pub separate_sources: bool,
    #[serde(default)]
    pub interpolation: bool,
}

/// An [`AggregateRequest`] that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub region: Region,
    pub time_range: DateInterval,
    pub level: u8,
    pub factors: BTreeSet<String>,
    pub separate_sources: bool,
    pub densify: bool,
}

impl AggregateRequest {
    /// Validates every field against `supported_factors`.
    ///
    /// Region names are checked later, against the region catalogue.
    pub fn validate(&self, supported_factors: &BTreeSet<String>) -> Result<ValidatedRequest, AggregateError> {
        let region = match (self.bounding_box, self.countries.is_empty()) {
            (Some(_), false) => return Err(AggregateError::AmbiguousRegion),
            (None, true) => return Err(AggregateError::MissingRegion),
            (Some(bbox), true) => {
                let bbox = BoundingBox::from(bbox);
                validate_bounding_box(&bbox)?;
                Region::Box(bbox)
            }
            (None, false) => Region::Named(self.countries.clone()),
        };
        validate_level(self.level)?;
        let time_range = DateInterval::parse(&self.time_from, &self.time_to)?;
        let factors = validate_factors(&self.factors, supported_factors)?;

        Ok(ValidatedRequest {
            region,
            time_range,
            level: self.level,
            factors,
            separate_sources: self.separate_sources,
            densify: self.interpolation,
        })
    }
}
