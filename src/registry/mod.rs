//! Static catalogue of providers: what each one covers and how to call it.

pub mod regions;

use crate::aggregator::AggregatorConfig;
use crate::error::AggregateError;
use crate::overlap::{boxes_overlap, intervals_overlap};
use crate::providers::meteostat::MeteostatAdapter;
use crate::providers::ProviderAdapter;
use crate::types::bounding_box::BoundingBox;
use crate::types::date_interval::DateInterval;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Daily,
    Monthly,
    Yearly,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpatialType {
    Point,
    Grid,
}

/// Declared coverage of one provider. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: String,
    pub spatial_coverage: BoundingBox,
    pub temporal_coverage: DateInterval,
    pub supported_factors: BTreeSet<String>,
    pub cadence: Cadence,
    pub spatial_type: SpatialType,
    /// 1 is best.
    pub quality_rank: u8,
}

impl ProviderDescriptor {
    /// The requested factors this provider can serve, or `None` if the
    /// provider does not match the query at all.
    pub fn matching_factors(
        &self,
        region: &BoundingBox,
        time_range: &DateInterval,
        factors: &BTreeSet<String>,
    ) -> Option<BTreeSet<String>> {
        if !boxes_overlap(region, &self.spatial_coverage) {
            return None;
        }
        if !intervals_overlap(time_range, &self.temporal_coverage) {
            return None;
        }
        let shared: BTreeSet<String> = factors
            .intersection(&self.supported_factors)
            .cloned()
            .collect();
        (!shared.is_empty()).then_some(shared)
    }
}

/// A provider selected for one query, ready to be dispatched.
#[derive(Clone)]
pub struct Candidate {
    pub id: String,
    pub adapter: Arc<dyn ProviderAdapter>,
    /// Requested factors the provider supports.
    pub factors: BTreeSet<String>,
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("id", &self.id)
            .field("factors", &self.factors)
            .finish_non_exhaustive()
    }
}

struct RegisteredProvider {
    descriptor: ProviderDescriptor,
    adapter: Arc<dyn ProviderAdapter>,
}

/// Read-only table of providers, in registration order.
pub struct SourceRegistry {
    providers: Vec<RegisteredProvider>,
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|p| &p.descriptor.id))
            .finish()
    }
}

#[derive(Default)]
pub struct SourceRegistryBuilder {
    providers: Vec<RegisteredProvider>,
}

impl SourceRegistryBuilder {
    /// Adds a provider. Registering an id twice replaces the earlier entry.
    pub fn register(mut self, descriptor: ProviderDescriptor, adapter: Arc<dyn ProviderAdapter>) -> Self {
        if let Some(existing) = self
            .providers
            .iter_mut()
            .find(|p| p.descriptor.id == descriptor.id)
        {
            warn!("Provider '{}' registered twice, replacing", descriptor.id);
            *existing = RegisteredProvider { descriptor, adapter };
        } else {
            self.providers.push(RegisteredProvider { descriptor, adapter });
        }
        self
    }

    pub fn build(self) -> SourceRegistry {
        SourceRegistry {
            providers: self.providers,
        }
    }
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder::default()
    }

    /// Registry with every built-in adapter, caches rooted at the configured cache directory.
    pub fn with_default_providers(config: &AggregatorConfig) -> Result<Self, AggregateError> {
        let cache_dir = config.resolve_cache_dir()?;
        let meteostat = MeteostatAdapter::new(
            &cache_dir,
            config.cache_max_age,
            config.station_concurrency,
        );
        Ok(Self::builder()
            .register(MeteostatAdapter::descriptor(), Arc::new(meteostat))
            .build())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ProviderDescriptor> {
        self.providers.iter().map(|p| &p.descriptor)
    }

    pub fn get(&self, id: &str) -> Option<&ProviderDescriptor> {
        self.descriptors().find(|d| d.id == id)
    }

    /// Union of every provider's supported factors.
    pub fn supported_factors(&self) -> BTreeSet<String> {
        self.descriptors()
            .flat_map(|d| d.supported_factors.iter().cloned())
            .collect()
    }

    /// Providers overlapping the query in space, time and factors, in registration order.
    pub fn candidates(
        &self,
        region: &BoundingBox,
        time_range: &DateInterval,
        factors: &BTreeSet<String>,
    ) -> Vec<Candidate> {
        self.providers
            .iter()
            .filter_map(|provider| {
                let id = &provider.descriptor.id;
                match provider
                    .descriptor
                    .matching_factors(region, time_range, factors)
                {
                    Some(shared) => {
                        debug!("Selected provider '{id}' for {shared:?}");
                        Some(Candidate {
                            id: id.clone(),
                            adapter: Arc::clone(&provider.adapter),
                            factors: shared,
                        })
                    }
                    None => {
                        debug!("Skipped provider '{id}'");
                        None
                    }
                }
            })
            .collect()
    }
}
