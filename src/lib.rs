mod aggregator;
mod cells;
mod error;
mod export;
mod interpolate;
mod merge;
mod orchestrator;
mod overlap;
mod providers;
mod query;
mod registry;
mod types;
mod utils;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use error::AggregateError;
pub use query::{AggregateRequest, Region, ValidatedRequest, MAX_QUERY_LEVEL, MIN_LEVEL};

pub use cells::{
    assign_cells, cells_needed, mean_cell_area_km2, mean_cell_edge_km, CellAssignment, CellError, GeoCell,
    MAX_LEVEL,
};
pub use overlap::{boxes_overlap, intervals_overlap};

pub use types::bounding_box::{BoundingBox, LatLon};
pub use types::date_interval::DateInterval;
pub use types::error::{DateError, TableError};
pub use types::metadata::{FetchStatus, QueryMetadataRecord};
pub use types::observation_table::{ObservationTable, TableBuilder, GEO_CELL, TIMESTAMP};

pub use registry::regions::{RegionCatalogue, RegionError};
pub use registry::{Cadence, ProviderDescriptor, SourceRegistry, SourceRegistryBuilder, SpatialType};

pub use providers::meteostat::error::StationCacheError;
pub use providers::meteostat::MeteostatAdapter;
pub use providers::{FetchRequest, ProviderAdapter, ProviderError};

pub use orchestrator::{AggregateOutcome, AggregateQuery, FetchFailure, Orchestrator, RetryPolicy};

pub use interpolate::{interpolate, target_cells, InterpolationError};
pub use merge::{merge, MergeOutput};

pub use export::{write_csv, write_metadata_json, ExportError};
