//! Hierarchical spatial cell index.
//!
//! Cells follow the S2 subdivision: the sphere is projected onto the six faces
//! of a cube, each face is recursively split into four children, and cells are
//! numbered along a Hilbert curve. A cell id therefore encodes both its position
//! and its level.

pub mod cell_id;
pub mod error;
pub mod grid;

pub use cell_id::{GeoCell, MAX_LEVEL};
pub use error::CellError;
pub use grid::{assign_cells, cells_needed, mean_cell_area_km2, mean_cell_edge_km, CellAssignment};
