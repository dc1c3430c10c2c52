pub mod bounding_box;
pub mod date_interval;
pub mod error;
pub mod metadata;
pub mod observation_table;
