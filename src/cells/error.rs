use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("Invalid coordinate: latitude {lat}, longitude {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Invalid cell level {0}, expected 0..=30")]
    InvalidLevel(u8),

    #[error("Invalid cell token '{0}'")]
    InvalidToken(String),
}
