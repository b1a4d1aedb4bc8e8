use thiserror::Error;

use crate::types::Location;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClimateError {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("setting '{entity}' has invalid value '{value}'")]
    InvalidSetting { entity: String, value: String },

    #[error("no temperature reading for {}", .0.as_str())]
    MissingReading(Location),

    /// A power draw that falls in none of the compressor bands. Only NaN gets
    /// here; it is a defect upstream and must never be guessed at.
    #[error("compressor power draw {0} W cannot be classified")]
    UnclassifiableDraw(f64),
}
