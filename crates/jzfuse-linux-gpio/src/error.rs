//! Error types for the GPIO VDDQ line

use thiserror::Error;

/// Linux GPIO VDDQ line errors
#[derive(Debug, Error)]
pub enum GpioError {
    /// Failed to request the GPIO line
    #[error("Failed to request GPIO line {line} on {chip}: {source}")]
    LineRequestFailed {
        chip: String,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// Failed to set the GPIO line value
    #[error("Failed to set GPIO line value: {0}")]
    SetValueFailed(#[source] gpiocdev::Error),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Missing required parameter
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,
}

/// Result type for GPIO operations
pub type Result<T> = std::result::Result<T, GpioError>;
