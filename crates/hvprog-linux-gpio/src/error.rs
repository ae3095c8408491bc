//! Error types for Linux GPIO programmer setup

use gpiocdev::line::Offset;
use thiserror::Error;

/// Linux GPIO programmer specific errors
#[derive(Debug, Error)]
pub enum LinuxGpioError {
    /// Failed to request GPIO lines
    #[error("Failed to request GPIO lines on '{path}': {source}")]
    LineRequestFailed {
        path: String,
        #[source]
        source: gpiocdev::Error,
    },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// GPIO chip or device not specified
    #[error("No GPIO chip specified. Use dev=/dev/gpiochipN or gpiochip=N")]
    NoDevice,

    /// Both dev and gpiochip given
    #[error("Only one of 'dev' or 'gpiochip' can be specified")]
    ConflictingDevice,

    /// Invalid GPIO line number
    #[error("Invalid GPIO line number for {name}: {value}")]
    InvalidLineNumber { name: String, value: String },

    /// Unknown protocol mode
    #[error("Unknown mode '{0}', expected 'parallel' or 'serial'")]
    InvalidMode(String),

    /// The same GPIO line is assigned to two roles
    #[error("GPIO line {0} is assigned to more than one pin")]
    DuplicateLine(Offset),
}

/// Result type for Linux GPIO programmer operations
pub type Result<T> = std::result::Result<T, LinuxGpioError>;
