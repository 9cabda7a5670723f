//! Common error types for PHI

use thiserror::Error;

/// Common result type for PHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across PHI crates
///
/// Only configuration and input problems are ever surfaced through this type.
/// Stage failures are recorded in per-stage results instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error (startup fault)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller-supplied input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
