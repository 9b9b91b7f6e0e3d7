//! Application-level error type.
//!
//! Session operations return [`TetherError`] from `tether-core`. This module
//! wraps it together with the failures that only exist at the application
//! edge:
//!
//! - **`Config`**: figment extraction errors (bad TOML, wrong types, bad env overrides).
//! - **`Configuration`**: semantic errors caught by `TetherConfig::validate`.
//! - **`Logging`**: the tracing subscriber could not be installed.
//! - **`Tether`**: anything the session layer reports.
//! - **`Io`** / **`Json`**: output and rendering failures.

use tether_core::TetherError;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the `tether` binary.
#[derive(Error, Debug)]
pub enum AppError {
    /// Config could not be read or extracted.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Config was read but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Tracing subscriber could not be installed.
    #[error("Logging setup failed: {0}")]
    Logging(String),

    /// Session layer failure.
    #[error(transparent)]
    Tether(#[from] TetherError),

    /// Output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON rendering failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No hardware driver is compiled in.
    #[error("Hardware backend not available in this build; run with --mock")]
    NoBackend,
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Config(Box::new(err))
    }
}
