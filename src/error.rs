//! Error types for the rotating-source crate.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Error returned while turning a [`RotationConfig`](crate::RotationConfig) into
/// something usable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An address list file could not be read.
    #[error("failed to read address source {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The per-address request rate is zero, negative or not finite.
    #[error("invalid request rate {0}, expected a positive number")]
    InvalidRate(f64),
    /// The HTTP client for a local address could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
