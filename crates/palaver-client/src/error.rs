use thiserror::Error;

use palaver_net::{ApiError, RelayError};
use palaver_store::StoreError;

/// Errors surfaced to callers of the client facade and reconciler.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
