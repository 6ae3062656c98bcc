use thiserror::Error;

/// Errors produced while decoding relay envelopes.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Envelope decode error: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error("Envelope is missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid wire timestamp: {0}")]
    Timestamp(String),
}
