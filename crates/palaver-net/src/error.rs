use thiserror::Error;

/// Errors surfaced by the remote API client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-2xx HTTP status and no structured body.
    #[error("Server returned HTTP status {0}")]
    Status(u16),

    /// The request was rejected before it was sent (missing token, oversized
    /// payload, malformed input).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The response body did not match the expected schema.
    #[error("Response decode error: {0}")]
    Decode(String),

    /// The server reported a structured failure inside the envelope.
    #[error("Server error {reason}: {message}")]
    Server { reason: String, message: String },

    /// Underlying transport failure (DNS, TLS, connection reset, ...).
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// Errors surfaced by the live-update relay.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The signed-URL WebSocket handshake failed.
    #[error("Relay handshake failed: {0}")]
    Handshake(String),

    /// The connection dropped or a frame could not be read.
    #[error("Relay transport error: {0}")]
    Transport(String),
}
