//! Error types for browser-requests

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The request was malformed and rejected before any browser interaction.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The in-page network call or the script running it failed. The message
    /// is the browser-reported failure, verbatim. Retrying is a caller
    /// decision; the bridge never retries.
    #[error("Request failed in browser: {0}")]
    RequestException(String),

    /// No resolution within the configured bound.
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The page script returned a payload that violates the bridge/script
    /// contract. This signals a programming error, not a transient condition.
    #[error("Malformed response payload from page script: {0}")]
    MalformedResponse(String),

    /// The browser session handle was used after release.
    #[error("Browser session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
