//! Client error types.

/// Errors that can occur when using the hireflow client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The organization cannot afford the request (HTTP 402).
    #[error("insufficient credits: balance={balance}, required={required}")]
    InsufficientCredits {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// A CV or job does not exist in the caller's organization (HTTP 404).
    #[error("not found: {message}")]
    NotFound {
        /// Server message naming the missing entity.
        message: String,
    },

    /// The session token was rejected (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
