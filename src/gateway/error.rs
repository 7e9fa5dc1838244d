//! Error taxonomy for provider gateway calls.

use thiserror::Error;

/// Errors raised by a provider gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// Raised when the credential is invalid, expired or lacks permission.
    #[error("authentication rejected: {message}")]
    Auth {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when a uniquely named object already exists.
    #[error("conflict: {message}")]
    Conflict {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when an account limit prevents the request.
    #[error("quota exceeded: {message}")]
    Quota {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the provider rejects a parameter (unknown server type,
    /// image or location).
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised when the referenced remote object does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Message returned by the provider.
        message: String,
    },
    /// Raised on network failures, rate limiting and provider 5xx responses.
    #[error("transient provider failure: {message}")]
    Transient {
        /// Transport or provider message.
        message: String,
    },
    /// Raised when an asynchronous action finished unsuccessfully.
    #[error("action {action_id} failed: {message}")]
    ActionFailed {
        /// Provider action identifier.
        action_id: i64,
        /// Failure reported by the provider.
        message: String,
    },
    /// Raised when an asynchronous action did not finish in time.
    #[error("timed out waiting for action {action_id}")]
    ActionTimeout {
        /// Provider action identifier.
        action_id: i64,
    },
    /// Raised when a successful response cannot be decoded.
    #[error("malformed provider response: {message}")]
    Decode {
        /// Decoder message.
        message: String,
    },
    /// Raised when no HTTP client with the request timeout could be built.
    #[error("HTTP client unavailable: {message}")]
    Client {
        /// Builder failure.
        message: String,
    },
    /// Raised for provider failures that fit no other category.
    #[error("provider error (HTTP {status}): {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Message returned by the provider.
        message: String,
    },
}

impl GatewayError {
    /// Returns `true` when the referenced object is already absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
