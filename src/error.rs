//! Error taxonomy shared by the stores, the rate limiter and the chat gateway.
//!
//! Each family is a distinct type so callers branch on the variant, never on message text.
//! `user_message` returns short copy that is safe to show in the UI.
use std::time::Duration;

use crate::rate_limit::LimitType;

/// Boxed error used at collaborator seams (key-value backends, HTTP transports).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

const STORAGE_USER_MESSAGE: &str = "Unable to save or retrieve data. Please try again.";
const NETWORK_USER_MESSAGE: &str =
    "Unable to connect to the server. Please check your internet connection and try again.";

/// Failure of the underlying key-value collaborator or of JSON encoding.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// The backend rejected a get/set/remove.
    #[error("key-value {op} failed for `{key}`: {source}")]
    Backend {
        /// Operation name (`get`, `set`, `remove`).
        op: &'static str,
        /// Logical key involved.
        key: String,
        /// Backend error.
        #[source]
        source: BoxError,
    },
    /// A record could not be encoded to or decoded from JSON.
    #[error("could not encode `{key}`: {source}")]
    Serde {
        /// Logical key involved.
        key: String,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub(crate) fn backend(op: &'static str, key: &str, source: impl Into<BoxError>) -> Self {
        StoreError::Backend { op, key: key.to_string(), source: source.into() }
    }

    /// UI-safe description.
    pub fn user_message(&self) -> &'static str {
        STORAGE_USER_MESSAGE
    }
}

/// Bad input shape, length or characters. Recoverable and shown inline.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// A required field was empty after trimming.
    #[error("{field} is required")]
    Required {
        /// Field name.
        field: &'static str,
    },
    /// A field exceeded its length cap.
    #[error("{field} must be {max} characters or less")]
    TooLong {
        /// Field name.
        field: &'static str,
        /// Maximum number of characters.
        max: usize,
    },
    /// A field contained one of `<>:"/\|?*`.
    #[error("{field} contains invalid characters")]
    InvalidCharacters {
        /// Field name.
        field: &'static str,
    },
    /// Color was not `#RGB` or `#RRGGBB`.
    #[error("color must be a valid hex color (e.g., #007AFF), got `{value}`")]
    InvalidColor {
        /// Rejected value.
        value: String,
    },
    /// Another deck already uses this name (compared case-insensitively).
    #[error("a deck named `{name}` already exists")]
    DuplicateDeckName {
        /// Rejected name.
        name: String,
    },
    /// Chat message was blank.
    #[error("message cannot be empty")]
    EmptyMessage,
}

impl ValidationError {
    /// UI-safe description.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::DuplicateDeckName { .. } => {
                "A deck with this name already exists".to_string()
            }
            other => {
                let text = other.to_string();
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => text,
                }
            }
        }
    }
}

/// Errors surfaced by the flashcard, deck and association stores.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StorageError {
    /// Input rejected before touching storage.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The key-value collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A referenced record does not exist.
    #[error("{kind} `{id}` not found")]
    NotFound {
        /// Record kind (`deck`, `flashcard`).
        kind: &'static str,
        /// Requested id.
        id: String,
    },
    /// A schema migration step failed; flashcards were restored from backup when possible.
    #[error("migration from v{from} to v{to} failed: {source}")]
    Migration {
        /// Version found in storage.
        from: u32,
        /// Target version.
        to: u32,
        /// Step failure.
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub(crate) fn not_found(kind: &'static str, id: &str) -> Self {
        StorageError::NotFound { kind, id: id.to_string() }
    }

    /// Check if this error is an input validation failure.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Borrow the validation failure, if any.
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }

    /// UI-safe description.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message(),
            Self::NotFound { kind, .. } => format!("That {kind} no longer exists."),
            Self::Store(_) | Self::Migration { .. } => STORAGE_USER_MESSAGE.to_string(),
        }
    }
}

/// Raised by the gateway when the local limiter refuses a call. The request was never sent.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RateLimitError {
    /// Tier that refused the call.
    pub limit_type: LimitType,
    /// Unix milliseconds at which the tier admits again.
    pub reset_time: i64,
    /// Time left until `reset_time`, for countdown rendering.
    pub remaining_time: Duration,
    /// Human-readable explanation selected by `limit_type`.
    pub message: String,
}

/// Failure reported by a chat transport.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The server answered with a non-2xx status.
    #[error("API request failed with status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },
    /// The request never produced a response.
    #[error("network request failed: {0}")]
    Network(#[source] BoxError),
    /// The body was not the expected JSON shape.
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// Errors returned by the chat gateway.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// Message rejected locally; no network call was attempted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Local quota exhausted; the request was not sent or recorded.
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),
    /// The call exceeded the configured bound and was aborted.
    #[error("request timeout after {elapsed:?} (limit: {timeout:?}) - please try again")]
    Timeout {
        /// Time spent before aborting.
        elapsed: Duration,
        /// Configured bound.
        timeout: Duration,
    },
    /// Non-2xx response.
    #[error("API request failed with status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },
    /// Connection-level failure.
    #[error("network request failed: {0}")]
    Network(#[source] BoxError),
    /// Response body was malformed.
    #[error("malformed response body: {0}")]
    Decode(String),
    /// The limiter's ledger could not be read or written.
    #[error("rate limiter unavailable: {0}")]
    Limiter(#[source] StoreError),
}

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http { status } => GatewayError::Http { status },
            TransportError::Network(e) => GatewayError::Network(e),
            TransportError::Decode(msg) => GatewayError::Decode(msg),
        }
    }
}

impl GatewayError {
    /// Check if the local limiter refused the call.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Check if the call timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the input was rejected before sending.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if the failure happened on the wire (network, status or body).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Network(_) | Self::Decode(_))
    }

    /// Borrow rate-limit details for countdown rendering.
    pub fn rate_limit(&self) -> Option<&RateLimitError> {
        match self {
            Self::RateLimited(e) => Some(e),
            _ => None,
        }
    }

    /// UI-safe description.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message(),
            Self::RateLimited(e) => e.message.clone(),
            Self::Timeout { .. } => "Request timeout - please try again".to_string(),
            Self::Http { .. } | Self::Network(_) | Self::Decode(_) => {
                NETWORK_USER_MESSAGE.to_string()
            }
            Self::Limiter(e) => e.user_message().to_string(),
        }
    }
}

/// Rejected configuration values.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No API key was supplied.
    #[error("API key not found in configuration")]
    MissingApiKey,
    /// Timeout must be non-zero.
    #[error("timeout must be > 0")]
    InvalidTimeout,
    /// A rate-limit tier is unusable.
    #[error("invalid {tier} tier: {reason}")]
    InvalidTier {
        /// Tier name.
        tier: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// An environment variable could not be parsed.
    #[error("invalid value for {var}: `{value}`")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}
