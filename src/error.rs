//! Error taxonomy for the gateway
//!
//! Every fallible gateway operation returns `GatewayError`. Callers branch on
//! explicit variants (NotFound vs. IndexUnavailable) instead of relying on
//! empty results or suppressed failures.

use thiserror::Error;

use crate::identifier::IdentifierNamespace;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The input string matched none of the classification rules, or matched
    /// a namespace that cannot be used for the requested operation.
    #[error("unclassifiable or unusable identifier: {input:?}")]
    InvalidIdentifier {
        input: String,
        /// Classification that was detected but could not be used, if any.
        detected: Option<IdentifierNamespace>,
    },

    /// No document matched in the named index.
    #[error("no document in index '{index}' for {key}")]
    NotFound { index: String, key: String },

    /// More than one document matched where the namespace requires
    /// uniqueness. This is a data-quality hazard and is always reported,
    /// never silently resolved by picking one.
    #[error("{count} documents in index '{index}' share {field} = {value}")]
    Ambiguous {
        index: String,
        field: String,
        value: String,
        count: usize,
    },

    /// The upstream index service failed or timed out.
    #[error("index '{index}' unavailable: {reason}")]
    IndexUnavailable { index: String, reason: String },

    /// A persisted cache artifact could not be read. Recoverable: the caller
    /// must recompute the aggregate rather than fail.
    #[error("cache file '{path}' unreadable: {reason}")]
    CacheCorrupt { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GatewayError {
    /// Shorthand for an upstream failure on the given index.
    pub fn unavailable(index: &str, reason: impl ToString) -> Self {
        Self::IndexUnavailable {
            index: index.to_string(),
            reason: reason.to_string(),
        }
    }
}
