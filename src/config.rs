//! Gateway configuration
//!
//! Collected once from the environment at startup and passed explicitly to
//! each component. No module-level singletons.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the gateway and its index-service connection.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the index service.
    pub index_url: String,
    /// Access key for the index service, if required.
    pub index_api_key: Option<String>,
    /// Logical index holding entity documents.
    pub entities_index: String,
    /// Logical index holding claim documents.
    pub claims_index: String,
    /// Logical index holding cached publication records.
    pub publications_index: String,
    /// Directory for persisted term-cache artifacts.
    pub cache_dir: PathBuf,
    /// Fixed page size for claims aggregation. Hitting this bound marks the
    /// result as truncated.
    pub claims_page_limit: usize,
    /// Per-request timeout for index calls.
    pub request_timeout: Duration,
    /// Listen address for the HTTP surface.
    pub listen_addr: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables, with defaults for
    /// everything except the index endpoint.
    pub fn from_env() -> Self {
        Self {
            index_url: env_or("INDEX_URL", "http://localhost:7700"),
            index_api_key: std::env::var("INDEX_API_KEY").ok().filter(|k| !k.is_empty()),
            entities_index: env_or("ENTITIES_INDEX", "entities"),
            claims_index: env_or("CLAIMS_INDEX", "claims"),
            publications_index: env_or("PUBLICATIONS_INDEX", "cached_pubs"),
            cache_dir: PathBuf::from(env_or("TERM_CACHE_DIR", "cache")),
            claims_page_limit: std::env::var("CLAIMS_PAGE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
            request_timeout: Duration::from_secs(
                std::env::var("INDEX_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            listen_addr: env_or("LISTEN_ADDR", "0.0.0.0:3000"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
