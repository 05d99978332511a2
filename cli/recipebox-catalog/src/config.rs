//! Configuration types for transport construction.

use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "https://dummyjson.com/recipes";

/// Configuration for [`crate::Transport`] construction.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base URL for the catalog API.
    ///
    /// All request paths are resolved relative to this address.
    pub base_url: String,
    /// Additional headers to include in every request.
    pub extra_headers: BTreeMap<String, String>,
    /// Overall timeout for a single request.
    pub request_timeout: Duration,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_CATALOG_URL.to_string(),
            extra_headers: BTreeMap::new(),
            request_timeout: Duration::from_secs(60),
            user_agent: None,
        }
    }
}
