//! Error types for caching, routing and precaching operations

use thiserror::Error;

/// Errors that can occur anywhere in the request handling pipeline
#[derive(Debug, Error)]
pub enum SwError {
    /// A redirected response was copied but its origin differs from the scope origin
    #[error("Cannot copy a response from a different origin: {origin}")]
    CrossOriginCopyResponse {
        /// Origin of the response that was being copied
        origin: String,
    },

    /// `cache_put` was called without a response to store
    #[error("Cache put called with no response for {url}")]
    CachePutWithNoResponse {
        /// Cache key URL the write targeted
        url: String,
    },

    /// The underlying cache store refused a write because its quota is exhausted
    #[error("Storage quota exceeded")]
    QuotaExceeded,

    /// A precached URL was requested but nothing is stored and network fallback is off
    #[error("Missing precache entry for {url} in cache {cache_name}")]
    MissingPrecacheEntry {
        /// Precache cache name
        cache_name: String,
        /// Request URL
        url: String,
    },

    /// An install-time precache fetch produced a response that may not be cached
    #[error("Bad precaching response for {url} (status {status})")]
    BadPrecachingResponse {
        /// Request URL
        url: String,
        /// Response status
        status: u16,
    },

    /// The same URL was registered with two different cache keys
    #[error("Conflicting precache entries: {first_entry} and {second_entry}")]
    ConflictingEntries {
        /// Cache key registered first
        first_entry: String,
        /// Cache key that conflicts with it
        second_entry: String,
    },

    /// The same cache key was registered with two different integrity values
    #[error("Conflicting integrity values for {url}")]
    ConflictingIntegrities {
        /// URL of the conflicting entry
        url: String,
    },

    /// A manifest entry had no usable URL
    #[error("Unexpected precache entry: {entry}")]
    UnexpectedEntryType {
        /// Debug rendering of the offending entry
        entry: String,
    },

    /// A route capture could not be turned into a matcher
    #[error("Unsupported route capture: {capture}")]
    UnsupportedRouteType {
        /// Description of the capture
        capture: String,
    },

    /// No routes were ever registered for the method of the route being removed
    #[error("Cannot unregister route: no routes registered for method {method}")]
    RouteMethodNotRegistered {
        /// HTTP method
        method: String,
    },

    /// The route being removed is not in the router
    #[error("Cannot unregister route: route is not registered")]
    RouteNotRegistered,

    /// A `request_will_fetch` plugin hook failed
    #[error("Plugin error in request_will_fetch: {message}")]
    PluginRequestWillFetch {
        /// Message of the error the plugin raised
        message: String,
    },

    /// The handling pipeline finished without producing a usable response
    #[error("No response produced for {url}")]
    NoResponse {
        /// Request URL
        url: String,
        /// Last error seen while trying to produce one
        #[source]
        source: Option<Box<SwError>>,
    },

    /// A handler was bound to a URL that is not in the precache manifest
    #[error("URL is not precached: {url}")]
    NonPrecachedUrl {
        /// Requested URL
        url: String,
    },

    /// Expiration was configured for the default runtime cache
    #[error("Expiration can only be applied to custom cache names")]
    ExpireCustomCachesOnly,

    /// URL parsing failed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Network request failed
    #[error("Network error: {0}")]
    Network(String),

    /// Response body did not match the requested subresource integrity
    #[error("Integrity check failed for {url}")]
    IntegrityMismatch {
        /// Request URL
        url: String,
    },

    /// Request or response cannot be used for the attempted operation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Cache or timestamp store backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error in a persistent backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A spawned background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Background(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error raised by a plugin hook
    #[error("Plugin error: {0}")]
    Plugin(String),
}

impl SwError {
    /// Build a `NoResponse` error for `url` without an underlying cause
    pub fn no_response(url: impl Into<String>) -> Self {
        Self::NoResponse {
            url: url.into(),
            source: None,
        }
    }

    /// Whether this error signals an exhausted storage quota
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded)
    }
}

impl From<tokio::task::JoinError> for SwError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Background(err.to_string())
    }
}

impl From<reqwest::Error> for SwError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type alias for all swcache operations
pub type SwResult<T> = Result<T, SwError>;
