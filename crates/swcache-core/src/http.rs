//! Request and response model
//!
//! These types carry exactly what the caching pipeline needs from an HTTP
//! exchange. Bodies are `Bytes`, so cloning a request or response for a
//! background cache write does not copy the payload.

use crate::error::{SwError, SwResult};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Request mode, mirroring the fetch standard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document navigation
    Navigate,
    /// Same-origin only
    SameOrigin,
    /// Cross-origin without CORS; yields opaque responses
    NoCors,
    /// CORS request
    #[default]
    Cors,
}

impl RequestMode {
    /// Wire name of the mode
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::SameOrigin => "same-origin",
            Self::NoCors => "no-cors",
            Self::Cors => "cors",
        }
    }
}

/// HTTP cache mode of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// Use the HTTP cache normally
    #[default]
    Default,
    /// Bypass the HTTP cache entirely
    NoStore,
    /// Bypass the HTTP cache and refresh it
    Reload,
    /// Revalidate with the server
    NoCache,
    /// Prefer any cached response
    ForceCache,
    /// Only use cached responses
    OnlyIfCached,
}

impl CacheMode {
    /// Wire name of the cache mode
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::NoStore => "no-store",
            Self::Reload => "reload",
            Self::NoCache => "no-cache",
            Self::ForceCache => "force-cache",
            Self::OnlyIfCached => "only-if-cached",
        }
    }
}

/// Credentials policy of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Never send credentials
    Omit,
    /// Send credentials to the same origin only
    #[default]
    SameOrigin,
    /// Always send credentials
    Include,
}

/// Overlay of request properties, used for fetch options and message payloads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestInit {
    /// HTTP method override
    pub method: Option<String>,
    /// Extra headers, merged over the request's own headers
    pub headers: BTreeMap<String, String>,
    /// Request mode override
    pub mode: Option<RequestMode>,
    /// Credentials override
    pub credentials: Option<Credentials>,
    /// Cache mode override
    pub cache: Option<CacheMode>,
    /// Subresource integrity override
    pub integrity: Option<String>,
}

impl RequestInit {
    /// Create an empty overlay
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header to the overlay
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the credentials policy
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// An HTTP request as seen by routes, strategies and caches
#[derive(Debug, Clone)]
pub struct Request {
    url: Url,
    method: Method,
    headers: HeaderMap,
    mode: RequestMode,
    cache: CacheMode,
    credentials: Credentials,
    integrity: Option<String>,
    body: Option<Bytes>,
}

impl Request {
    /// Create a GET request for an absolute URL
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
            cache: CacheMode::default(),
            credentials: Credentials::default(),
            integrity: None,
            body: None,
        }
    }

    /// Parse `url` and create a GET request for it
    pub fn get(url: &str) -> SwResult<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// Create a request for a different URL that keeps this request's headers
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            method: self.method.clone(),
            headers: self.headers.clone(),
            ..Self::new(url)
        }
    }

    /// Set the HTTP method
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set the request mode
    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the cache mode
    pub fn with_cache_mode(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Set the credentials policy
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set or clear the subresource integrity metadata
    pub fn with_integrity(mut self, integrity: Option<String>) -> Self {
        self.integrity = integrity;
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Apply a `RequestInit` overlay
    pub fn apply_init(mut self, init: &RequestInit) -> SwResult<Self> {
        if let Some(method) = &init.method {
            self.method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|e| SwError::InvalidRequest(format!("method {method}: {e}")))?;
        }
        for (name, value) in &init.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SwError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| SwError::InvalidRequest(format!("header value {value}: {e}")))?;
            self.headers.insert(name, value);
        }
        if let Some(mode) = init.mode {
            self.mode = mode;
        }
        if let Some(credentials) = init.credentials {
            self.credentials = credentials;
        }
        if let Some(cache) = init.cache {
            self.cache = cache;
        }
        if init.integrity.is_some() {
            self.integrity.clone_from(&init.integrity);
        }
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn mode(&self) -> RequestMode {
        self.mode
    }

    pub fn cache_mode(&self) -> CacheMode {
        self.cache
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
    }

    pub fn integrity(&self) -> Option<&str> {
        self.integrity.as_deref()
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

/// Response classification, mirroring the fetch standard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response
    #[default]
    Basic,
    /// Cross-origin CORS response
    Cors,
    /// Cross-origin response without CORS; status is always 0
    Opaque,
    /// Network error
    Error,
}

/// An HTTP response as produced by the network or stored in a cache
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: HeaderMap,
    body: Bytes,
    url: Option<Url>,
    response_type: ResponseType,
    redirected: bool,
}

impl Response {
    /// Create a basic response with the given status and body
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: String::new(),
            headers: HeaderMap::new(),
            body: body.into(),
            url: None,
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }

    /// A 200 response
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::new(200, body).with_status_text("OK")
    }

    /// An opaque response (status 0, empty body)
    pub fn opaque() -> Self {
        Self::new(0, Bytes::new()).with_type(ResponseType::Opaque)
    }

    /// A network error response
    pub fn error() -> Self {
        Self::new(0, Bytes::new()).with_type(ResponseType::Error)
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = text.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Value of a header, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn response_type(&self) -> ResponseType {
        self.response_type
    }

    pub fn redirected(&self) -> bool {
        self.redirected
    }

    /// Whether the status is in the 2xx range
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this is a network error response
    pub fn is_error(&self) -> bool {
        self.response_type == ResponseType::Error
    }

    /// Copy status, headers and body into a fresh response with no URL and
    /// no redirect flag
    pub fn copy(&self) -> Self {
        Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            url: None,
            response_type: ResponseType::Basic,
            redirected: false,
        }
    }
}
