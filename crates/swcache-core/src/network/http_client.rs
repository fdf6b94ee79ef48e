//! reqwest-backed fetcher

use super::{Fetcher, is_same_origin, verify_integrity};
use crate::{
    error::{SwError, SwResult},
    http::{CacheMode, Credentials, Request, RequestInit, RequestMode, Response, ResponseType},
    key::strip_fragment,
};
use async_trait::async_trait;
use http::{HeaderValue, header};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use url::Url;

/// HTTP client configuration for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Connection pool idle timeout
    pub pool_idle_timeout: Duration,
    /// Maximum idle connections per host
    pub pool_max_idle_per_host: usize,
    /// Whole-request timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum redirects followed before failing
    pub max_redirects: usize,
    /// Enable gzip, brotli and deflate decoding
    pub enable_compression: bool,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 10,
            enable_compression: true,
            user_agent: format!("swcache/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpFetcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        if self.connect_timeout > self.timeout {
            return Err("connect_timeout cannot exceed timeout".to_string());
        }
        if self.user_agent.is_empty() {
            return Err("user_agent must not be empty".to_string());
        }
        Ok(())
    }
}

/// [`Fetcher`] backed by a pooled reqwest client
///
/// Responses for URLs outside `origin` are typed `cors`, or `opaque` for
/// `no-cors` requests; everything else is `basic`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    origin: Url,
}

impl HttpFetcher {
    /// Create a fetcher with the default configuration
    pub fn new(origin: Url) -> SwResult<Self> {
        Self::with_config(origin, &HttpFetcherConfig::default())
    }

    /// Create a fetcher with a custom configuration
    pub fn with_config(origin: Url, config: &HttpFetcherConfig) -> SwResult<Self> {
        config
            .validate()
            .map_err(SwError::InvalidConfiguration)?;

        // reqwest is built without a bundled crypto provider
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut builder = ClientBuilder::new()
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .use_rustls_tls()
            .http2_adaptive_window(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(config.user_agent.clone());

        if config.enable_compression {
            builder = builder.gzip(true).brotli(true).deflate(true);
        }

        let client = builder.build()?;
        tracing::debug!("Created HTTP fetcher for origin {}", origin.origin().ascii_serialization());
        Ok(Self { client, origin })
    }

    /// The origin responses are classified against
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    fn build_request(&self, request: &Request) -> reqwest::RequestBuilder {
        let mut headers = request.headers().clone();

        if matches!(
            request.cache_mode(),
            CacheMode::NoStore | CacheMode::Reload | CacheMode::NoCache
        ) {
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        }

        let send_credentials = match request.credentials() {
            Credentials::Omit => false,
            Credentials::SameOrigin => is_same_origin(request.url(), &self.origin),
            Credentials::Include => true,
        };
        if !send_credentials {
            headers.remove(header::COOKIE);
            headers.remove(header::AUTHORIZATION);
        }

        let mut builder = self
            .client
            .request(request.method().clone(), strip_fragment(request.url()))
            .headers(headers);
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }
        builder
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: Request, options: Option<&RequestInit>) -> SwResult<Response> {
        let request = match options {
            Some(init) => request.apply_init(init)?,
            None => request,
        };

        tracing::debug!("Fetching {} {}", request.method(), request.url());
        let response = self.build_request(&request).send().await.map_err(|e| {
            tracing::debug!("Network request for {} failed: {e}", request.url());
            SwError::Network(format!("{}: {e}", request.url()))
        })?;

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if let Some(integrity) = request.integrity().filter(|i| !i.is_empty())
            && !verify_integrity(integrity, &body)
        {
            return Err(SwError::IntegrityMismatch {
                url: request.url().to_string(),
            });
        }

        let same_origin = is_same_origin(&final_url, &self.origin);
        if !same_origin && request.mode() == RequestMode::NoCors {
            return Ok(Response::opaque().with_url(final_url));
        }

        let redirected = final_url != strip_fragment(request.url());
        let response_type = if same_origin {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        };

        Ok(Response::new(status.as_u16(), body)
            .with_status_text(status.canonical_reason().unwrap_or_default())
            .with_headers(headers)
            .with_url(final_url)
            .with_type(response_type)
            .with_redirected(redirected))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(HttpFetcherConfig::default().validate().is_ok());
        assert!(
            HttpFetcherConfig::new()
                .with_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            HttpFetcherConfig::new()
                .with_timeout(Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(HttpFetcherConfig::new().with_user_agent("").validate().is_err());
    }

    #[test]
    fn test_credentials_are_stripped_cross_origin() {
        let fetcher = HttpFetcher::new(Url::parse("https://example.com/").unwrap()).unwrap();
        let request = Request::get("https://cdn.example.net/app.js")
            .unwrap()
            .with_header(header::COOKIE, HeaderValue::from_static("session=1"));

        let built = fetcher.build_request(&request).build().unwrap();
        assert!(built.headers().get(header::COOKIE).is_none());

        let included = fetcher
            .build_request(&request.with_credentials(Credentials::Include))
            .build()
            .unwrap();
        assert_eq!(included.headers().get(header::COOKIE).unwrap(), "session=1");
    }

    #[test]
    fn test_reload_sends_no_cache() {
        let fetcher = HttpFetcher::new(Url::parse("https://example.com/").unwrap()).unwrap();
        let request = Request::get("https://example.com/app.js#x")
            .unwrap()
            .with_cache_mode(CacheMode::Reload);

        let built = fetcher.build_request(&request).build().unwrap();
        assert_eq!(built.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(built.url().as_str(), "https://example.com/app.js");
    }
}
