//! Scripted fetcher for tests and offline runs

use super::Fetcher;
use crate::{
    error::{SwError, SwResult},
    http::{Request, RequestInit, Response},
    key::strip_fragment,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::HashMap, time::Duration};

/// What the stub does for a URL
#[derive(Debug, Clone)]
pub enum StubOutcome {
    /// Return the response immediately
    Respond(Response),
    /// Return the response after a delay
    Delayed(Duration, Response),
    /// Fail with a network error carrying the message
    Fail(String),
    /// Never complete
    Pending,
}

/// [`Fetcher`] that answers from a URL table and records every call
///
/// URLs without an outcome fail with a network error.
#[derive(Debug, Default)]
pub struct StubFetcher {
    outcomes: Mutex<HashMap<String, StubOutcome>>,
    calls: Mutex<Vec<Request>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the outcome for `url`, replacing any previous one
    pub fn on(&self, url: &str, outcome: StubOutcome) -> &Self {
        self.outcomes.lock().insert(url.to_string(), outcome);
        self
    }

    /// Respond to `url` with a 200 carrying `body`
    pub fn respond_ok(&self, url: &str, body: &'static str) -> &Self {
        self.on(url, StubOutcome::Respond(Response::ok(body)))
    }

    /// Requests seen so far, after fetch options were applied
    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().clone()
    }

    /// Number of requests made to `url`
    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.url().as_str() == url)
            .count()
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, request: Request, options: Option<&RequestInit>) -> SwResult<Response> {
        let request = match options {
            Some(init) => request.apply_init(init)?,
            None => request,
        };
        let url = strip_fragment(request.url());
        self.calls.lock().push(request);

        let outcome = self.outcomes.lock().get(url.as_str()).cloned();
        let with_url = |response: Response| match response.url() {
            Some(_) => response,
            None => response.with_url(url.clone()),
        };
        match outcome {
            Some(StubOutcome::Respond(response)) => Ok(with_url(response)),
            Some(StubOutcome::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(with_url(response))
            }
            Some(StubOutcome::Fail(message)) => Err(SwError::Network(message)),
            Some(StubOutcome::Pending) => futures::future::pending().await,
            None => Err(SwError::Network(format!("no stubbed response for {url}"))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::http::CacheMode;

    #[tokio::test]
    async fn test_scripted_outcomes() {
        let stub = StubFetcher::new();
        stub.respond_ok("https://example.com/a", "a")
            .on("https://example.com/b", StubOutcome::Fail("offline".to_string()));

        let response = stub
            .fetch(Request::get("https://example.com/a#top").unwrap(), None)
            .await
            .unwrap();
        assert_eq!(response.body(), "a");
        assert_eq!(response.url().unwrap().as_str(), "https://example.com/a");

        let error = stub
            .fetch(Request::get("https://example.com/b").unwrap(), None)
            .await
            .unwrap_err();
        assert!(matches!(error, SwError::Network(m) if m == "offline"));

        assert!(
            stub.fetch(Request::get("https://example.com/c").unwrap(), None)
                .await
                .is_err()
        );
        assert_eq!(stub.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_options_are_applied_before_recording() {
        let stub = StubFetcher::new();
        stub.respond_ok("https://example.com/a", "a");
        let init = RequestInit {
            cache: Some(CacheMode::Reload),
            ..RequestInit::default()
        };

        stub.fetch(Request::get("https://example.com/a").unwrap(), Some(&init))
            .await
            .unwrap();
        assert_eq!(stub.calls()[0].cache_mode(), CacheMode::Reload);
        assert_eq!(stub.call_count("https://example.com/a"), 1);
    }
}
