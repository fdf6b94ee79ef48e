//! Control messages understood by the router

use serde::{Deserialize, Serialize};
use swcache_core::RequestInit;

/// A control message, tagged by its `type` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouterMessage {
    /// Warm the caches by routing each listed request
    #[serde(rename = "CACHE_URLS")]
    CacheUrls { payload: CacheUrlsPayload },
    /// Worker lifecycle control; accepted and ignored
    #[serde(rename = "SKIP_WAITING")]
    SkipWaiting,
}

impl RouterMessage {
    /// Parse a message from JSON
    pub fn from_json(value: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheUrlsPayload {
    pub urls_to_cache: Vec<CacheUrlEntry>,
}

/// One request to warm: a URL, or a `[url, init]` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheUrlEntry {
    Url(String),
    WithInit(String, RequestInit),
}

impl CacheUrlEntry {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::WithInit(url, _) => url,
        }
    }

    pub fn init(&self) -> Option<&RequestInit> {
        match self {
            Self::Url(_) => None,
            Self::WithInit(_, init) => Some(init),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use swcache_core::CacheMode;

    #[test]
    fn test_parse_cache_urls() {
        let message = RouterMessage::from_json(json!({
            "type": "CACHE_URLS",
            "payload": {
                "urlsToCache": [
                    "/index.html",
                    ["/api/data", {"cache": "reload", "headers": {"x-warm": "1"}}]
                ]
            }
        }))
        .unwrap();

        let RouterMessage::CacheUrls { payload } = message else {
            panic!("expected CACHE_URLS");
        };
        assert_eq!(payload.urls_to_cache.len(), 2);
        assert_eq!(payload.urls_to_cache[0], CacheUrlEntry::Url("/index.html".into()));
        assert_eq!(payload.urls_to_cache[1].url(), "/api/data");
        let init = payload.urls_to_cache[1].init().unwrap();
        assert_eq!(init.cache, Some(CacheMode::Reload));
        assert_eq!(init.headers.get("x-warm").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_parse_skip_waiting() {
        let message = RouterMessage::from_json(json!({"type": "SKIP_WAITING"})).unwrap();
        assert_eq!(message, RouterMessage::SkipWaiting);
        assert!(RouterMessage::from_json(json!({"type": "OTHER"})).is_err());
    }
}
