//! Handling-cycle context shared by routes and strategies

use crate::http::Response;
use std::collections::BTreeMap;

/// The event that started a handling cycle
#[derive(Debug, Clone, Default)]
pub enum HandlerEvent {
    /// A network request intercepted from a page
    Fetch {
        /// Response already obtained through navigation preload
        preload_response: Option<Response>,
    },
    /// Precache population
    Install,
    /// Precache cleanup
    Activate,
    /// A control message such as `CACHE_URLS`
    Message,
    /// Direct invocation with no triggering event
    #[default]
    None,
}

impl HandlerEvent {
    /// A fetch event without a preload response
    pub fn fetch() -> Self {
        Self::Fetch {
            preload_response: None,
        }
    }

    pub fn is_install(&self) -> bool {
        matches!(self, Self::Install)
    }

    /// Navigation preload response carried by a fetch event
    pub fn preload_response(&self) -> Option<&Response> {
        match self {
            Self::Fetch { preload_response } => preload_response.as_ref(),
            _ => None,
        }
    }
}

/// Parameters produced by a route matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteParams {
    /// Positional regex capture groups
    Captures(Vec<String>),
    /// Named values
    Map(BTreeMap<String, String>),
}

impl RouteParams {
    /// Look up a named value; positional captures answer to their index
    pub fn get(&self, key: &str) -> Option<&str> {
        match self {
            Self::Captures(values) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| values.get(i))
                .map(String::as_str),
            Self::Map(map) => map.get(key).map(String::as_str),
        }
    }

    /// Flatten into a named map, positional captures keyed by index
    pub fn into_map(self) -> BTreeMap<String, String> {
        match self {
            Self::Captures(values) => values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Self::Map(map) => map,
        }
    }

    /// Whether there is nothing in the parameters
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Captures(values) => values.is_empty(),
            Self::Map(map) => map.is_empty(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_params_lookup() {
        let captures = RouteParams::Captures(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(captures.get("1"), Some("b"));
        assert_eq!(captures.get("cacheKey"), None);

        let map = RouteParams::Map(BTreeMap::from([(
            "cacheKey".to_string(),
            "https://example.com/a".to_string(),
        )]));
        assert_eq!(map.get("cacheKey"), Some("https://example.com/a"));
        assert!(!map.is_empty());
        assert_eq!(captures.into_map().get("0").map(String::as_str), Some("a"));
    }

    #[test]
    fn test_event_preload() {
        let event = HandlerEvent::Fetch {
            preload_response: Some(Response::ok("preloaded")),
        };
        assert_eq!(event.preload_response().unwrap().body(), "preloaded");
        assert!(HandlerEvent::Install.is_install());
        assert!(HandlerEvent::fetch().preload_response().is_none());
    }
}
