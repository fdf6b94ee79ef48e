//! Cache name resolution
//!
//! Default cache names are built as `{prefix}-{name}-{suffix}`, skipping empty
//! parts, so several deployments can share one cache store without colliding.

use serde::{Deserialize, Serialize};

/// Cache naming configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheNames {
    /// Prefix shared by all default cache names
    pub prefix: String,
    /// Base name of the precache
    pub precache: String,
    /// Base name of the default runtime cache
    pub runtime: String,
    /// Suffix shared by all default cache names, usually the deployment scope
    pub suffix: String,
}

impl Default for CacheNames {
    fn default() -> Self {
        Self {
            prefix: "swcache".to_string(),
            precache: "precache-v2".to_string(),
            runtime: "runtime".to_string(),
            suffix: String::new(),
        }
    }
}

impl CacheNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    fn full_name(&self, name: &str) -> String {
        [self.prefix.as_str(), name, self.suffix.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Precache name, or `user_name` when one is given
    pub fn precache_name(&self, user_name: Option<&str>) -> String {
        user_name.map_or_else(|| self.full_name(&self.precache), ToString::to_string)
    }

    /// Runtime cache name, or `user_name` when one is given
    pub fn runtime_name(&self, user_name: Option<&str>) -> String {
        user_name.map_or_else(|| self.full_name(&self.runtime), ToString::to_string)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.precache.is_empty() && self.prefix.is_empty() && self.suffix.is_empty() {
            return Err("precache name must not resolve to an empty string".to_string());
        }
        if self.runtime.is_empty() && self.prefix.is_empty() && self.suffix.is_empty() {
            return Err("runtime name must not resolve to an empty string".to_string());
        }
        if self.precache_name(None) == self.runtime_name(None) {
            return Err("precache and runtime cache names must differ".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let names = CacheNames::default();
        assert_eq!(names.precache_name(None), "swcache-precache-v2");
        assert_eq!(names.runtime_name(None), "swcache-runtime");
        assert_eq!(names.runtime_name(Some("images")), "images");
        assert!(names.validate().is_ok());
    }

    #[test]
    fn test_suffix_and_empty_parts() {
        let names = CacheNames::new()
            .with_prefix("")
            .with_suffix("https://example.com/app/");
        assert_eq!(
            names.precache_name(None),
            "precache-v2-https://example.com/app/"
        );
    }

    #[test]
    fn test_validation_rejects_identical_names() {
        let mut names = CacheNames::default();
        names.runtime = names.precache.clone();
        assert!(names.validate().is_err());
    }
}
