//! Manifest entries and their cache keys

use serde::{Deserialize, Deserializer, Serialize};
use swcache_core::{REVISION_SEARCH_PARAM, SwError, SwResult};
use url::Url;

/// One manifest entry: a bare URL or a URL with revision metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrecacheEntry {
    Url(String),
    Revisioned(RevisionedEntry),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionedEntry {
    #[serde(default)]
    pub url: String,
    /// `None` when the field is absent, `Some(None)` when it is `null`
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub revision: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

impl PrecacheEntry {
    /// Entry with a revision
    pub fn revisioned(url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self::Revisioned(RevisionedEntry {
            url: url.into(),
            revision: Some(Some(revision.into())),
            integrity: None,
        })
    }

    pub fn with_integrity(self, integrity: impl Into<String>) -> Self {
        let mut entry = match self {
            Self::Url(url) => RevisionedEntry {
                url,
                ..RevisionedEntry::default()
            },
            Self::Revisioned(entry) => entry,
        };
        entry.integrity = Some(integrity.into());
        Self::Revisioned(entry)
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) => url,
            Self::Revisioned(entry) => &entry.url,
        }
    }

    /// Revision, when a non-empty one is given
    pub fn revision(&self) -> Option<&str> {
        match self {
            Self::Revisioned(RevisionedEntry {
                revision: Some(Some(revision)),
                ..
            }) if !revision.is_empty() => Some(revision),
            _ => None,
        }
    }

    pub fn integrity(&self) -> Option<&str> {
        match self {
            Self::Url(_) => None,
            Self::Revisioned(entry) => entry.integrity.as_deref(),
        }
    }

    /// Whether the entry says nothing about its revision
    ///
    /// An explicit `null` revision counts as a deliberate choice.
    pub fn lacks_revision_info(&self) -> bool {
        match self {
            Self::Url(_) => true,
            Self::Revisioned(entry) => entry.revision.is_none(),
        }
    }

    /// Parse a JSON manifest
    pub fn parse_manifest(json: &str) -> SwResult<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<&str> for PrecacheEntry {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

/// Where an entry is fetched from and the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyedEntry {
    pub cache_key: Url,
    pub url: Url,
}

/// Compute the cache key of `entry`, resolving relative URLs against `origin`
///
/// A revisioned entry keeps a clean fetch URL; only its cache key carries the
/// revision parameter.
pub fn create_cache_key(entry: &PrecacheEntry, origin: &Url) -> SwResult<CacheKeyedEntry> {
    if entry.url().is_empty() {
        return Err(SwError::UnexpectedEntryType {
            entry: format!("{entry:?}"),
        });
    }

    let url = origin.join(entry.url())?;
    let Some(revision) = entry.revision() else {
        return Ok(CacheKeyedEntry {
            cache_key: url.clone(),
            url,
        });
    };

    // An existing revision param is overwritten in place, later duplicates
    // dropped; otherwise it goes last
    let mut cache_key = url.clone();
    let mut replaced = false;
    let pairs: Vec<(String, String)> = cache_key
        .query_pairs()
        .filter_map(|(name, value)| {
            if name != REVISION_SEARCH_PARAM {
                return Some((name.into_owned(), value.into_owned()));
            }
            if replaced {
                return None;
            }
            replaced = true;
            Some((name.into_owned(), revision.to_string()))
        })
        .collect();
    {
        let mut query = cache_key.query_pairs_mut();
        query.clear().extend_pairs(&pairs);
        if !replaced {
            query.append_pair(REVISION_SEARCH_PARAM, revision);
        }
    }
    Ok(CacheKeyedEntry { cache_key, url })
}
