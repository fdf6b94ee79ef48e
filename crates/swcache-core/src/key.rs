//! Cache key normalization
//!
//! Two requests refer to the same cached resource when their URLs are equal
//! after dropping the fragment and any cache-busting query parameters. This
//! module derives those canonical URLs and the ordered list of candidate URLs
//! a precache lookup walks through.

use regex::Regex;
use std::{collections::VecDeque, fmt, sync::Arc};
use url::Url;

/// Query parameter holding the revision in a precache cache key
pub const REVISION_SEARCH_PARAM: &str = "__WB_REVISION__";

/// Default patterns for query parameters that never affect the resource
pub fn default_ignored_params() -> Vec<Regex> {
    ["^utm_", "^fbclid$"]
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

/// Return `url` without its fragment
pub fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

fn retain_params(url: &Url, keep: impl Fn(&str) -> bool) -> Url {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let kept: Vec<&(String, String)> = pairs.iter().filter(|(k, _)| keep(k)).collect();

    // Untouched queries keep their original encoding
    if kept.len() == pairs.len() {
        return url;
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
}

/// Delete every query parameter whose name matches one of `patterns`
pub fn remove_ignored_search_params(url: &Url, patterns: &[Regex]) -> Url {
    retain_params(url, |name| !patterns.iter().any(|p| p.is_match(name)))
}

/// Delete the query parameters named exactly `names`
pub fn remove_search_params(url: &Url, names: &[&str]) -> Url {
    retain_params(url, |name| !names.contains(&name))
}

/// Canonical lookup URL: fragment removed and ignorable parameters deleted
///
/// Remaining parameters keep their relative order.
pub fn normalize_url(url: &Url, patterns: &[Regex]) -> Url {
    remove_ignored_search_params(&strip_fragment(url), patterns)
}

/// Callback producing extra candidate URLs for a request URL
pub type UrlManipulation = Arc<dyn Fn(&Url) -> Vec<Url> + Send + Sync>;

/// Options controlling candidate URL generation
#[derive(Clone)]
pub struct UrlVariationOptions {
    /// Query parameter name patterns to ignore
    pub ignore_url_parameters_matching: Vec<Regex>,
    /// File appended to directory-like paths
    pub directory_index: Option<String>,
    /// Try `<path>.html` for extensionless paths
    pub clean_urls: bool,
    /// Extra candidates appended after the built-in ones
    pub url_manipulation: Option<UrlManipulation>,
}

impl Default for UrlVariationOptions {
    fn default() -> Self {
        Self {
            ignore_url_parameters_matching: default_ignored_params(),
            directory_index: Some("index.html".to_string()),
            clean_urls: true,
            url_manipulation: None,
        }
    }
}

impl fmt::Debug for UrlVariationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlVariationOptions")
            .field(
                "ignore_url_parameters_matching",
                &self.ignore_url_parameters_matching,
            )
            .field("directory_index", &self.directory_index)
            .field("clean_urls", &self.clean_urls)
            .field("url_manipulation", &self.url_manipulation.is_some())
            .finish()
    }
}

impl UrlVariationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignored_params(mut self, patterns: Vec<Regex>) -> Self {
        self.ignore_url_parameters_matching = patterns;
        self
    }

    pub fn with_directory_index(mut self, index: Option<String>) -> Self {
        self.directory_index = index;
        self
    }

    pub fn with_clean_urls(mut self, enabled: bool) -> Self {
        self.clean_urls = enabled;
        self
    }

    pub fn with_url_manipulation(mut self, manipulation: UrlManipulation) -> Self {
        self.url_manipulation = Some(manipulation);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Bare,
    Stripped,
    DirectoryIndex,
    CleanUrl,
    Manipulated,
    Done,
}

/// Ordered candidate URLs for a lookup, most specific first
///
/// The iterator is `Clone`, so a caller can restart the sequence from any
/// point without recomputing what came before.
#[derive(Clone)]
pub struct UrlVariations {
    bare: Url,
    stripped: Url,
    options: UrlVariationOptions,
    stage: Stage,
    manipulated: VecDeque<Url>,
}

/// Build the candidate sequence for `url`
pub fn generate_url_variations(url: &Url, options: &UrlVariationOptions) -> UrlVariations {
    let bare = strip_fragment(url);
    let stripped = remove_ignored_search_params(&bare, &options.ignore_url_parameters_matching);
    UrlVariations {
        bare,
        stripped,
        options: options.clone(),
        stage: Stage::Bare,
        manipulated: VecDeque::new(),
    }
}

fn with_path_suffix(url: &Url, suffix: &str) -> Url {
    let mut url = url.clone();
    let path = format!("{}{suffix}", url.path());
    url.set_path(&path);
    url
}

fn is_extensionless(url: &Url) -> bool {
    let path = url.path();
    if path.ends_with('/') {
        return false;
    }
    path.rsplit('/').next().is_some_and(|segment| !segment.contains('.'))
}

impl Iterator for UrlVariations {
    type Item = Url;

    fn next(&mut self) -> Option<Url> {
        loop {
            match self.stage {
                Stage::Bare => {
                    self.stage = Stage::Stripped;
                    return Some(self.bare.clone());
                }
                Stage::Stripped => {
                    self.stage = Stage::DirectoryIndex;
                    return Some(self.stripped.clone());
                }
                Stage::DirectoryIndex => {
                    self.stage = Stage::CleanUrl;
                    if let Some(index) = &self.options.directory_index
                        && self.stripped.path().ends_with('/')
                    {
                        return Some(with_path_suffix(&self.stripped, index));
                    }
                }
                Stage::CleanUrl => {
                    self.stage = Stage::Manipulated;
                    // Manipulation sees the request URL with every param kept
                    if let Some(manipulation) = &self.options.url_manipulation {
                        self.manipulated = manipulation(&self.bare).into();
                    }
                    if self.options.clean_urls && is_extensionless(&self.stripped) {
                        return Some(with_path_suffix(&self.stripped, ".html"));
                    }
                }
                Stage::Manipulated => {
                    if let Some(url) = self.manipulated.pop_front() {
                        return Some(url);
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return None,
            }
        }
    }
}
