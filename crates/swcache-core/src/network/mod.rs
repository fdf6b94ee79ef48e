//! Network collaborator
//!
//! Strategies reach the network only through the [`Fetcher`] trait. The
//! production implementation is [`HttpFetcher`], built on reqwest; tests and
//! offline tooling use the scripted [`StubFetcher`].

mod http_client;
mod stub;

pub use http_client::{HttpFetcher, HttpFetcherConfig};
pub use stub::{StubFetcher, StubOutcome};

use crate::{
    error::SwResult,
    http::{Request, RequestInit, Response},
};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use sha2::{Digest, Sha256, Sha384, Sha512};
use url::Url;

/// Performs network requests
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `request`, applying `options` on top of it when given
    ///
    /// Transport failures are errors. HTTP error statuses are not; they come
    /// back as ordinary responses.
    async fn fetch(&self, request: Request, options: Option<&RequestInit>) -> SwResult<Response>;
}

/// Whether `url` belongs to `origin`
pub fn is_same_origin(url: &Url, origin: &Url) -> bool {
    url.origin() == origin.origin()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum IntegrityAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl IntegrityAlgorithm {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn digest(self, body: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(body).to_vec(),
            Self::Sha384 => Sha384::digest(body).to_vec(),
            Self::Sha512 => Sha512::digest(body).to_vec(),
        }
    }
}

/// Check `body` against subresource integrity metadata
///
/// Only the strongest algorithm present is considered, and any of its
/// digests may match. Metadata without a recognised algorithm passes.
pub fn verify_integrity(integrity: &str, body: &[u8]) -> bool {
    let mut candidates: Vec<(IntegrityAlgorithm, &str)> = integrity
        .split_ascii_whitespace()
        .filter_map(|token| {
            let (algorithm, rest) = token.split_once('-')?;
            let digest = rest.split('?').next().unwrap_or(rest);
            IntegrityAlgorithm::parse(algorithm).map(|a| (a, digest))
        })
        .collect();

    let Some(strongest) = candidates.iter().map(|(a, _)| *a).max() else {
        return true;
    };
    candidates.retain(|(a, _)| *a == strongest);

    let actual = STANDARD.encode(strongest.digest(body));
    candidates.iter().any(|(_, expected)| *expected == actual)
}
