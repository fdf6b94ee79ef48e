//! Disk-backed cache store
//!
//! Layout under the root directory:
//!
//! ```text
//! caches.json                      cache names in creation order
//! <md5(cache name)>/index.json     entry metadata in insertion order
//! <md5(cache name)>/<md5(url)>.body
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! crash never leaves a half-written index or body behind.
#![allow(clippy::significant_drop_tightening)] // index locks are held across the write

use super::{Cache, CacheStorage, MatchOptions, request_matches, validate_put};
use crate::{
    error::{SwError, SwResult},
    http::{Request, Response, ResponseType},
    key::strip_fragment,
};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::Mutex};
use url::Url;

const CACHES_FILE: &str = "caches.json";
const INDEX_FILE: &str = "index.json";

fn hashed_name(value: &str) -> String {
    hex::encode(md5::compute(value.as_bytes()).0)
}

/// Write `data` to `path` atomically
async fn write_atomic(path: &Path, data: &[u8]) -> SwResult<()> {
    let temp_path = path.with_extension("tmp");
    if let Some(parent) = temp_path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(&temp_path, data).await?;
    fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Read and decode a JSON file, returning the default when it does not exist
async fn read_json_or_default<T>(path: &Path) -> SwResult<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    match fs::read(path).await {
        Ok(data) => Ok(serde_json::from_slice(&data)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    method: String,
    url: Url,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    response_type: ResponseType,
    response_url: Option<Url>,
    redirected: bool,
    body_file: String,
}

impl EntryRecord {
    fn method(&self) -> Method {
        Method::from_bytes(self.method.as_bytes()).unwrap_or(Method::GET)
    }

    fn to_request(&self) -> Request {
        Request::new(self.url.clone()).with_method(self.method())
    }

    fn to_response(&self, body: Bytes) -> Response {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }

        let mut response = Response::new(self.status, body)
            .with_status_text(self.status_text.clone())
            .with_headers(headers)
            .with_type(self.response_type)
            .with_redirected(self.redirected);
        if let Some(url) = &self.response_url {
            response = response.with_url(url.clone());
        }
        response
    }
}

/// One named cache stored in its own directory
pub struct DiskCache {
    dir: PathBuf,
    entries: Mutex<Vec<EntryRecord>>,
}

impl DiskCache {
    async fn load(dir: PathBuf) -> SwResult<Self> {
        fs::create_dir_all(&dir).await?;
        let entries: Vec<EntryRecord> = read_json_or_default(&dir.join(INDEX_FILE)).await?;
        tracing::trace!("Loaded {} entries from {}", entries.len(), dir.display());
        Ok(Self {
            dir,
            entries: Mutex::new(entries),
        })
    }

    async fn persist_index(&self, entries: &[EntryRecord]) -> SwResult<()> {
        let data = serde_json::to_vec_pretty(entries)?;
        write_atomic(&self.dir.join(INDEX_FILE), &data).await
    }

    async fn remove_body(&self, body_file: &str) {
        if let Err(e) = fs::remove_file(self.dir.join(body_file)).await
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!("Failed to remove cached body {body_file}: {e}");
        }
    }
}

#[async_trait]
impl Cache for DiskCache {
    async fn match_request(
        &self,
        request: &Request,
        options: &MatchOptions,
    ) -> SwResult<Option<Response>> {
        let record = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .find(|e| request_matches(request, &e.method(), &e.url, options))
                .cloned()
        };

        let Some(record) = record else {
            return Ok(None);
        };
        match fs::read(self.dir.join(&record.body_file)).await {
            Ok(body) => Ok(Some(record.to_response(Bytes::from(body)))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("Body for {} is missing on disk", record.url);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, request: &Request, response: Response) -> SwResult<()> {
        validate_put(request, &response)?;

        let url = strip_fragment(request.url());
        let body_file = format!("{}.body", hashed_name(url.as_str()));
        let record = EntryRecord {
            method: request.method().to_string(),
            url,
            status: response.status(),
            status_text: response.status_text().to_string(),
            headers: response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect(),
            response_type: response.response_type(),
            response_url: response.url().cloned(),
            redirected: response.redirected(),
            body_file,
        };

        let mut entries = self.entries.lock().await;
        write_atomic(&self.dir.join(&record.body_file), response.body()).await?;

        let exact = MatchOptions::default();
        entries.retain(|e| !request_matches(request, &e.method(), &e.url, &exact));
        entries.push(record);
        self.persist_index(&entries).await
    }

    async fn delete(&self, request: &Request, options: &MatchOptions) -> SwResult<bool> {
        let mut entries = self.entries.lock().await;
        let (removed, kept): (Vec<EntryRecord>, Vec<EntryRecord>) = entries
            .drain(..)
            .partition(|e| request_matches(request, &e.method(), &e.url, options));
        *entries = kept;

        if removed.is_empty() {
            return Ok(false);
        }
        self.persist_index(&entries).await?;
        for record in &removed {
            self.remove_body(&record.body_file).await;
        }
        Ok(true)
    }

    async fn keys(
        &self,
        request: Option<&Request>,
        options: &MatchOptions,
    ) -> SwResult<Vec<Request>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| request.is_none_or(|r| request_matches(r, &e.method(), &e.url, options)))
            .map(EntryRecord::to_request)
            .collect())
    }
}

/// Persistent [`CacheStorage`] rooted at a directory
pub struct DiskCacheStorage {
    root: PathBuf,
    names: Mutex<Vec<String>>,
    open_caches: DashMap<String, Arc<DiskCache>>,
}

impl DiskCacheStorage {
    /// Open (or create) a store rooted at `root`
    pub async fn open_at(root: impl Into<PathBuf>) -> SwResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let names: Vec<String> = read_json_or_default(&root.join(CACHES_FILE)).await?;
        tracing::debug!(
            "Opened cache store at {} with {} caches",
            root.display(),
            names.len()
        );
        Ok(Self {
            root,
            names: Mutex::new(names),
            open_caches: DashMap::new(),
        })
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, cache_name: &str) -> PathBuf {
        self.root.join(hashed_name(cache_name))
    }

    async fn persist_names(&self, names: &[String]) -> SwResult<()> {
        let data = serde_json::to_vec_pretty(names)?;
        write_atomic(&self.root.join(CACHES_FILE), &data).await
    }
}

#[async_trait]
impl CacheStorage for DiskCacheStorage {
    async fn open(&self, cache_name: &str) -> SwResult<Arc<dyn Cache>> {
        let mut names = self.names.lock().await;
        if let Some(cache) = self.open_caches.get(cache_name) {
            let cache: Arc<dyn Cache> = Arc::clone(cache.value()) as Arc<dyn Cache>;
            return Ok(cache);
        }

        let cache = Arc::new(DiskCache::load(self.cache_dir(cache_name)).await?);
        if !names.iter().any(|n| n == cache_name) {
            names.push(cache_name.to_string());
            self.persist_names(&names).await?;
        }
        self.open_caches
            .insert(cache_name.to_string(), Arc::clone(&cache));
        Ok(cache)
    }

    async fn has(&self, cache_name: &str) -> SwResult<bool> {
        Ok(self.names.lock().await.iter().any(|n| n == cache_name))
    }

    async fn delete(&self, cache_name: &str) -> SwResult<bool> {
        let mut names = self.names.lock().await;
        let Some(position) = names.iter().position(|n| n == cache_name) else {
            return Ok(false);
        };
        names.remove(position);
        self.persist_names(&names).await?;
        self.open_caches.remove(cache_name);

        match fs::remove_dir_all(self.cache_dir(cache_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(SwError::Storage(format!("removing {cache_name}: {e}"))),
        }
        Ok(true)
    }

    async fn keys(&self) -> SwResult<Vec<String>> {
        Ok(self.names.lock().await.clone())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
#[allow(clippy::expect_used)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn request(url: &str) -> Request {
        Request::get(url).expect("test URL should parse")
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        {
            let storage = DiskCacheStorage::open_at(temp_dir.path()).await.unwrap();
            let cache = storage.open("images").await.unwrap();
            let response = Response::ok("png-bytes").with_header(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("image/png"),
            );
            cache
                .put(&request("https://example.com/a.png#frag"), response)
                .await
                .unwrap();
        }

        let storage = DiskCacheStorage::open_at(temp_dir.path()).await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["images"]);

        let cache = storage.open("images").await.unwrap();
        let hit = cache
            .match_request(&request("https://example.com/a.png"), &MatchOptions::default())
            .await
            .unwrap()
            .expect("entry should persist");
        assert_eq!(hit.body(), "png-bytes");
        assert_eq!(hit.header("content-type"), Some("image/png"));
    }

    #[tokio::test]
    async fn test_insertion_order_and_delete() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = DiskCacheStorage::open_at(temp_dir.path()).await.unwrap();
        let cache = storage.open("runtime").await.unwrap();

        for path in ["1", "2", "1"] {
            cache
                .put(&request(&format!("https://example.com/{path}")), Response::ok(path))
                .await
                .unwrap();
        }

        let keys: Vec<String> = cache
            .keys(None, &MatchOptions::default())
            .await
            .unwrap()
            .iter()
            .map(|r| r.url().path().to_string())
            .collect();
        assert_eq!(keys, vec!["/2", "/1"]);

        assert!(
            cache
                .delete(&request("https://example.com/2"), &MatchOptions::default())
                .await
                .unwrap()
        );
        assert_eq!(cache.keys(None, &MatchOptions::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_cache_removes_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let storage = DiskCacheStorage::open_at(temp_dir.path()).await.unwrap();
        let cache = storage.open("old").await.unwrap();
        cache
            .put(&request("https://example.com/x"), Response::ok("x"))
            .await
            .unwrap();

        assert!(storage.delete("old").await.unwrap());
        assert!(!storage.has("old").await.unwrap());
        assert!(!temp_dir.path().join(hashed_name("old")).exists());
        assert!(!storage.delete("old").await.unwrap());
    }
}
