//! Generation storage - named buckets of request/response pairs
//!
//! Storage is keyed twice: a `GenerationStore` maps generation names
//! ("appShell_v2", "dynamic_v2") to `CacheGeneration` buckets, and each bucket
//! maps request paths to stored responses. Writes are insert-or-overwrite,
//! never read-modify-write, so concurrent fetch tasks need no coordination
//! beyond the maps themselves.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::types::{CanopyError, Result};

/// A response buffered for storage and replay.
///
/// Bodies are fully buffered at capture time. Platform response streams are
/// single-use, so the upstream body is consumed exactly once; clones of this
/// struct are structural duplicates sharing immutable bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl StoredResponse {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Success responses in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First header value matching `name`, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }
}

/// One named cache generation
pub struct CacheGeneration {
    name: String,
    entries: DashMap<String, StoredResponse>,
}

impl CacheGeneration {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert or overwrite the entry for `key`. Partial (206) responses are
    /// not storable; replaying a byte range as a full response corrupts
    /// later reads.
    pub fn put(&self, key: &str, response: StoredResponse) -> Result<()> {
        if response.status == 206 {
            return Err(CanopyError::CacheWrite(format!(
                "refusing to store partial response for {}",
                key
            )));
        }
        self.entries.insert(key.to_string(), response);
        Ok(())
    }

    /// Clone out the entry for `key`, if present
    pub fn get(&self, key: &str) -> Option<StoredResponse> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total buffered body bytes in this generation
    pub fn body_bytes(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| e.value().body.len() as u64)
            .sum()
    }
}

/// All generations currently in storage
pub struct GenerationStore {
    generations: DashMap<String, Arc<CacheGeneration>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Storage counters snapshot
#[derive(Debug, Clone, Copy)]
pub struct StoreStats {
    pub generations: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl GenerationStore {
    pub fn new() -> Self {
        Self {
            generations: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Open a generation by name, creating it if absent. Reopening returns
    /// the same bucket with its entries intact.
    pub fn open(&self, name: &str) -> Arc<CacheGeneration> {
        self.generations
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(generation = name, "Opened cache generation");
                Arc::new(CacheGeneration::new(name))
            })
            .clone()
    }

    /// Look up a generation without creating it
    pub fn get(&self, name: &str) -> Option<Arc<CacheGeneration>> {
        self.generations.get(name).map(|e| e.value().clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.generations.contains_key(name)
    }

    /// Drop a generation and everything in it. Returns whether it existed.
    pub fn delete(&self, name: &str) -> bool {
        let existed = self.generations.remove(name).is_some();
        if existed {
            debug!(generation = name, "Deleted cache generation");
        }
        existed
    }

    /// Names of every generation currently in storage
    pub fn names(&self) -> Vec<String> {
        self.generations.iter().map(|e| e.key().clone()).collect()
    }

    /// Match `key` against all generations; first match wins, no precedence
    /// between generations.
    pub fn match_any(&self, key: &str) -> Option<StoredResponse> {
        for entry in self.generations.iter() {
            if let Some(response) = entry.value().get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(response);
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            generations: self.generations.len(),
            entries: self.generations.iter().map(|e| e.value().len()).sum(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for GenerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> StoredResponse {
        StoredResponse::new(
            200,
            vec![("content-type".to_string(), "text/plain".to_string())],
            Bytes::copy_from_slice(body.as_bytes()),
        )
    }

    #[test]
    fn test_open_is_idempotent() {
        let store = GenerationStore::new();
        let first = store.open("appShell_v1");
        first.put("/index.html", response("shell")).unwrap();

        let second = store.open("appShell_v1");
        assert_eq!(second.len(), 1);
        assert!(second.contains("/index.html"));
        assert_eq!(store.names(), vec!["appShell_v1".to_string()]);
    }

    #[test]
    fn test_put_overwrites_last_write_wins() {
        let store = GenerationStore::new();
        let generation = store.open("dynamic_v1");
        generation.put("/data.json", response("old")).unwrap();
        generation.put("/data.json", response("new")).unwrap();

        let stored = generation.get("/data.json").unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"new"));
        assert_eq!(generation.len(), 1);
    }

    #[test]
    fn test_get_returns_structural_clone() {
        let store = GenerationStore::new();
        let generation = store.open("dynamic_v1");
        generation.put("/a", response("payload")).unwrap();

        let first = generation.get("/a").unwrap();
        let second = generation.get("/a").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_response_rejected() {
        let store = GenerationStore::new();
        let generation = store.open("dynamic_v1");
        let partial = StoredResponse::new(206, vec![], Bytes::from_static(b"chunk"));

        let err = generation.put("/video", partial).unwrap_err();
        assert!(matches!(err, CanopyError::CacheWrite(_)));
        assert!(!generation.contains("/video"));
    }

    #[test]
    fn test_delete_removes_generation() {
        let store = GenerationStore::new();
        store.open("appShell_v1");
        assert!(store.delete("appShell_v1"));
        assert!(!store.has("appShell_v1"));
        assert!(!store.delete("appShell_v1"));
    }

    #[test]
    fn test_match_any_searches_all_generations() {
        let store = GenerationStore::new();
        store
            .open("appShell_v1")
            .put("/index.html", response("shell"))
            .unwrap();
        store
            .open("dynamic_v1")
            .put("/api/users", response("users"))
            .unwrap();

        assert!(store.match_any("/index.html").is_some());
        assert!(store.match_any("/api/users").is_some());
        assert!(store.match_any("/missing").is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.generations, 2);
        assert_eq!(stats.entries, 2);
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let resp = response("x");
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("text/plain"));
        assert_eq!(resp.header("etag"), None);
    }
}
