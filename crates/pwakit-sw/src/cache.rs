//! Cache generations and the generation store.
//!
//! One [`Cache`] is a named generation of request/response snapshots tied to
//! a deployment version. [`CacheStorage`] holds every generation known to
//! the scope; request-serving logic only ever addresses the current one.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

// ==================== Keys ====================

/// Identity of a cached request (method + absolute URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Request method, uppercase.
    pub method: String,
    /// Absolute request URL.
    pub url: String,
}

impl CacheKey {
    /// Create a key from a method and URL.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
        }
    }

    /// Key for a GET request.
    pub fn get(url: &str) -> Self {
        Self::new("GET", url)
    }
}

// ==================== Entries ====================

/// A cached request/response snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Identity key for this entry.
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.method, &self.url)
    }
}

// ==================== Cache ====================

/// A named cache generation.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    /// Generation name (version tag).
    pub name: String,

    /// Entries keyed by request identity.
    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new empty generation.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Rebuild a generation from stored entries.
    pub fn from_entries(name: &str, entries: Vec<CacheEntry>) -> Self {
        let mut cache = Self::new(name);
        cache.insert_all(entries);
        cache
    }

    /// Match a request identity.
    pub fn match_request(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Insert an entry, replacing any existing one with the same identity.
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Insert a batch of entries.
    pub fn insert_all(&mut self, entries: Vec<CacheEntry>) {
        for entry in entries {
            self.put(entry);
        }
    }

    /// Delete an entry.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// All request identities in this generation.
    pub fn keys(&self) -> Vec<&CacheKey> {
        self.entries.keys().collect()
    }

    /// All entries in this generation.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the generation is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// The collection of cache generations.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, Cache>,
}

impl CacheStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a generation, creating it if absent.
    pub fn open(&mut self, name: &str) -> &mut Cache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
    }

    /// Get a generation without creating it.
    pub fn get(&self, name: &str) -> Option<&Cache> {
        self.caches.get(name)
    }

    /// Insert a prebuilt generation, replacing any with the same name.
    pub fn insert(&mut self, cache: Cache) {
        self.caches.insert(cache.name.clone(), cache);
    }

    /// Check whether a generation exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a generation.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// Names of all generations.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }

    /// Number of generations.
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    /// Whether the store holds no generations.
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
