//! Fetch request and response types.

use hashbrown::HashMap;
use url::Url;

use pwakit_common::epoch_millis;

use crate::cache::{CacheEntry, CacheKey};

// ==================== Requests ====================

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute request URL.
    pub url: Url,

    /// Request method, uppercase.
    pub method: String,

    /// Request headers.
    pub headers: HashMap<String, String>,

    /// Whether this request loads a full page document.
    pub is_navigation: bool,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self::with_method(url, "GET")
    }

    /// Create a navigation GET request.
    pub fn navigation(url: Url) -> Self {
        let mut request = Self::get(url);
        request.is_navigation = true;
        request
    }

    /// Create a request with an arbitrary method.
    pub fn with_method(url: Url, method: &str) -> Self {
        Self {
            url,
            method: method.to_uppercase(),
            headers: HashMap::new(),
            is_navigation: false,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Check whether this is a GET request.
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    /// Cache identity for this request.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.method, self.url.as_str())
    }
}

// ==================== Responses ====================

/// A response produced by the interceptor.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Status text.
    pub status_text: String,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether this response was served from cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// Create a 200 response with a body.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::new(),
            body,
            from_cache: false,
        }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether this response may overwrite a cache entry (status 200 only).
    pub fn is_cacheable(&self) -> bool {
        self.status == 200
    }

    /// Rebuild a response from a cached entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            status_text: entry.status_text.clone(),
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    /// Snapshot this response for the cache. The body is cloned so the
    /// original stays readable by the caller.
    pub fn to_entry(&self, request: &FetchRequest) -> CacheEntry {
        CacheEntry {
            url: request.url.to_string(),
            method: request.method.clone(),
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            cached_at: epoch_millis(),
        }
    }
}

// ==================== Outcome ====================

/// Outcome of running a request through the interceptor.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The interceptor produced a response.
    Response(FetchResponse),
    /// The request is not intercepted (non-GET or cross-origin).
    Passthrough,
}

impl FetchOutcome {
    /// The response, if one was produced.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            Self::Response(response) => Some(response),
            Self::Passthrough => None,
        }
    }

    /// Whether the request passed through unintercepted.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse(&format!("https://app.example{}", path)).unwrap()
    }

    #[test]
    fn test_request_method_uppercase() {
        let request = FetchRequest::with_method(url("/submit"), "post");
        assert_eq!(request.method, "POST");
        assert!(!request.is_get());
    }

    #[test]
    fn test_navigation_request() {
        let request = FetchRequest::navigation(url("/"));
        assert!(request.is_navigation);
        assert!(request.is_get());

        let request = FetchRequest::get(url("/app.js"));
        assert!(!request.is_navigation);
    }

    #[test]
    fn test_cache_key_identity() {
        let request = FetchRequest::get(url("/index.html"));
        let key = request.cache_key();

        assert_eq!(key.method, "GET");
        assert_eq!(key.url, "https://app.example/index.html");
    }

    #[test]
    fn test_response_cacheable_is_exactly_200() {
        assert!(FetchResponse::ok(Vec::new()).is_cacheable());

        let mut created = FetchResponse::ok(Vec::new());
        created.status = 201;
        assert!(created.is_success());
        assert!(!created.is_cacheable());

        let mut not_modified = FetchResponse::ok(Vec::new());
        not_modified.status = 304;
        assert!(!not_modified.is_cacheable());
    }

    #[test]
    fn test_entry_round_trip_keeps_body() {
        let request = FetchRequest::get(url("/page"));
        let response = FetchResponse::ok(b"hello".to_vec());

        let entry = response.to_entry(&request);
        assert_eq!(entry.url, "https://app.example/page");
        assert_eq!(entry.body, b"hello");
        assert!(entry.cached_at > 0);

        // The original response is untouched by the snapshot.
        assert_eq!(response.body, b"hello");
        assert!(!response.from_cache);

        let served = FetchResponse::from_entry(&entry);
        assert_eq!(served.body, b"hello");
        assert!(served.from_cache);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = FetchOutcome::Response(FetchResponse::ok(b"x".to_vec()));
        assert!(outcome.response().is_some());
        assert!(!outcome.is_passthrough());

        let outcome = FetchOutcome::Passthrough;
        assert!(outcome.response().is_none());
        assert!(outcome.is_passthrough());
    }
}
