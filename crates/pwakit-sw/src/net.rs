//! Network backends for the interceptor.

use futures::future::BoxFuture;
use hashbrown::HashMap;
use tracing::debug;

use crate::fetch::{FetchRequest, FetchResponse};
use crate::ServiceWorkerError;

/// Transport used to reach the network.
///
/// The interceptor treats the network as a pluggable seam: deployments run
/// against HTTP while tests and the smoke harness script responses and
/// failures.
pub trait NetworkBackend: Send + Sync {
    /// Execute a request against the network.
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, ServiceWorkerError>>;
}

/// HTTP backend built on reqwest.
///
/// No timeout is applied at this layer; a slow fetch simply delays strategy
/// resolution.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend with a default client.
    pub fn new() -> Result<Self, ServiceWorkerError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceWorkerError::NetworkError(e.to_string()))?;
        Ok(Self { client })
    }

    /// Create a backend around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl NetworkBackend for HttpBackend {
    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, ServiceWorkerError>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| ServiceWorkerError::NetworkError(e.to_string()))?;

            let mut builder = self.client.request(method, request.url.clone());
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder
                .send()
                .await
                .map_err(|e| ServiceWorkerError::NetworkError(e.to_string()))?;

            let status = response.status();
            let mut headers = HashMap::new();
            for (name, value) in response.headers() {
                if let Ok(value) = value.to_str() {
                    headers.insert(name.to_string(), value.to_string());
                }
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| ServiceWorkerError::NetworkError(e.to_string()))?
                .to_vec();

            debug!(
                url = %request.url,
                status = status.as_u16(),
                bytes = body.len(),
                "network fetch complete"
            );

            Ok(FetchResponse {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
                headers,
                body,
                from_cache: false,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_http_backend_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;

        let backend = HttpBackend::new().unwrap();
        let url = Url::parse(&format!("{}/hello", server.uri())).unwrap();
        let response = backend.fetch(&FetchRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"hi");
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_http_backend_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(header("x-requested-with", "pwakit"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let backend = HttpBackend::new().unwrap();
        let url = Url::parse(&format!("{}/data", server.uri())).unwrap();
        let request = FetchRequest::get(url).header("x-requested-with", "pwakit");

        let response = backend.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_http_backend_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let backend = HttpBackend::new().unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let response = backend.fetch(&FetchRequest::get(url)).await.unwrap();

        assert_eq!(response.status, 404);
        assert_eq!(response.status_text, "Not Found");
        assert!(!response.is_cacheable());
    }

    #[tokio::test]
    async fn test_http_backend_connection_failure() {
        let backend = HttpBackend::new().unwrap();
        // Port 1 is essentially never listening.
        let url = Url::parse("http://127.0.0.1:1/unreachable").unwrap();

        let result = backend.fetch(&FetchRequest::get(url)).await;
        assert!(matches!(result, Err(ServiceWorkerError::NetworkError(_))));
    }
}
