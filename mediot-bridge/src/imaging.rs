//! Imaging store client.

use mediot_common::{ImagingRequest, ImagingResult};

use crate::config::ImagingConfig;
use crate::error::{BridgeError, Result};

/// Fetches image files from the imaging store over HTTP basic auth.
///
/// One attempt per request, without retry or deadline.
/// Notification paths are always resolved under the configured store URL, so
/// the credentials are only ever sent to that origin.
#[derive(Debug, Clone)]
pub struct ImageRetriever {
    client: reqwest::Client,
    base: reqwest::Url,
    base_url: String,
    username: String,
    password: String,
}

impl ImageRetriever {
    pub fn new(config: &ImagingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::config(format!("Failed to build HTTP client: {}", e)))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = reqwest::Url::parse(&base_url).map_err(|e| {
            BridgeError::config(format!("Invalid imaging base URL '{}': {}", base_url, e))
        })?;

        Ok(Self {
            client,
            base,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Resolve a notification path against the store base URL.
    ///
    /// Paths carrying a scheme or an authority are refused.
    pub fn url_for(&self, path: &str) -> Result<reqwest::Url> {
        let reject = |message: String| BridgeError::Imaging {
            path: path.to_string(),
            message,
        };

        if path.starts_with("//") || path.contains("://") || reqwest::Url::parse(path).is_ok() {
            return Err(reject("path must be relative to the imaging store".to_string()));
        }

        let url = reqwest::Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))
        .map_err(|e| reject(e.to_string()))?;

        if url.origin() != self.base.origin() {
            return Err(reject("path leaves the imaging store".to_string()));
        }
        Ok(url)
    }

    /// Download the file a notification points at.
    pub async fn fetch(&self, request: ImagingRequest) -> Result<ImagingResult> {
        let url = self.url_for(&request.path)?;
        let fail = |message: String| BridgeError::Imaging {
            path: request.path.clone(),
            message,
        };

        let response = self
            .client
            .get(url.as_str())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("store answered {}", status)));
        }

        let bytes = response.bytes().await.map_err(|e| fail(e.to_string()))?;

        tracing::debug!(
            patient = %request.patient_id,
            url = %url,
            bytes = bytes.len(),
            "Image retrieved"
        );
        Ok(ImagingResult::new(request, bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;

    const EXPECTED_AUTH: &str = "Basic YWJhOjIwMjQ=";

    async fn serve_store() -> String {
        async fn file(headers: HeaderMap) -> (StatusCode, Vec<u8>) {
            let authorized = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == EXPECTED_AUTH);
            if authorized {
                (StatusCode::OK, vec![0x44, 0x49, 0x43, 0x4d])
            } else {
                (StatusCode::UNAUTHORIZED, Vec::new())
            }
        }

        let router = Router::new().route("/instances/1/file", get(file));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config(base_url: &str, password: &str) -> ImagingConfig {
        ImagingConfig {
            base_url: base_url.to_string(),
            username: "aba".to_string(),
            password: password.to_string(),
        }
    }

    fn request(path: &str) -> ImagingRequest {
        ImagingRequest {
            patient_id: "P1".to_string(),
            patient_name: "Doe".to_string(),
            path: path.to_string(),
        }
    }

    #[test]
    fn test_url_resolution() {
        let retriever = ImageRetriever::new(&config("http://pacs:8042/", "x")).unwrap();

        assert_eq!(
            retriever.url_for("/instances/1/file").unwrap().as_str(),
            "http://pacs:8042/instances/1/file"
        );
        assert_eq!(
            retriever.url_for("instances/1/file").unwrap().as_str(),
            "http://pacs:8042/instances/1/file"
        );
    }

    #[test]
    fn test_paths_outside_the_store_are_refused() {
        let retriever = ImageRetriever::new(&config("http://pacs:8042", "x")).unwrap();

        for path in [
            "https://other/file",
            "http://127.0.0.1:9/steal",
            "//other/file",
            "file:///etc/passwd",
        ] {
            let err = retriever.url_for(path).unwrap_err();
            assert!(
                matches!(err, BridgeError::Imaging { .. }),
                "{} should be refused",
                path
            );
        }
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(ImageRetriever::new(&config("not a url", "x")).is_err());
    }

    #[tokio::test]
    async fn test_fetch_returns_bytes_and_metadata() {
        let base = serve_store().await;
        let retriever = ImageRetriever::new(&config(&base, "2024")).unwrap();

        let result = retriever.fetch(request("/instances/1/file")).await.unwrap();

        assert_eq!(result.patient_id, "P1");
        assert_eq!(result.patient_name, "Doe");
        assert_eq!(result.path, "/instances/1/file");
        assert_eq!(result.image_bytes, b"DICM");
    }

    #[tokio::test]
    async fn test_fetch_rejected_credentials() {
        let base = serve_store().await;
        let retriever = ImageRetriever::new(&config(&base, "wrong")).unwrap();

        let err = retriever.fetch(request("/instances/1/file")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Imaging { .. }));
    }

    #[tokio::test]
    async fn test_credentials_never_sent_to_other_hosts() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/steal",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::OK
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let other = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let base = serve_store().await;
        let retriever = ImageRetriever::new(&config(&base, "2024")).unwrap();

        let err = retriever
            .fetch(request(&format!("http://{}/steal", other)))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Imaging { .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let base = serve_store().await;
        let retriever = ImageRetriever::new(&config(&base, "2024")).unwrap();

        let err = retriever.fetch(request("/instances/2/file")).await.unwrap_err();
        assert!(matches!(err, BridgeError::Imaging { .. }));
    }
}
