//! HTTP schema source: `GET {base_url}/{project_ref}` returning a JSON document.
//!
//! Status handling lives here only: 404 is `NotFound`, any other non-2xx is
//! `Request`, and a body that is not JSON is `InvalidDocument`.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use evalflow_core::workflow::{SchemaFetchError, SchemaFetcher};

#[derive(Debug, Clone)]
pub struct HttpSchemaFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSchemaFetcher {
    pub fn new(base_url: &str) -> Result<Self, SchemaFetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SchemaFetchError::Request(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, project_ref: &str) -> String {
        format!("{}/{}", self.base_url, project_ref.trim_matches('/'))
    }
}

impl SchemaFetcher for HttpSchemaFetcher {
    async fn fetch(&self, project_ref: &str) -> Result<Value, SchemaFetchError> {
        let url = self.url(project_ref);
        debug!(url = %url, "fetching schema document");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| SchemaFetchError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(SchemaFetchError::NotFound(project_ref.to_string())),
            status if !status.is_success() => {
                return Err(SchemaFetchError::Request(format!("HTTP {status}")));
            }
            _ => {}
        }

        let body = response
            .text()
            .await
            .map_err(|e| SchemaFetchError::Request(format!("failed to read response body: {e}")))?;
        serde_json::from_str(&body).map_err(|e| SchemaFetchError::InvalidDocument(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_project_ref() {
        let fetcher = HttpSchemaFetcher::new("https://schemas.example.com/v1/").unwrap();
        assert_eq!(fetcher.url("proj-7"), "https://schemas.example.com/v1/proj-7");
        assert_eq!(fetcher.url("/proj-7/"), "https://schemas.example.com/v1/proj-7");
    }

    #[tokio::test]
    async fn test_unreachable_source_is_request_error() {
        let fetcher = HttpSchemaFetcher::new("http://127.0.0.1:9").unwrap();
        let result = fetcher.fetch("proj-7").await;
        assert!(matches!(result, Err(SchemaFetchError::Request(_))));
    }
}
