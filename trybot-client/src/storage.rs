//! Google Cloud Storage object uploads

use reqwest::Client;

use crate::error::Result;
use crate::{authorize, handle_empty_response, trim_base};

/// Default GCS JSON API endpoint
pub const DEFAULT_STORAGE_URL: &str = "https://storage.googleapis.com";

/// Host serving authenticated browser downloads of objects
const PUBLIC_URL_BASE: &str = "https://storage.cloud.google.com";

/// Client for creating and overwriting storage objects
#[derive(Debug, Clone)]
pub struct StorageClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl StorageClient {
    /// Create a client for the public GCS endpoint
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_STORAGE_URL)
    }

    /// Create a client for a custom endpoint (emulators, tests)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: trim_base(base_url),
            token: None,
            client: Client::new(),
        }
    }

    /// Authenticate requests with a bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Create or overwrite `bucket/object` with `content`
    pub async fn put_object(&self, bucket: &str, object: &str, content: Vec<u8>) -> Result<()> {
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, bucket);
        let request = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", object)])
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(content);
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    /// Browser URL of an object
    pub fn public_url(bucket: &str, object: &str) -> String {
        format!("{}/{}/{}", PUBLIC_URL_BASE, bucket, object)
    }
}

impl Default for StorageClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_public_url() {
        assert_eq!(
            StorageClient::public_url("trybot-logs", "abc123-0a1b2c3d/linux-amd64"),
            "https://storage.cloud.google.com/trybot-logs/abc123-0a1b2c3d/linux-amd64"
        );
    }

    #[tokio::test]
    async fn test_put_object_uploads_media() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/storage/v1/b/trybot-logs/o"))
            .and(query_param("uploadType", "media"))
            .and(query_param("name", "abc123-0a1b2c3d/linux-amd64"))
            .and(body_bytes(b"ok\n".to_vec()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = StorageClient::with_base_url(mock_server.uri());
        client
            .put_object("trybot-logs", "abc123-0a1b2c3d/linux-amd64", b"ok\n".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_object_reports_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = StorageClient::with_base_url(mock_server.uri());
        let err = client
            .put_object("trybot-logs", "obj", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
    }
}
