//! Trybot HTTP Clients
//!
//! Small, type-safe HTTP clients for the external services the dispatcher
//! talks to:
//! - [`GerritClient`]: change discovery and review posting
//! - [`SourceClient`]: source archive downloads
//! - [`StorageClient`]: durable log objects
//! - [`CoordinatorClient`]: remote worker lifecycle
//!
//! # Example
//!
//! ```no_run
//! use trybot_client::GerritClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gerrit = GerritClient::new("https://go-review.googlesource.com");
//!
//!     let changes = gerrit.query_changes("status:open project:go").await?;
//!     println!("Found {} changes", changes.len());
//!     Ok(())
//! }
//! ```

mod coordinator;
pub mod error;
mod gerrit;
mod source;
mod storage;

// Re-export commonly used types
pub use coordinator::{CoordinatorClient, ExecStatus};
pub use error::{ClientError, Result};
pub use gerrit::GerritClient;
pub use source::SourceClient;
pub use storage::StorageClient;

use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;

/// Attach a bearer token to a request when one is configured
fn authorize(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Turn a non-success response into an [`ClientError::ApiError`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response)
}

/// Handle an API response and deserialize JSON
async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response that returns no content
async fn handle_empty_response(response: Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

/// Normalize a base URL so paths can be appended with `/`
fn trim_base(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
