//! Worker coordinator API
//!
//! The coordinator hands out ephemeral build workers and proxies file
//! uploads and command execution to them.

use reqwest::Client;
use tracing::debug;
use trybot_core::dto::worker::{
    CreateWorker, ExecEvent, ExecRequest, PutTarFromUrl, WorkDir, WorkerInfo,
};

use crate::error::{ClientError, Result};
use crate::{authorize, handle_empty_response, handle_response, trim_base};

/// How a remote command finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecStatus {
    /// The command ran and reported success
    Passed,
    /// The command ran and reported failure
    Failed(String),
}

/// HTTP client for the coordinator's worker API
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    base_url: String,
    token: Option<String>,
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    ///
    /// # Arguments
    /// * `base_url` - The coordinator URL (e.g., "https://coordinator.internal:8443")
    pub fn new(base_url: impl Into<String>) -> Self {
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

    fn worker_url(&self, name: &str, action: &str) -> String {
        format!("{}/api/workers/{}/{}", self.base_url, name, action)
    }

    // =============================================================================
    // Worker Lifecycle
    // =============================================================================

    /// Allocate a worker of the given builder type
    ///
    /// Blocks until the coordinator reports the worker as ready.
    pub async fn create_worker(&self, builder_type: &str) -> Result<WorkerInfo> {
        let url = format!("{}/api/workers", self.base_url);
        let request = self.client.post(&url).json(&CreateWorker {
            builder_type: builder_type.to_string(),
        });
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_response(response).await
    }

    /// Destroy a worker
    pub async fn destroy_worker(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/workers/{}", self.base_url, name);
        let request = self.client.delete(&url);
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    /// Work directory of a worker
    pub async fn work_dir(&self, name: &str) -> Result<String> {
        let request = self.client.get(self.worker_url(name, "workdir"));
        let response = authorize(request, self.token.as_deref()).send().await?;

        let work_dir: WorkDir = handle_response(response).await?;
        Ok(work_dir.dir)
    }

    // =============================================================================
    // File Staging
    // =============================================================================

    /// Extract a gzip tarball into `dir` on the worker
    pub async fn put_tar(&self, name: &str, archive: Vec<u8>, dir: &str) -> Result<()> {
        let request = self
            .client
            .put(self.worker_url(name, "tar"))
            .query(&[("dir", dir)])
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(archive);
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    /// Have the worker download a tarball and extract it into `dir`
    pub async fn put_tar_from_url(&self, name: &str, url: &str, dir: &str) -> Result<()> {
        let request = self
            .client
            .post(self.worker_url(name, "tar-url"))
            .json(&PutTarFromUrl {
                url: url.to_string(),
                dir: dir.to_string(),
            });
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    /// Write a single file on the worker
    pub async fn put_file(&self, name: &str, content: Vec<u8>, path: &str, mode: u32) -> Result<()> {
        let mode = format!("{:04o}", mode);
        let request = self
            .client
            .put(self.worker_url(name, "file"))
            .query(&[("path", path), ("mode", mode.as_str())])
            .body(content);
        let response = authorize(request, self.token.as_deref()).send().await?;

        handle_empty_response(response).await
    }

    // =============================================================================
    // Execution
    // =============================================================================

    /// Run a command on the worker, streaming its combined output
    ///
    /// `on_output` is called for every output chunk as it arrives. An `Err`
    /// means the command could not be run or its status was lost; a command
    /// that ran and failed is `Ok(ExecStatus::Failed(..))`.
    pub async fn exec(
        &self,
        name: &str,
        request: &ExecRequest,
        on_output: &mut (dyn FnMut(&[u8]) + Send),
    ) -> Result<ExecStatus> {
        debug!("Executing {} on worker {}", request.cmd, name);

        let http_request = self.client.post(self.worker_url(name, "exec")).json(request);
        let response = authorize(http_request, self.token.as_deref())
            .send()
            .await?;
        let mut response = crate::check_status(response).await?;

        let mut stream = ExecStream::default();
        while let Some(chunk) = response.chunk().await? {
            stream.feed(&chunk, on_output)?;
        }

        stream.finish(on_output)
    }
}

/// Incremental parser for the newline-delimited exec event stream
#[derive(Debug, Default)]
struct ExecStream {
    pending: Vec<u8>,
    status: Option<ExecStatus>,
}

impl ExecStream {
    fn feed(&mut self, chunk: &[u8], on_output: &mut (dyn FnMut(&[u8]) + Send)) -> Result<()> {
        self.pending.extend_from_slice(chunk);

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.handle_line(&line[..line.len() - 1], on_output)?;
        }

        Ok(())
    }

    fn finish(mut self, on_output: &mut (dyn FnMut(&[u8]) + Send)) -> Result<ExecStatus> {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.handle_line(&line, on_output)?;
        }

        self.status.ok_or_else(|| {
            ClientError::ParseError("exec stream ended without an exit status".to_string())
        })
    }

    fn handle_line(&mut self, line: &[u8], on_output: &mut (dyn FnMut(&[u8]) + Send)) -> Result<()> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let event: ExecEvent = serde_json::from_slice(line)
            .map_err(|e| ClientError::ParseError(format!("Invalid exec event: {}", e)))?;

        match event {
            ExecEvent::Output(text) => on_output(text.as_bytes()),
            ExecEvent::Exit { error } => {
                self.status = Some(match error {
                    Some(message) => ExecStatus::Failed(message),
                    None => ExecStatus::Passed,
                });
            }
        }

        Ok(())
    }
}
