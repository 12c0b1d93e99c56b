//! Worker provider repository
//!
//! Wraps the coordinator's worker lifecycle API behind traits so a worker
//! run can be driven against fakes.

use async_trait::async_trait;
use trybot_client::{ClientError, CoordinatorClient, ExecStatus};
use trybot_core::domain::builder::BuilderType;
use trybot_core::dto::worker::ExecRequest;

use crate::service::LiveLog;

/// Allocates ephemeral workers
#[async_trait]
pub trait WorkerProvider: Send + Sync {
    /// Creates a worker of the given builder type
    async fn create_worker(&self, builder: &BuilderType) -> Result<Box<dyn Worker>, ClientError>;
}

/// Handle to one allocated worker
#[async_trait]
pub trait Worker: Send + Sync {
    /// Remote name of the worker
    fn name(&self) -> &str;

    /// Has the worker download a tarball and extract it into `dir`
    async fn put_archive_from_url(&self, url: &str, dir: &str) -> Result<(), ClientError>;

    /// Extracts a gzip tarball into `dir`
    async fn put_archive(&self, archive: &[u8], dir: &str) -> Result<(), ClientError>;

    /// Writes a single file
    async fn put_file(&self, content: &[u8], path: &str, mode: u32) -> Result<(), ClientError>;

    /// Absolute path of the worker's work directory
    async fn work_dir(&self) -> Result<String, ClientError>;

    /// Runs `cmd`, streaming combined output into `output`
    ///
    /// `Err` means the command could not be invoked; a command that ran and
    /// failed is `Ok(ExecStatus::Failed(..))`.
    async fn execute(
        &self,
        cmd: &str,
        args: &[String],
        env: &[(String, String)],
        output: &dyn LiveLog,
    ) -> Result<ExecStatus, ClientError>;

    /// Destroys the worker
    async fn close(&self) -> Result<(), ClientError>;
}

/// Coordinator-backed WorkerProvider
pub struct CoordinatorWorkerProvider {
    client: CoordinatorClient,
}

impl CoordinatorWorkerProvider {
    pub fn new(client: CoordinatorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkerProvider for CoordinatorWorkerProvider {
    async fn create_worker(&self, builder: &BuilderType) -> Result<Box<dyn Worker>, ClientError> {
        let info = self.client.create_worker(builder.as_str()).await?;
        Ok(Box::new(CoordinatorWorker {
            client: self.client.clone(),
            name: info.name,
        }))
    }
}

/// Worker allocated through the coordinator
struct CoordinatorWorker {
    client: CoordinatorClient,
    name: String,
}

#[async_trait]
impl Worker for CoordinatorWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_archive_from_url(&self, url: &str, dir: &str) -> Result<(), ClientError> {
        self.client.put_tar_from_url(&self.name, url, dir).await
    }

    async fn put_archive(&self, archive: &[u8], dir: &str) -> Result<(), ClientError> {
        self.client.put_tar(&self.name, archive.to_vec(), dir).await
    }

    async fn put_file(&self, content: &[u8], path: &str, mode: u32) -> Result<(), ClientError> {
        self.client
            .put_file(&self.name, content.to_vec(), path, mode)
            .await
    }

    async fn work_dir(&self) -> Result<String, ClientError> {
        self.client.work_dir(&self.name).await
    }

    async fn execute(
        &self,
        cmd: &str,
        args: &[String],
        env: &[(String, String)],
        output: &dyn LiveLog,
    ) -> Result<ExecStatus, ClientError> {
        let request = ExecRequest {
            cmd: cmd.to_string(),
            args: args.to_vec(),
            env: env.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
        };

        self.client
            .exec(&self.name, &request, &mut |chunk: &[u8]| {
                output.write(chunk);
            })
            .await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.client.destroy_worker(&self.name).await
    }
}
