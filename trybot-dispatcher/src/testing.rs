//! In-memory fakes for the repository traits, shared by unit tests

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trybot_client::{ClientError, ExecStatus};
use trybot_core::domain::builder::{BuilderRegistry, BuilderType};
use trybot_core::domain::change::Change;
use trybot_core::dto::gerrit::ReviewInput;

use crate::repository::{ArchiveSource, ObjectStore, ReviewRepository, Worker, WorkerProvider};
use crate::service::{LiveLog, LogSinks, StageTimeouts, TestRunner};

/// Gzip-compresses `data`
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn injected() -> ClientError {
    ClientError::api_error(500, "injected fault")
}

/// Test runner over `provider` with the builtin registry and console logs
pub fn runner_with(provider: Arc<FakeWorkerProvider>, timeouts: StageTimeouts) -> TestRunner {
    TestRunner::new(
        provider,
        Arc::new(BuilderRegistry::builtin()),
        Arc::new(LogSinks::console()),
        timeouts,
    )
}

// =============================================================================
// Workers
// =============================================================================

/// Where a fake worker should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Create,
    /// Allocates the worker but answers two minutes later
    SlowCreate,
    Bootstrap,
    UploadSource,
    WriteVersion,
    WorkDir,
    ExecInfra,
    TestsFail,
    ExecHang,
    Teardown,
}

#[derive(Default)]
struct ProviderState {
    creates: usize,
    teardowns: usize,
    counters: HashMap<String, usize>,
    calls: HashMap<String, Vec<String>>,
}

/// Worker provider counting creates and teardowns
#[derive(Default)]
pub struct FakeWorkerProvider {
    faults: HashMap<String, Fault>,
    state: Arc<Mutex<ProviderState>>,
}

impl FakeWorkerProvider {
    /// Makes every worker of `builder` fail at `fault`
    pub fn fail(mut self, builder: &str, fault: Fault) -> Self {
        self.faults.insert(builder.to_string(), fault);
        self
    }

    pub fn creates(&self) -> usize {
        self.state.lock().unwrap().creates
    }

    pub fn teardowns(&self) -> usize {
        self.state.lock().unwrap().teardowns
    }

    /// Calls made on the named worker, in order
    pub fn calls(&self, worker: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(worker)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl WorkerProvider for FakeWorkerProvider {
    async fn create_worker(&self, builder: &BuilderType) -> Result<Box<dyn Worker>, ClientError> {
        let fault = self.faults.get(builder.as_str()).copied();
        if fault == Some(Fault::Create) {
            return Err(injected());
        }

        let name = {
            let mut state = self.state.lock().unwrap();
            state.creates += 1;
            let counter = state.counters.entry(builder.to_string()).or_default();
            let name = format!("{}-{}", builder, counter);
            *counter += 1;
            name
        };

        if fault == Some(Fault::SlowCreate) {
            tokio::time::sleep(Duration::from_secs(120)).await;
        }

        Ok(Box::new(FakeWorker {
            name,
            fault,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeWorker {
    name: String,
    fault: Option<Fault>,
    state: Arc<Mutex<ProviderState>>,
}

impl FakeWorker {
    fn record(&self, call: String) {
        self.state
            .lock()
            .unwrap()
            .calls
            .entry(self.name.clone())
            .or_default()
            .push(call);
    }

    fn check(&self, fault: Fault) -> Result<(), ClientError> {
        if self.fault == Some(fault) {
            Err(injected())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Worker for FakeWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put_archive_from_url(&self, url: &str, dir: &str) -> Result<(), ClientError> {
        self.record(format!("tar-url {} {}", dir, url));
        self.check(Fault::Bootstrap)
    }

    async fn put_archive(&self, _archive: &[u8], dir: &str) -> Result<(), ClientError> {
        self.record(format!("tar {}", dir));
        self.check(Fault::UploadSource)
    }

    async fn put_file(&self, content: &[u8], path: &str, mode: u32) -> Result<(), ClientError> {
        self.record(format!(
            "file {} {:o} {}",
            path,
            mode,
            String::from_utf8_lossy(content)
        ));
        self.check(Fault::WriteVersion)
    }

    async fn work_dir(&self) -> Result<String, ClientError> {
        self.record("workdir".to_string());
        self.check(Fault::WorkDir)?;
        Ok("/workdir".to_string())
    }

    async fn execute(
        &self,
        cmd: &str,
        _args: &[String],
        _env: &[(String, String)],
        output: &dyn LiveLog,
    ) -> Result<ExecStatus, ClientError> {
        self.record(format!("exec {}", cmd));
        match self.fault {
            Some(Fault::ExecInfra) => Err(injected()),
            Some(Fault::ExecHang) => std::future::pending().await,
            Some(Fault::TestsFail) => {
                output.write(b"--- FAIL: TestInjected\n");
                Ok(ExecStatus::Failed("exit status 1".to_string()))
            }
            _ => {
                output.write(b"ALL TESTS PASSED\n");
                Ok(ExecStatus::Passed)
            }
        }
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.record("close".to_string());
        self.state.lock().unwrap().teardowns += 1;
        self.check(Fault::Teardown)
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Object store keeping objects in memory
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn object(&self, bucket: &str, object: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, object))
            .cloned()
    }

    /// Makes every later write fail
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        object: &str,
        content: Vec<u8>,
    ) -> Result<(), ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(injected());
        }
        self.objects
            .lock()
            .unwrap()
            .insert(format!("{}/{}", bucket, object), content);
        Ok(())
    }
}

// =============================================================================
// Archives
// =============================================================================

/// Archive source answering every revision the same way
pub struct FakeArchiveSource {
    response: Result<Vec<u8>, u16>,
}

impl FakeArchiveSource {
    /// Answers `200 OK` with `body`
    pub fn ok(body: Vec<u8>) -> Self {
        Self { response: Ok(body) }
    }

    /// Answers with an error status
    pub fn status(status: u16) -> Self {
        Self {
            response: Err(status),
        }
    }
}

#[async_trait]
impl ArchiveSource for FakeArchiveSource {
    async fn fetch(&self, revision: &str) -> Result<Vec<u8>, ClientError> {
        self.response
            .clone()
            .map_err(|status| ClientError::api_error(status, format!("fetching {}", revision)))
    }
}

// =============================================================================
// Review system
// =============================================================================

/// A review posted through [`FakeReview`]
#[derive(Debug, Clone)]
pub struct PostedReview {
    pub change_id: String,
    pub revision: String,
    pub review: ReviewInput,
}

/// Review system serving a fixed set of changes
#[derive(Default)]
pub struct FakeReview {
    changes: Vec<Change>,
    queries: Mutex<Vec<String>>,
    posted: Mutex<Vec<PostedReview>>,
    fail_reviews: bool,
}

impl FakeReview {
    pub fn with_changes(changes: Vec<Change>) -> Self {
        Self {
            changes,
            ..Default::default()
        }
    }

    /// Makes every review post fail
    pub fn failing_reviews(mut self) -> Self {
        self.fail_reviews = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn posted(&self) -> Vec<PostedReview> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewRepository for FakeReview {
    async fn query_changes(&self, query: &str) -> Result<Vec<Change>, ClientError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.changes.clone())
    }

    async fn set_review(
        &self,
        change_id: &str,
        revision: &str,
        review: &ReviewInput,
    ) -> Result<(), ClientError> {
        if self.fail_reviews {
            return Err(injected());
        }
        self.posted.lock().unwrap().push(PostedReview {
            change_id: change_id.to_string(),
            revision: revision.to_string(),
            review: review.clone(),
        });
        Ok(())
    }
}

/// A change with revision `revision`
pub fn change(number: u64, revision: &str) -> Change {
    Change {
        id: format!("go~master~I{}", number),
        number,
        project: "golang/go-private".to_string(),
        current_revision: revision.to_string(),
        patchset: 1,
    }
}
