//! Live log sinks
//!
//! Each worker run streams its output into exactly one sink. Two backends
//! share the [`LiveLog`] contract:
//! - [`DurableLog`]: buffers output in memory and periodically uploads the
//!   whole buffer to a storage object, so the log URL can be followed while
//!   the tests are still running
//! - [`ConsoleLog`]: writes prefixed lines straight to stdout
//!
//! Writes never fail from the caller's point of view. Only the final flush
//! performed by `close` reports an error.

use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use trybot_client::ClientError;
use trybot_core::domain::builder::BuilderType;

use crate::repository::ObjectStore;

/// Errors reported by a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("storage write failed: {0}")]
    Storage(#[from] ClientError),

    #[error("log sink already closed")]
    AlreadyClosed,

    #[error("log flush task exited before acknowledging close")]
    FlushTaskGone,
}

/// Destination for one run's output
#[async_trait]
pub trait LiveLog: Send + Sync {
    /// Where the log can be read (URL or local marker)
    fn locator(&self) -> &str;

    /// Appends output; returns the number of bytes accepted
    fn write(&self, buf: &[u8]) -> usize;

    /// Flushes everything written so far and releases the sink
    ///
    /// Must be called once; later calls return [`SinkError::AlreadyClosed`].
    async fn close(&self) -> Result<(), SinkError>;
}

// =============================================================================
// Durable backend
// =============================================================================

/// Close request carrying the channel the final flush result is sent on
type CloseRequest = oneshot::Sender<Result<(), SinkError>>;

struct FlushHandle {
    stop: oneshot::Sender<CloseRequest>,
    task: JoinHandle<()>,
}

/// Storage object the buffer is mirrored to
struct ObjectTarget {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    object: String,
}

impl ObjectTarget {
    /// Uploads a snapshot of the buffer; the lock is released before the upload
    async fn flush(&self, buffer: &Mutex<Vec<u8>>) -> Result<usize, SinkError> {
        let snapshot = buffer.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let len = snapshot.len();
        self.store
            .put_object(&self.bucket, &self.object, snapshot)
            .await?;
        Ok(len)
    }
}

/// Log mirrored to a storage object
///
/// The object always holds the complete output so far; every flush
/// overwrites it.
pub struct DurableLog {
    locator: String,
    buffer: Arc<Mutex<Vec<u8>>>,
    flusher: Mutex<Option<FlushHandle>>,
}

impl DurableLog {
    /// Creates the (empty) object and starts the periodic flush task
    pub async fn open(
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        object: &str,
        flush_interval: Duration,
    ) -> Result<Self, SinkError> {
        store.put_object(bucket, object, Vec::new()).await?;

        let locator = store.public_url(bucket, object);
        let target = ObjectTarget {
            store,
            bucket: bucket.to_string(),
            object: object.to_string(),
        };
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(flush_loop(
            target,
            Arc::clone(&buffer),
            flush_interval,
            stop_rx,
        ));

        Ok(Self {
            locator,
            buffer,
            flusher: Mutex::new(Some(FlushHandle { stop, task })),
        })
    }
}

async fn flush_loop(
    target: ObjectTarget,
    buffer: Arc<Mutex<Vec<u8>>>,
    period: Duration,
    mut stop: oneshot::Receiver<CloseRequest>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut flushed = 0;

    loop {
        tokio::select! {
            request = &mut stop => {
                let result = target.flush(&buffer).await.map(|_| ());
                match request {
                    Ok(ack) => {
                        let _ = ack.send(result);
                    }
                    // Sink dropped without close
                    Err(_) => {
                        if let Err(e) = result {
                            warn!("Final write to {}/{} failed: {}", target.bucket, target.object, e);
                        }
                    }
                }
                return;
            }
            _ = ticker.tick() => {
                let pending = buffer.lock().unwrap_or_else(PoisonError::into_inner).len();
                if pending == flushed {
                    continue;
                }
                match target.flush(&buffer).await {
                    Ok(len) => flushed = len,
                    Err(e) => warn!("Write to {}/{} failed: {}", target.bucket, target.object, e),
                }
            }
        }
    }
}

#[async_trait]
impl LiveLog for DurableLog {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn write(&self, buf: &[u8]) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        buf.len()
    }

    async fn close(&self) -> Result<(), SinkError> {
        let handle = self
            .flusher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SinkError::AlreadyClosed)?;

        let (ack, ack_rx) = oneshot::channel();
        if handle.stop.send(ack).is_err() {
            return Err(SinkError::FlushTaskGone);
        }

        let result = ack_rx.await.map_err(|_| SinkError::FlushTaskGone)?;
        if let Err(e) = handle.task.await {
            warn!("Log flush task for {} ended abnormally: {}", self.locator, e);
        }

        debug!("Closed live log {}", self.locator);
        result
    }
}

// =============================================================================
// Console backend
// =============================================================================

struct ConsoleState<W> {
    out: W,
    at_line_start: bool,
}

/// Log written to a local stream, every line prefixed with the worker name
pub struct ConsoleLog<W: Write + Send = std::io::Stdout> {
    prefix: Vec<u8>,
    locator: String,
    state: Mutex<ConsoleState<W>>,
    closed: AtomicBool,
}

impl ConsoleLog {
    /// Console log on the process's standard output
    pub fn stdout(worker_name: &str) -> Self {
        Self::new(worker_name, std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleLog<W> {
    pub fn new(worker_name: &str, out: W) -> Self {
        Self {
            prefix: format!("{}: ", worker_name).into_bytes(),
            locator: format!("stdout:{}", worker_name),
            state: Mutex::new(ConsoleState {
                out,
                at_line_start: true,
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Consumes the log, returning the underlying stream
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}

#[async_trait]
impl<W: Write + Send> LiveLog for ConsoleLog<W> {
    fn locator(&self) -> &str {
        &self.locator
    }

    fn write(&self, buf: &[u8]) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut prefixed = Vec::with_capacity(buf.len() + self.prefix.len());
        for line in buf.split_inclusive(|b| *b == b'\n') {
            if state.at_line_start {
                prefixed.extend_from_slice(&self.prefix);
            }
            prefixed.extend_from_slice(line);
            state.at_line_start = line.ends_with(b"\n");
        }

        if let Err(e) = state.out.write_all(&prefixed) {
            warn!("Console write for {} failed: {}", self.locator, e);
        }
        buf.len()
    }

    async fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SinkError::AlreadyClosed);
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.at_line_start {
            let _ = state.out.write_all(b"\n");
            state.at_line_start = true;
        }
        if let Err(e) = state.out.flush() {
            warn!("Console flush for {} failed: {}", self.locator, e);
        }
        Ok(())
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Opens one sink per worker run
///
/// Runs log to storage when a bucket is configured and to the console
/// otherwise.
pub struct LogSinks {
    durable: Option<(Arc<dyn ObjectStore>, String)>,
    flush_interval: Duration,
}

impl LogSinks {
    /// Sinks writing to `bucket` through `store`
    pub fn durable(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, flush_interval: Duration) -> Self {
        Self {
            durable: Some((store, bucket.into())),
            flush_interval,
        }
    }

    /// Sinks writing to stdout
    pub fn console() -> Self {
        Self {
            durable: None,
            flush_interval: Duration::ZERO,
        }
    }

    /// Opens the sink for one run
    pub async fn open(
        &self,
        revision: &str,
        builder: &BuilderType,
        worker_name: &str,
    ) -> Result<Box<dyn LiveLog>, SinkError> {
        match &self.durable {
            Some((store, bucket)) => {
                let object = object_name(revision, builder);
                let log =
                    DurableLog::open(Arc::clone(store), bucket, &object, self.flush_interval)
                        .await?;
                Ok(Box::new(log))
            }
            None => Ok(Box::new(ConsoleLog::stdout(worker_name))),
        }
    }
}

/// Object name `{revision}-{random suffix}/{builder}`
///
/// The suffix keeps repeated runs of one revision from overwriting each
/// other's logs.
fn object_name(revision: &str, builder: &BuilderType) -> String {
    let id = uuid::Uuid::new_v4();
    let suffix: String = id.as_bytes()[..4]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}-{}/{}", revision, suffix, builder)
}
