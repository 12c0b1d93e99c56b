//! Repository layer
//!
//! Repositories are thin seams over the external services the dispatcher
//! depends on: the review system, the source archive server, durable
//! storage and the worker coordinator. They carry no business logic.
//!
//! All repositories are trait-based so services can be tested against
//! in-memory fakes.

mod review;
mod source;
mod storage;
mod workers;

// Re-export traits
pub use review::ReviewRepository;
pub use source::ArchiveSource;
pub use storage::ObjectStore;
pub use workers::{Worker, WorkerProvider};

// Re-export implementations
pub use review::GerritReviewRepository;
pub use source::HttpArchiveSource;
pub use storage::GcsObjectStore;
pub use workers::CoordinatorWorkerProvider;
