//! Service layer
//!
//! Services contain the business logic of the dispatcher. They orchestrate
//! operations using repositories: fetching and validating archives,
//! streaming live logs, driving workers through a test run, fanning runs
//! out across builders and reporting the outcome on the change.

mod archive;
mod dispatch;
mod log_sink;
mod report;
mod worker_run;

// Re-export traits
pub use log_sink::LiveLog;

// Re-export implementations
pub use archive::ArchiveFetcher;
pub use dispatch::Dispatcher;
pub use log_sink::LogSinks;
pub use report::{RESULT_LABEL, Report, Reporter};
pub use worker_run::{StageTimeouts, TestRunner};
