//! Scheduler layer for the dispatcher
//!
//! This layer decides what gets tested: either the changes the review
//! server reports as waiting for trybots (poll mode) or a single explicit
//! revision (one-shot mode).

pub mod poller;

pub use poller::ChangePoller;
