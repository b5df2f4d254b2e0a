//! Scheduler layer for the runner
//!
//! Polls the coordination server on a fixed interval, dispatches each poll to
//! the lifecycle engine with bounded concurrency, and funnels the errors of
//! every run to a single consumer.

pub mod poller;
pub mod reporter;

pub use poller::JobPoller;
pub use reporter::{ERROR_QUEUE_CAPACITY, error_queue};
