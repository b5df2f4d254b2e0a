//! Service layer
//!
//! The job lifecycle: trace streaming, artifact collection and the engine
//! driving a job from request to terminal report.

mod artifacts;
mod error;
mod lifecycle;
mod trace;

pub use error::LifecycleError;
pub use lifecycle::{CycleOutcome, LifecycleEngine};
