//! Core domain types
//!
//! These types describe what the coordination server hands out (jobs) and
//! who is asking for them (the runner identity). They are read-only for the
//! lifetime of a lifecycle run.

pub mod job;
pub mod runner;
