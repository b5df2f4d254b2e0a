//! Data Transfer Objects for the coordination server API
//!
//! Request bodies sent by the runner. Response bodies that are also domain
//! entities (the job payload) live in [`crate::domain`].

pub mod job;
pub mod runner;
