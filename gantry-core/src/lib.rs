//! Gantry Core
//!
//! Core types shared by the Gantry runner crates.
//!
//! This crate contains:
//! - Domain types: the runner identity, jobs, steps, artifacts and outcomes
//! - DTOs: request/response bodies exchanged with the coordination server

pub mod domain;
pub mod dto;
