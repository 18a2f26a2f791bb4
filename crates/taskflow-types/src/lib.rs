//! Shared domain types for taskflow.
//!
//! This crate contains the plain data used across the engine: task state,
//! workflow metadata, job payloads, configuration, and error enums.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod job;
pub mod task;
pub mod workflow;
