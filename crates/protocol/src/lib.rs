//! # ram-protocol
//!
//! Shared data models for the RAM analysis orchestrator.
//!
//! This crate defines all structures shared between the orchestration core
//! and its callers:
//! - Persisted operation records and their lifecycle status
//! - Project, scenario, and stored-file models read from the record store
//! - The job-key identity used by the process registry
//! - Progress events streamed from the core to a caller
//!
//! ## Modules
//!
//! - [`operation_models`]: Operation records, status machine, log entries
//! - [`scenario_models`]: Project, scenario, and stored-file models
//! - [`job_models`]: Job-key identity for registry and container naming
//! - [`ipc`]: Events streamed from the core to a caller
//!
//! ## Design Principles
//!
//! - Minimal dependencies: only serde, serde_json, uuid, and chrono
//! - Independent compilation: no dependencies on other workspace crates

pub mod ipc;
pub mod job_models;
pub mod operation_models;
pub mod scenario_models;

// Re-export all public types for convenience
pub use ipc::*;
pub use job_models::*;
pub use operation_models::*;
pub use scenario_models::*;
