//! # ram-core
//!
//! Orchestration core for long-running, externally-executed analysis jobs.
//!
//! A job is tied to a `(project, scenario)` pair. The core tracks its
//! lifecycle in a persisted operation log, prevents concurrent duplicate
//! runs per identity, optionally regenerates dependent artifacts (road
//! network export, vector tiles) before the main run, supervises the
//! out-of-process analysis container, and supports cooperative
//! cancellation.
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration for the container service
//! - [`error`]: the orchestration error taxonomy
//! - [`ops`]: the persisted operation lifecycle state machine
//! - [`registry`]: in-memory map from job key to active stage handles
//! - [`stages`]: the three sequential, cancellable sub-stages
//! - [`orchestrator`]: admission control, sequencing, and abort
//! - [`store`]: collaborator seams for the record and blob stores

pub mod config;
pub mod error;
pub mod ops;
pub mod orchestrator;
pub mod registry;
pub mod stages;
pub mod store;
