//! Shared fixtures and collaborator stubs for integration tests.
#![allow(dead_code)]

pub mod fixtures;
pub mod stubs;
