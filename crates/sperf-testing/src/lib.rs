//! Testing infrastructure for sperf integration tests.
//!
//! This crate provides utilities for writing integration tests:
//! - `TestBundle`: Fluent interface for building diagnostic bundles on disk
//! - `fixtures`: Generators for log lines, metrics rows and iostat blocks
//! - `assertions`: Checks against the JSON report

pub mod assertions;
pub mod fixtures;
pub mod world;

pub use world::{CliResult, TestBundle};
