//! Buildmill - sequential build orchestration
//!
//! This library models projects, their build/clean/deploy step lists, and a
//! build manager that runs queued steps one at a time in dependency order.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - The project model and the build queue (no process I/O)
//! - [`infra`] - Infrastructure layer (child processes)
//! - [`registry`] - Step factories, keyed by stable id
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;
pub mod registry;

#[cfg(test)]
pub mod test_utils;
