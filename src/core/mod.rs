//! Core build-orchestration model
//!
//! This module contains the project model and the build queue. The only
//! process I/O lives in [`crate::infra`]; everything here reports to the
//! outside world through the [`events`] channel.
//!
//! # Submodules
//!
//! - [`params`] - Resolved command lines for one process invocation
//! - [`environment`] - Environment snapshots and ordered change lists
//! - [`expand`] - `%{...}` macro expansion
//! - [`step`] - The build step abstraction and its lifecycle
//! - [`process_step`] - The step that runs an external command
//! - [`steplist`] - Ordered, named lists of steps
//! - [`configuration`] - Build, deploy and run configurations
//! - [`target`] - A project built for one kit
//! - [`project`] - A project and its targets
//! - [`workspace`] - The open projects and their dependency graph
//! - [`graph`] - Dependency bookkeeping with cycle detection
//! - [`manager`] - The serialized build queue
//! - [`pipeline`] - Pipeline file (buildmill.toml) parsing
//! - [`store`] - Settings-map persistence for the model
//! - [`events`] - Typed engine notifications
//! - [`task`] - Diagnostics and output event types
//! - [`ids`] - Stable identities for model objects

pub mod configuration;
pub mod environment;
pub mod events;
pub mod expand;
pub mod graph;
pub mod ids;
pub mod manager;
pub mod params;
pub mod pipeline;
pub mod process_step;
pub mod project;
pub mod step;
pub mod steplist;
pub mod store;
pub mod target;
pub mod task;
pub mod workspace;
