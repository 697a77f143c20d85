//! Job engine: drives a workflow's steps against a job record.
//!
//! - `engine` -- `JobEngine`: create, initialize, run, cancel, reset, get
//! - `accessors` -- input/output/state views for UI and host consumption
//!
//! The engine owns job values during a run; callers observe them through
//! `get_job` snapshots and the event bus.

pub mod accessors;
pub mod engine;

pub use engine::{EngineError, EngineOptions, JobEngine, ResetMode};
