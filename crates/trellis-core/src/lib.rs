//! Core engine logic for the Trellis workflow engine.
//!
//! Trellis runs an ordered sequence of user-defined steps against a shared
//! variable store, with conditional branching, bounded jump-back loops,
//! and pluggable tool executors. This crate is a headless library: no CLI,
//! no files, no sockets. Hosts own storage (via the event bus) and
//! concurrency policy; the engine owns step semantics and job lifecycle.
//!
//! Module map:
//! - `schema` -- structural validation, defaults, inference, compatibility
//! - `path` -- the dotted variable-path resolver
//! - `tool` -- executor contract, registry, dispatcher, reference tools
//! - `workflow` -- pure step semantics (binding, evaluation, execution)
//! - `job` -- the job engine: lifecycle, run loop, accessors
//! - `event` -- broadcast bus for persistence hooks

pub mod event;
pub mod job;
pub mod path;
pub mod schema;
pub mod tool;
pub mod workflow;
