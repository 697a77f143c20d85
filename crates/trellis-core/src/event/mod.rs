//! Engine event distribution.
//!
//! The engine itself holds state in memory; persistence is the host's
//! concern. Hosts subscribe to the [`bus::EventBus`] to observe job status
//! transitions, step boundaries, and state changes.

pub mod bus;

pub use bus::EventBus;
