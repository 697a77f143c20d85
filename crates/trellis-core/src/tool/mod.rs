//! Tool registry and dispatcher: pluggable external capabilities.
//!
//! - `executor` -- The `ToolExecutor` contract and invocation types
//! - `registry` -- Name-indexed executor registry with replacement reporting
//! - `dispatcher` -- Parameter adaptation (LLM partitioning) and output coercion
//! - `builtin` -- Placeholder reference tools (`echo`, `concatenate`, ...)

pub mod builtin;
pub mod dispatcher;
pub mod executor;
pub mod registry;

pub use dispatcher::ToolDispatcher;
pub use executor::{LlmInvocation, ToolError, ToolExecutor, ToolInvocation, ToolOutputs};
pub use registry::ToolRegistry;
