//! Executor registry for runtime tool lookup.
//!
//! A name-indexed registry of shared tool executors. Re-registering the
//! same executor under the same id is a no-op; replacing a different
//! executor is last-write-wins and is reported on the event bus.

use std::sync::Arc;

use dashmap::DashMap;

use crate::event::EventBus;

use super::executor::{FnExecutor, ToolError, ToolExecutor, ToolInvocation, ToolOutputs};

/// Registry of available tool executors, indexed by tool id.
pub struct ToolRegistry {
    executors: DashMap<String, Arc<dyn ToolExecutor>>,
    event_bus: EventBus,
}

impl ToolRegistry {
    /// Create an empty registry publishing replacement events on `event_bus`.
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            executors: DashMap::new(),
            event_bus,
        }
    }

    /// Register an executor under the given tool id.
    ///
    /// Registering the identical executor again is a no-op. Registering a
    /// different executor replaces the old one (last-write-wins) and emits
    /// an `ExecutorReplaced` event.
    pub fn register(&self, tool_id: impl Into<String>, executor: Arc<dyn ToolExecutor>) {
        let tool_id = tool_id.into();
        if let Some(existing) = self.executors.get(&tool_id) {
            if Arc::ptr_eq(existing.value(), &executor) {
                return;
            }
            tracing::warn!(
                tool_id = tool_id.as_str(),
                "replacing previously registered tool executor"
            );
            self.event_bus.executor_replaced(&tool_id);
        }
        self.executors.insert(tool_id, executor);
    }

    /// Register a plain function as an executor.
    pub fn register_fn<F>(&self, tool_id: impl Into<String>, f: F)
    where
        F: Fn(ToolInvocation) -> Result<ToolOutputs, ToolError> + Send + Sync + 'static,
    {
        self.register(tool_id, Arc::new(FnExecutor::new(f)));
    }

    /// Look up an executor by tool id.
    pub fn get(&self, tool_id: &str) -> Option<Arc<dyn ToolExecutor>> {
        self.executors.get(tool_id).map(|entry| entry.value().clone())
    }

    /// Whether an executor is registered for the tool id.
    pub fn contains(&self, tool_id: &str) -> bool {
        self.executors.contains_key(tool_id)
    }

    /// List all registered tool ids.
    pub fn list_ids(&self) -> Vec<String> {
        self.executors
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Execute the registered executor for a tool id.
    pub async fn execute(
        &self,
        tool_id: &str,
        invocation: ToolInvocation,
    ) -> Result<ToolOutputs, ToolError> {
        let executor = self
            .get(tool_id)
            .ok_or_else(|| ToolError::NoExecutor(tool_id.to_string()))?;
        executor.execute(invocation).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("executor_count", &self.executors.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
