//! Engine event fan-out.
//!
//! The engine keeps jobs in memory and never writes them anywhere; a host
//! that wants durability subscribes here and persists what it observes.
//! Emission is fire-and-forget: a slow subscriber lags and loses the
//! oldest events rather than back-pressuring the run loop, and with no
//! subscribers at all the engine stays fully usable.
//!
//! Rather than exposing raw event construction, the bus offers one typed
//! emitter per transition point the engine actually has: job status
//! changes, step start/finish, state commits, and executor replacement.

use tokio::sync::broadcast;
use trellis_types::event::EngineEvent;
use trellis_types::job::JobStatus;
use uuid::Uuid;

/// Fan-out channel for [`EngineEvent`]s.
///
/// Cheap to clone; every clone feeds the same channel, so the registry
/// and the job engine can share one bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus whose channel buffers `capacity` events per
    /// subscriber before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Open a subscription. Only events emitted after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// A job moved between lifecycle states.
    pub fn job_status_changed(&self, job_id: Uuid, status: JobStatus) {
        self.emit(EngineEvent::JobStatusChanged { job_id, status });
    }

    /// A step is about to execute.
    pub fn step_started(&self, job_id: Uuid, step_id: Uuid, step_index: usize, label: &str) {
        self.emit(EngineEvent::StepStarted {
            job_id,
            step_id,
            step_index,
            label: label.to_string(),
        });
    }

    /// A step finished and its record was committed.
    pub fn step_completed(
        &self,
        job_id: Uuid,
        step_id: Uuid,
        step_index: usize,
        success: bool,
        duration_ms: u64,
    ) {
        self.emit(EngineEvent::StepCompleted {
            job_id,
            step_id,
            step_index,
            success,
            duration_ms,
        });
    }

    /// Job state was replaced after a step committed its outputs.
    pub fn state_changed(&self, job_id: Uuid, variable_count: usize) {
        self.emit(EngineEvent::StateChanged {
            job_id,
            variable_count,
        });
    }

    /// A registration replaced a different executor for the same tool id.
    pub fn executor_replaced(&self, tool_id: &str) {
        self.emit(EngineEvent::ExecutorReplaced {
            tool_id: tool_id.to_string(),
        });
    }

    // `send` errors only when nobody is subscribed, which is the normal
    // headless case, not a fault.
    fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn typed_emitters_produce_matching_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let job_id = Uuid::now_v7();
        let step_id = Uuid::now_v7();

        bus.job_status_changed(job_id, JobStatus::Running);
        bus.step_started(job_id, step_id, 0, "gather");
        bus.step_completed(job_id, step_id, 0, true, 12);
        bus.state_changed(job_id, 4);
        bus.executor_replaced("echo");

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::JobStatusChanged {
                status: JobStatus::Running,
                ..
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StepStarted { step_index: 0, ref label, .. } if label == "gather"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StepCompleted { success: true, duration_ms: 12, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::StateChanged { variable_count: 4, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ExecutorReplaced { ref tool_id } if tool_id == "echo"
        ));
    }

    #[tokio::test]
    async fn clones_feed_the_same_channel() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        let clone = bus.clone();
        clone.executor_replaced("search");

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineEvent::ExecutorReplaced { .. }
        ));
    }

    #[test]
    fn emitting_without_subscribers_is_silent() {
        let bus = EventBus::new(8);
        bus.job_status_changed(Uuid::now_v7(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new(8);
        bus.executor_replaced("before");

        let mut rx = bus.subscribe();
        bus.executor_replaced("after");

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            EngineEvent::ExecutorReplaced { ref tool_id } if tool_id == "after"
        ));
        assert!(rx.try_recv().is_err());
    }
}
