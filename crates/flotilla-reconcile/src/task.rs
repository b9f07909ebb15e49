//! Task status reporting.
//!
//! Long-running operations narrate their progress through a `TaskSink`
//! passed explicitly into every controller call. Production code uses
//! [`TracingTask`]; tests capture statuses with [`RecordingTask`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{error, info};

/// Operation phase tags reported through the sink.
pub mod phase {
    pub const DEPLOY: &str = "DEPLOY_SERVER_GROUP";
    pub const DESTROY: &str = "DESTROY_SERVER_GROUP";
    pub const RESIZE: &str = "RESIZE_SERVER_GROUP";
    pub const DISABLE: &str = "DISABLE_SERVER_GROUP";
    pub const ENABLE: &str = "ENABLE_SERVER_GROUP";
    pub const UPDATE_LB: &str = "UpdateLoadBalancer";
}

/// Receiver for operation progress.
pub trait TaskSink: Send + Sync {
    /// Report a human-readable status line for the given phase.
    fn update_status(&self, phase: &str, message: &str);

    /// Mark the overall operation as failed.
    fn fail(&self);
}

/// Forwards statuses to `tracing`.
#[derive(Debug, Default)]
pub struct TracingTask;

impl TaskSink for TracingTask {
    fn update_status(&self, phase: &str, message: &str) {
        info!(phase, "{message}");
    }

    fn fail(&self) {
        error!("task failed");
    }
}

/// Captures statuses in memory for assertions.
#[derive(Debug, Default)]
pub struct RecordingTask {
    statuses: Mutex<Vec<(String, String)>>,
    failed: AtomicBool,
}

impl RecordingTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(phase, message)` pairs in report order.
    pub fn statuses(&self) -> Vec<(String, String)> {
        self.statuses.lock().unwrap().clone()
    }

    /// Messages reported under one phase.
    pub fn messages_for(&self, phase: &str) -> Vec<String> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == phase)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

impl TaskSink for RecordingTask {
    fn update_status(&self, phase: &str, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push((phase.to_string(), message.to_string()));
    }

    fn fail(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_task_captures_in_order() {
        let task = RecordingTask::new();
        task.update_status(phase::DEPLOY, "first");
        task.update_status(phase::RESIZE, "second");
        task.update_status(phase::DEPLOY, "third");

        assert_eq!(task.statuses().len(), 3);
        assert_eq!(
            task.messages_for(phase::DEPLOY),
            vec!["first".to_string(), "third".to_string()]
        );
        assert!(!task.has_failed());

        task.fail();
        assert!(task.has_failed());
    }
}
