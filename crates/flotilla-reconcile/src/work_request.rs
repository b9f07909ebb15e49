//! Work-request completion polling.
//!
//! Backend-set updates are asynchronous on the provider side; the
//! returned work request is polled until it reaches a terminal state.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use flotilla_provider::types::WorkRequestStatus;
use flotilla_provider::CloudProvider;

use crate::error::{ReconcileError, ReconcileResult};
use crate::task::TaskSink;

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll `work_request_id` until the provider reports it Succeeded or
/// Failed, giving up after [`POLL_TIMEOUT`] without a terminal state.
pub async fn poll(
    provider: &dyn CloudProvider,
    task: &dyn TaskSink,
    phase: &str,
    work_request_id: &str,
) -> ReconcileResult<()> {
    let deadline = Instant::now() + POLL_TIMEOUT;
    loop {
        let request = provider.get_work_request(work_request_id).await?;
        match request.status {
            WorkRequestStatus::Succeeded => {
                task.update_status(phase, &format!("Work request {work_request_id} succeeded"));
                return Ok(());
            }
            WorkRequestStatus::Failed => {
                task.update_status(phase, &format!("Work request {work_request_id} failed"));
                return Err(ReconcileError::WorkRequestFailed {
                    id: work_request_id.to_string(),
                });
            }
            WorkRequestStatus::Accepted | WorkRequestStatus::InProgress => {
                if Instant::now() >= deadline {
                    task.update_status(
                        phase,
                        &format!("Timed out waiting for work request {work_request_id}"),
                    );
                    return Err(ReconcileError::WorkRequestTimedOut {
                        id: work_request_id.to_string(),
                    });
                }
                debug!(id = %work_request_id, status = ?request.status, "work request pending");
                sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_provider::mock::MockCloud;

    use crate::task::{phase, RecordingTask};

    #[tokio::test(start_paused = true)]
    async fn waits_through_pending_states() {
        let cloud = MockCloud::new();
        cloud.script_work_requests(vec![
            WorkRequestStatus::Accepted,
            WorkRequestStatus::InProgress,
            WorkRequestStatus::Succeeded,
        ]);
        let task = RecordingTask::new();

        poll(&cloud, &task, phase::UPDATE_LB, "ocid.workrequest.1")
            .await
            .unwrap();

        let messages = task.messages_for(phase::UPDATE_LB);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("succeeded"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_request_is_an_error() {
        let cloud = MockCloud::new();
        cloud.script_work_requests(vec![
            WorkRequestStatus::InProgress,
            WorkRequestStatus::Failed,
        ]);
        let task = RecordingTask::new();

        let result = poll(&cloud, &task, phase::UPDATE_LB, "ocid.workrequest.9").await;

        assert!(matches!(
            result,
            Err(ReconcileError::WorkRequestFailed { ref id }) if id == "ocid.workrequest.9"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_on_a_request_that_never_completes() {
        let cloud = MockCloud::new();
        cloud.script_work_requests(vec![WorkRequestStatus::InProgress]);
        let task = RecordingTask::new();

        let result = poll(&cloud, &task, phase::UPDATE_LB, "ocid.workrequest.2").await;

        assert!(matches!(
            result,
            Err(ReconcileError::WorkRequestTimedOut { ref id }) if id == "ocid.workrequest.2"
        ));
        let messages = task.messages_for(phase::UPDATE_LB);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("Timed out"));
    }
}
