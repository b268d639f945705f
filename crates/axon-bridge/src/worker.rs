//! Write worker
//!
//! Writes never run on the coordinating thread or on the caller. They are
//! queued to a worker task which calls the driver on the blocking pool,
//! retrying transient failures with exponential backoff. A write that
//! finally fails is reported through the coordinator as a
//! [`SessionEvent::WriteFailed`]. So is every write still queued when the
//! worker is told to stop.

use axon_core::{Driver, DriverError, HomeId, NodeId, StateValue, TreePath, ValueId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::coordinator::CoordinatorHandle;
use crate::events::SessionEvent;

/// Retry policy for driver writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, the first included
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Upper bound of any delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
            max_delay_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = (self.initial_delay_ms as f64
            * self
                .backoff_multiplier
                .powi(attempt.saturating_sub(1) as i32))
        .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay)
    }

    /// Whether a failure on attempt `attempt` (1-based) should be retried
    pub fn should_retry(&self, error: &DriverError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }
}

/// Driver call a write request performs
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    SetValue {
        value_id: ValueId,
        value: StateValue,
    },
    SetNodeLevel {
        home_id: HomeId,
        node_id: NodeId,
        level: u8,
    },
    SetConfigParam {
        home_id: HomeId,
        node_id: NodeId,
        param: u8,
        value: i32,
    },
}

impl WriteCommand {
    fn execute(&self, driver: &dyn Driver) -> Result<(), DriverError> {
        match self {
            Self::SetValue { value_id, value } => driver.set_value(*value_id, value.clone()),
            Self::SetNodeLevel {
                home_id,
                node_id,
                level,
            } => driver.set_node_level(*home_id, *node_id, *level),
            Self::SetConfigParam {
                home_id,
                node_id,
                param,
                value,
            } => driver.set_config_param(*home_id, *node_id, *param, *value),
        }
    }
}

/// A validated write waiting for the worker
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub id: Uuid,
    /// Path the write was addressed to
    pub path: TreePath,
    pub command: WriteCommand,
}

impl WriteRequest {
    pub fn new(path: TreePath, command: WriteCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            path,
            command,
        }
    }
}

/// Error reported for writes abandoned by a stopping worker
pub const SHUTDOWN_ERROR: &str = "bridge shutting down";

pub struct WriteWorker {
    driver: Arc<dyn Driver>,
    policy: RetryPolicy,
    coordinator: CoordinatorHandle,
    permits: Arc<Semaphore>,
    max_concurrent: u32,
}

impl WriteWorker {
    /// Create a worker running up to `max_concurrent` driver writes at once
    pub fn new(
        driver: Arc<dyn Driver>,
        policy: RetryPolicy,
        coordinator: CoordinatorHandle,
        max_concurrent: usize,
    ) -> Self {
        let max_concurrent = u32::try_from(max_concurrent.max(1)).unwrap_or(u32::MAX);
        Self {
            driver,
            policy,
            coordinator,
            permits: Arc::new(Semaphore::new(max_concurrent as usize)),
            max_concurrent,
        }
    }

    /// Run the worker until `stop` fires or every sender of the queue is dropped
    ///
    /// On stop the queue is closed, so later writes are refused. Writes
    /// already queued are reported as failed without reaching the driver,
    /// and the task ends once the writes in flight have finished.
    pub fn spawn(
        self,
        mut queue: mpsc::Receiver<WriteRequest>,
        mut stop: oneshot::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let permit = tokio::select! {
                    _ = &mut stop => break,
                    permit = self.permits.clone().acquire_owned() => permit,
                };
                let Ok(permit) = permit else {
                    break;
                };
                let request = tokio::select! {
                    _ = &mut stop => break,
                    request = queue.recv() => request,
                };
                let Some(request) = request else {
                    break;
                };

                let driver = self.driver.clone();
                let policy = self.policy.clone();
                let coordinator = self.coordinator.clone();
                tokio::spawn(async move {
                    execute(driver, policy, coordinator, request).await;
                    drop(permit);
                });
            }

            queue.close();
            while let Some(request) = queue.recv().await {
                warn!(request_id = %request.id, path = %request.path, "Queued write abandoned");
                report_failure(&self.coordinator, &request, SHUTDOWN_ERROR.to_string(), 0).await;
            }

            if let Ok(permits) = self.permits.acquire_many(self.max_concurrent).await {
                permits.forget();
            }
            debug!("Write worker stopped");
        })
    }
}

async fn report_failure(
    coordinator: &CoordinatorHandle,
    request: &WriteRequest,
    error: String,
    attempts: u32,
) {
    let event = SessionEvent::WriteFailed {
        request_id: request.id,
        path: request.path.clone(),
        error,
        attempts,
        failed_at: chrono::Utc::now(),
    };
    if coordinator.emit(event).await.is_err() {
        debug!(request_id = %request.id, "Coordinator stopped, failure not reported");
    }
}

/// Perform one write, retrying per the policy and reporting final failure
async fn execute(
    driver: Arc<dyn Driver>,
    policy: RetryPolicy,
    coordinator: CoordinatorHandle,
    request: WriteRequest,
) {
    let mut attempt = 1;
    loop {
        let call_driver = driver.clone();
        let command = request.command.clone();
        let result = tokio::task::spawn_blocking(move || command.execute(call_driver.as_ref()))
            .await
            .unwrap_or_else(|e| Err(DriverError::Rejected(format!("write task failed: {}", e))));

        match result {
            Ok(()) => {
                debug!(request_id = %request.id, path = %request.path, attempt, "Write completed");
                return;
            }
            Err(e) if policy.should_retry(&e, attempt) => {
                let delay = policy.delay_for_attempt(attempt);
                debug!(
                    request_id = %request.id,
                    path = %request.path,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Write failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(request_id = %request.id, path = %request.path, attempt, error = %e, "Write failed");
                report_failure(&coordinator, &request, e.to_string(), attempt).await;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_millis(5000));
    }

    #[test]
    fn test_only_transient_errors_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&DriverError::Busy, 1));
        assert!(policy.should_retry(&DriverError::Timeout, 2));
        assert!(!policy.should_retry(&DriverError::Busy, 3));
        assert!(!policy.should_retry(&DriverError::UnknownValue(ValueId(1)), 1));
    }

    #[test]
    fn test_policy_defaults_missing_fields() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay_ms, 200);
    }
}
