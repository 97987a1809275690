//! Queue worker loop: repeatedly pulls a batch of jobs off the durable
//! queue, dispatches `run_execution` jobs into the workflow driver, and
//! periodically sweeps jobs a crashed worker left claimed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cadence_queue::{Job, JobHandler, TaskQueue};
use cadence_workflow::WorkflowDriver;
use tracing::{error, warn};
use uuid::Uuid;

/// Runs `run_execution` jobs by handing the execution id to the
/// workflow driver and waiting for the run to finish.
struct RunExecutionHandler {
    driver: Arc<WorkflowDriver>,
}

#[async_trait]
impl JobHandler for RunExecutionHandler {
    fn job_type(&self) -> &str {
        cadence_bridge::router::RUN_EXECUTION_JOB
    }

    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String> {
        let execution_id: Uuid = job
            .payload
            .get("execution_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| "job payload missing execution_id".to_string())?;

        self.driver
            .run(execution_id)
            .await
            .map_err(|e| e.to_string())?;

        Ok(serde_json::json!({ "execution_id": execution_id }))
    }
}

/// Runs until `shutdown` resolves. Each iteration pulls up to
/// `batch_size` jobs; an empty batch backs off briefly rather than
/// hot-looping against an idle queue. Every `sweep_every`th empty
/// iteration also runs a crash-recovery sweep.
pub async fn run(
    queue: Arc<TaskQueue>,
    driver: Arc<WorkflowDriver>,
    batch_size: i64,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    use tokio::sync::broadcast::error::TryRecvError;

    let handlers: Vec<Arc<dyn JobHandler>> = vec![Arc::new(RunExecutionHandler { driver })];
    let mut empty_ticks: u32 = 0;
    const SWEEP_EVERY_EMPTY_TICKS: u32 = 10;

    loop {
        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            break;
        }

        let processed = tokio::select! {
            result = queue.run_batch(batch_size, &handlers) => result,
            _ = shutdown.recv() => break,
        };

        match processed {
            Ok(0) => {
                empty_ticks += 1;
                if empty_ticks >= SWEEP_EVERY_EMPTY_TICKS {
                    empty_ticks = 0;
                    if let Ok(recovered) = queue.recovery_sweep().await {
                        if recovered > 0 {
                            warn!(recovered, "recovered orphaned jobs from processing set");
                        }
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                    _ = shutdown.recv() => break,
                }
            }
            Ok(_) => {
                empty_ticks = 0;
            }
            Err(e) => {
                error!(error = %e, "queue batch failed");
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = shutdown.recv() => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::store::Store;
    use cadence_intelligence::registry::ClientRegistry;
    use cadence_workflow::driver::NullEventSink;

    async fn handler() -> RunExecutionHandler {
        let store = Arc::new(Store::new_in_memory().await.unwrap());
        let registry = Arc::new(ClientRegistry::with_builtin_providers());
        let driver = Arc::new(WorkflowDriver::new(store, registry, Arc::new(NullEventSink)));
        RunExecutionHandler { driver }
    }

    #[tokio::test]
    async fn job_type_matches_router_constant() {
        assert_eq!(
            handler().await.job_type(),
            cadence_bridge::router::RUN_EXECUTION_JOB
        );
    }

    #[tokio::test]
    async fn handle_rejects_payload_missing_execution_id() {
        let job = Job::new(
            cadence_bridge::router::RUN_EXECUTION_JOB,
            serde_json::json!({}),
            cadence_queue::JobPriority::Normal,
        );
        let err = handler().await.handle(&job).await.unwrap_err();
        assert!(err.contains("execution_id"));
    }

    #[tokio::test]
    async fn handle_rejects_non_uuid_execution_id() {
        let job = Job::new(
            cadence_bridge::router::RUN_EXECUTION_JOB,
            serde_json::json!({ "execution_id": "not-a-uuid" }),
            cadence_queue::JobPriority::Normal,
        );
        let err = handler().await.handle(&job).await.unwrap_err();
        assert!(err.contains("execution_id"));
    }
}
