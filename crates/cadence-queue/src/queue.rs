//! Durable priority queue on top of Redis sorted-set/list primitives.
//!
//! Layout: `job:{id}` (serialized [`Job`], 24h TTL after it reaches a
//! terminal status), `queue` (sorted set, score = `-priority` so a
//! min-score pop yields the highest-priority job), `processing` (set of
//! ids currently claimed by a worker), `dlq` (list of failure records).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::job::{Job, JobPriority, JobStatus};

const JOB_TTL_SECONDS: i64 = 86_400;
const QUEUE_KEY: &str = "queue";
const PROCESSING_KEY: &str = "processing";
const DLQ_KEY: &str = "dlq";

fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue store error: {0}")]
    Store(String),
    #[error("job {0} not found")]
    NotFound(Uuid),
}

impl From<fred::error::Error> for QueueError {
    fn from(e: fred::error::Error) -> Self {
        QueueError::Store(e.to_string())
    }
}

/// Implemented once per `job_type`; the worker loop dispatches to the
/// handler matching the job it dequeues.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &str;
    async fn handle(&self, job: &Job) -> Result<serde_json::Value, String>;
}

pub struct TaskQueue {
    client: Client,
}

impl TaskQueue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let config = Config::from_url(redis_url).map_err(|e| QueueError::Store(e.to_string()))?;
        let client = Builder::from_config(config)
            .build()
            .map_err(|e| QueueError::Store(e.to_string()))?;
        client.init().await.map_err(|e| QueueError::Store(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn enqueue(&self, job: Job) -> Result<Uuid, QueueError> {
        let id = job.id;
        self.save_job(&job).await?;
        self.client
            .zadd::<i64, _, _>(QUEUE_KEY, None, None, false, false, (score_for(job.priority), id.to_string()))
            .await?;
        info!(job_id = %id, job_type = %job.job_type, priority = ?job.priority, "enqueued job");
        Ok(id)
    }

    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let raw: Option<String> = self.client.get(job_key(id)).await?;
        Ok(match raw {
            Some(s) => Some(serde_json::from_str(&s).map_err(|e| QueueError::Store(e.to_string()))?),
            None => None,
        })
    }

    async fn save_job(&self, job: &Job) -> Result<(), QueueError> {
        let body = serde_json::to_string(job).map_err(|e| QueueError::Store(e.to_string()))?;
        self.client
            .set::<(), _, _>(job_key(job.id), body, Some(Expiration::EX(JOB_TTL_SECONDS)), None, false)
            .await?;
        Ok(())
    }

    /// Removes a still-pending job from `queue`. Returns `false` if the
    /// job has already been claimed by a worker (or doesn't exist) —
    /// cancellation past that point is advisory only.
    pub async fn cancel(&self, id: Uuid) -> Result<bool, QueueError> {
        let removed: i64 = self.client.zrem(QUEUE_KEY, id.to_string()).await?;
        if removed == 0 {
            return Ok(false);
        }
        if let Some(mut job) = self.get_job(id).await? {
            job.mark_cancelled();
            self.save_job(&job).await?;
        }
        Ok(true)
    }

    async fn dead_letter(&self, job: &Job) -> Result<(), QueueError> {
        let entry = serde_json::json!({
            "job_id": job.id,
            "job_type": job.job_type,
            "error": job.error,
            "failed_at": chrono::Utc::now(),
            "retry_count": job.retry_count,
        });
        self.client
            .lpush::<i64, _, _>(DLQ_KEY, entry.to_string())
            .await?;
        warn!(job_id = %job.id, "job moved to dead letter queue");
        Ok(())
    }

    pub async fn dead_letter_entries(&self, limit: i64) -> Result<Vec<serde_json::Value>, QueueError> {
        let raw: Vec<String> = self.client.lrange(DLQ_KEY, 0, limit - 1).await?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(|e| QueueError::Store(e.to_string())))
            .collect()
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let pending: i64 = self.client.zcard(QUEUE_KEY).await?;
        let processing: i64 = self.client.scard(PROCESSING_KEY).await?;
        let dlq: i64 = self.client.llen(DLQ_KEY).await?;
        Ok(QueueStats {
            pending,
            processing,
            dead_letter: dlq,
        })
    }

    /// One iteration of the worker loop: pop up to `batch_size` ids off
    /// the low-score end of `queue`, claim each into `processing`, run
    /// its handler, and resolve retry/DLQ/completion. Returns the number
    /// of jobs it processed so the caller can decide whether to sleep.
    pub async fn run_batch(
        &self,
        batch_size: i64,
        handlers: &[Arc<dyn JobHandler>],
    ) -> Result<usize, QueueError> {
        let ids: Vec<String> = self.client.zrange(QUEUE_KEY, 0, batch_size - 1, None, false, None, false).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        for raw_id in &ids {
            let _: i64 = self.client.zrem(QUEUE_KEY, raw_id.clone()).await?;
            let _: i64 = self.client.sadd(PROCESSING_KEY, raw_id.clone()).await?;

            let id = match Uuid::parse_str(raw_id) {
                Ok(id) => id,
                Err(_) => {
                    let _: i64 = self.client.srem(PROCESSING_KEY, raw_id.clone()).await?;
                    continue;
                }
            };

            if let Err(e) = self.process_one(id, handlers).await {
                error!(job_id = %id, error = %e, "error processing job");
            }
            let _: i64 = self.client.srem(PROCESSING_KEY, raw_id.clone()).await?;
        }

        Ok(ids.len())
    }

    async fn process_one(&self, id: Uuid, handlers: &[Arc<dyn JobHandler>]) -> Result<(), QueueError> {
        let Some(mut job) = self.get_job(id).await? else {
            return Err(QueueError::NotFound(id));
        };

        let handler = handlers.iter().find(|h| h.job_type() == job.job_type);
        let Some(handler) = handler else {
            job.mark_failed(format!("no handler registered for job type: {}", job.job_type));
            self.save_job(&job).await?;
            self.dead_letter(&job).await?;
            return Ok(());
        };

        job.mark_running();
        self.save_job(&job).await?;

        let timeout = Duration::from_secs(job.timeout_seconds);
        match tokio::time::timeout(timeout, handler.handle(&job)).await {
            Ok(Ok(result)) => {
                job.mark_completed(result);
                self.save_job(&job).await?;
            }
            Ok(Err(message)) => self.resolve_failure(&mut job, message).await?,
            Err(_elapsed) => {
                job.mark_timeout();
                let message = job.error.clone().unwrap_or_default();
                self.resolve_failure(&mut job, message).await?;
            }
        }
        Ok(())
    }

    async fn resolve_failure(&self, job: &mut Job, message: String) -> Result<(), QueueError> {
        if job.can_retry() {
            job.increment_retry();
            self.save_job(job).await?;
            let backoff = retry_backoff(job.retry_count);
            info!(job_id = %job.id, retry = job.retry_count, backoff_secs = backoff.as_secs(), "retrying job after backoff");
            tokio::time::sleep(backoff).await;
            self.client
                .zadd::<i64, _, _>(QUEUE_KEY, None, None, false, false, (score_for(job.priority), job.id.to_string()))
                .await?;
        } else {
            job.mark_failed(message);
            self.save_job(job).await?;
            self.dead_letter(job).await?;
        }
        Ok(())
    }

    /// Periodic sweep for jobs a crashed worker left in `processing`
    /// with no corresponding terminal status. Routed through the same
    /// retry/DLQ decision as an ordinary timeout.
    pub async fn recovery_sweep(&self) -> Result<usize, QueueError> {
        let ids: Vec<String> = self.client.smembers(PROCESSING_KEY).await?;
        let mut recovered = 0;

        for raw_id in ids {
            let Ok(id) = Uuid::parse_str(&raw_id) else {
                continue;
            };
            let Some(mut job) = self.get_job(id).await? else {
                let _: i64 = self.client.srem(PROCESSING_KEY, raw_id.clone()).await?;
                continue;
            };
            if !job.is_orphaned() {
                continue;
            }

            job.mark_timeout();
            let message = job.error.clone().unwrap_or_default();
            self.resolve_failure(&mut job, message).await?;
            let _: i64 = self.client.srem(PROCESSING_KEY, raw_id).await?;
            recovered += 1;
        }

        Ok(recovered)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub dead_letter: i64,
}

fn score_for(priority: JobPriority) -> f64 {
    -(priority as i32 as f64)
}

/// `min(2^retry_count * 60, 3600)` seconds, capped at one hour.
pub fn retry_backoff(retry_count: u32) -> Duration {
    let seconds = 2u64.saturating_pow(retry_count).saturating_mul(60).min(3600);
    Duration::from_secs(seconds)
}

/// Convenience for matching `job.status` after `run_batch`/tests without
/// reaching into the store again.
pub fn is_terminal(status: JobStatus) -> bool {
    matches!(
        status,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps_at_one_hour() {
        assert_eq!(retry_backoff(0), Duration::from_secs(60));
        assert_eq!(retry_backoff(1), Duration::from_secs(120));
        assert_eq!(retry_backoff(2), Duration::from_secs(240));
        assert_eq!(retry_backoff(10), Duration::from_secs(3600));
    }

    #[test]
    fn score_negates_priority_for_min_score_pop() {
        assert!(score_for(JobPriority::Critical) < score_for(JobPriority::Low));
    }

    #[test]
    fn terminal_statuses() {
        assert!(is_terminal(JobStatus::Completed));
        assert!(is_terminal(JobStatus::Failed));
        assert!(is_terminal(JobStatus::Cancelled));
        assert!(!is_terminal(JobStatus::Running));
        assert!(!is_terminal(JobStatus::Retrying));
    }
}
