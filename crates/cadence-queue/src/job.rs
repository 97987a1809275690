//! The `Job` record and its lifecycle, serialized as `job:{id}` in the
//! backing store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
    Retrying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low = 1,
    Normal = 5,
    High = 10,
    Critical = 20,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub tags: Vec<String>,
}

impl Job {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value, priority: JobPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: job_type.into(),
            payload,
            status: JobStatus::Pending,
            priority,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries: 3,
            timeout_seconds: 3600,
            tags: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    pub fn mark_cancelled(&mut self) {
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_timeout(&mut self) {
        self.status = JobStatus::Timeout;
        self.completed_at = Some(Utc::now());
        self.error = Some(format!("job timed out after {}s", self.timeout_seconds));
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Bump the retry counter and move to `retrying`; the caller
    /// re-enqueues after the backoff computed by
    /// [`crate::queue::retry_backoff`].
    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
        self.status = JobStatus::Retrying;
        self.error = None;
    }

    /// Orphan detection for the recovery sweep: a job still marked
    /// `running` whose `started_at` predates its own timeout window.
    pub fn is_orphaned(&self) -> bool {
        match (self.status, self.started_at) {
            (JobStatus::Running, Some(started_at)) => {
                let elapsed = Utc::now() - started_at;
                elapsed.num_seconds() as u64 > self.timeout_seconds
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_clears_previous_error() {
        let mut job = Job::new("build", serde_json::json!({}), JobPriority::Normal);
        job.mark_failed("boom");
        assert!(job.error.is_some());
        job.increment_retry();
        assert!(job.error.is_none());
        assert_eq!(job.status, JobStatus::Retrying);
    }

    #[test]
    fn can_retry_respects_max_retries() {
        let mut job = Job::new("build", serde_json::json!({}), JobPriority::Normal).with_max_retries(1);
        assert!(job.can_retry());
        job.increment_retry();
        assert!(!job.can_retry());
    }

    #[test]
    fn running_past_timeout_is_orphaned() {
        let mut job = Job::new("build", serde_json::json!({}), JobPriority::Normal).with_timeout_seconds(0);
        job.mark_running();
        job.started_at = Some(Utc::now() - chrono::Duration::seconds(5));
        assert!(job.is_orphaned());
    }

    #[test]
    fn pending_job_is_never_orphaned() {
        let job = Job::new("build", serde_json::json!({}), JobPriority::Normal);
        assert!(!job.is_orphaned());
    }
}
