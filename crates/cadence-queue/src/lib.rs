//! Durable priority job queue backed by Redis: enqueue, worker loop,
//! retry/backoff, dead-letter handling, and a crash-recovery sweep.

pub mod job;
pub mod queue;

pub use job::{Job, JobPriority, JobStatus};
pub use queue::{JobHandler, QueueError, QueueStats, TaskQueue};
