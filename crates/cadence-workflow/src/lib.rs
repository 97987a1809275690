//! The four-stage workflow driver: product manager, architect, engineer,
//! QA engineer, run in sequence against a user's configured model clients.
//!
//! Execution-state transitions are driven by
//! [`cadence_core::types::ExecutionStateMachine`]; progress events are
//! emitted through the [`driver::EventSink`] trait so this crate never
//! has to depend on wherever the event bus lives.

pub mod driver;
pub mod prompts;
pub mod roles;

pub use driver::{EventSink, WorkflowDriver, WorkflowError};
