//! Background process wiring: assembles the shared stores and services,
//! runs the HTTP/WS surface, and drives the periodic queue-worker and
//! heartbeat loops described in §4.9.

pub mod daemon;
pub mod heartbeat;
pub mod scheduler;
