//! Core library for cadence — foundational types, configuration, and
//! persistence.
//!
//! - Runtime data model shared by every other crate (`types`)
//! - The error-kind taxonomy consulted at the HTTP/WS boundary (`error`)
//! - TOML configuration loading (`config`)
//! - A SQLite-backed store for users/projects/executions/agent configs (`store`)

pub mod config;
pub mod error;
pub mod store;
pub mod types;
