//! The bridge layer: everything that turns a [`cadence_workflow::WorkflowDriver`]
//! run into something a client can watch and drive.
//!
//! Key modules:
//! - [`registry`] — Connection Registry (C3): who's connected, how to reach them
//! - [`event_bus`] — Event Bus (C4): buffered, filtered, priority-ordered fan-out
//! - [`protocol`] — the closed client command set and response envelope
//! - [`router`] — Message Router (C8): dispatches a command, never disconnects on failure
//! - [`http_api`] — the thin axum HTTP/WS surface described in §6
//! - [`api_error`] — maps [`cadence_core::error::CoreError`] to HTTP responses
//! - [`rate_limit_middleware`] — per-client-IP admission control
//! - [`origin_validation`] — websocket Origin allow-list check
//! - [`workspace`] — per-project sandboxed filesystem helper

pub mod api_error;
pub mod event_bus;
pub mod http_api;
pub mod origin_validation;
pub mod protocol;
pub mod rate_limit_middleware;
pub mod registry;
pub mod router;
pub mod workspace;
