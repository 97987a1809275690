//! Shared application state for every HTTP and websocket handler.

use std::sync::Arc;

use cadence_auth::blacklist::Blacklist;
use cadence_auth::token::TokenAuthority;
use cadence_core::store::Store;
use cadence_harness::rate_limiter::RateLimiter;
use cadence_intelligence::registry::ClientRegistry;
use cadence_queue::TaskQueue;
use cadence_workflow::WorkflowDriver;

use crate::event_bus::EventBus;
use crate::registry::ConnectionRegistry;
use crate::router::Router;

#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<Store>,
    pub token_authority: TokenAuthority,
    pub blacklist: Arc<Blacklist>,
    pub client_registry: Arc<ClientRegistry>,
    pub driver: Arc<WorkflowDriver>,
    pub connections: Arc<ConnectionRegistry>,
    pub event_bus: Arc<EventBus>,
    pub router: Arc<Router>,
    pub queue: Option<Arc<TaskQueue>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub allowed_origins: Vec<String>,
    pub argon2_memory_kib: u32,
}
