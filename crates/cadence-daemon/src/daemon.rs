//! Assembles the shared services from [`Config`] and runs them until a
//! shutdown signal arrives. Startup/shutdown ordering follows §4.9:
//! persistence → blacklist → queue → event bus → handlers → traffic,
//! reversed on the way down.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cadence_auth::blacklist::Blacklist;
use cadence_auth::token::TokenAuthority;
use cadence_bridge::event_bus::{EventBus, EventBusConfig};
use cadence_bridge::http_api::{self, ApiState};
use cadence_bridge::registry::ConnectionRegistry;
use cadence_bridge::router::Router;
use cadence_core::config::Config;
use cadence_core::store::Store;
use cadence_harness::rate_limiter::{RateLimitConfig, RateLimiter};
use cadence_harness::shutdown::ShutdownSignal;
use cadence_intelligence::registry::ClientRegistry;
use cadence_queue::TaskQueue;
use cadence_workflow::WorkflowDriver;
use tracing::info;

/// A running instance: the bound API port and a handle to trigger
/// graceful shutdown.
pub struct Daemon {
    config: Config,
    api_port: u16,
    shutdown: ShutdownSignal,
    background: Vec<tokio::task::JoinHandle<()>>,
    api_handle: tokio::task::JoinHandle<()>,
}

impl Daemon {
    /// Build every shared service, bind the API listener, and spawn the
    /// scheduler/heartbeat background loops. Does not block; call
    /// [`Daemon::wait`] or drive `shutdown_handle()` separately.
    pub async fn start(config: Config) -> Result<Self> {
        let store = Arc::new(
            Store::new(&config.persistence.sqlite_path)
                .await
                .context("failed to open persistence store")?,
        );
        info!(path = %config.persistence.sqlite_path, "persistence store open");

        let redis_url = std::env::var(&config.queue.redis_url_env)
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let blacklist = Arc::new(
            Blacklist::connect(&redis_url)
                .await
                .context("failed to connect to blacklist store")?,
        );
        info!("blacklist store connected");

        let queue = Arc::new(
            TaskQueue::connect(&redis_url)
                .await
                .context("failed to connect to job queue")?,
        );
        info!("job queue connected");

        let jwt_secret = std::env::var(&config.auth.jwt_secret_env)
            .context("JWT signing secret env var not set")?;
        let token_authority = TokenAuthority::new(
            jwt_secret,
            config.auth.access_token_ttl_minutes as i64,
            config.auth.refresh_token_ttl_days as i64,
        );

        let client_registry = Arc::new(ClientRegistry::with_builtin_providers());
        let connections = Arc::new(ConnectionRegistry::new());
        let event_bus = EventBus::new(EventBusConfig {
            buffer_size: config.events.buffer_size,
            batch_timeout: Duration::from_millis(config.events.batch_timeout_ms),
        });
        info!("event bus processor started");

        let driver = Arc::new(WorkflowDriver::with_providers_config(
            store.clone(),
            client_registry.clone(),
            event_bus.clone(),
            config.providers.clone(),
        ));

        let router = Arc::new(Router::new(
            store.clone(),
            driver.clone(),
            connections.clone(),
            Some(queue.clone()),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::requests_per_minute(
            config.rate_limit.requests_per_minute,
        )));

        let state = ApiState {
            store: store.clone(),
            token_authority,
            blacklist: blacklist.clone(),
            client_registry,
            driver: driver.clone(),
            connections: connections.clone(),
            event_bus: event_bus.clone(),
            router,
            queue: Some(queue.clone()),
            rate_limiter,
            allowed_origins: cadence_bridge::origin_validation::get_default_allowed_origins(),
            argon2_memory_kib: config.auth.argon2_memory_kib,
        };

        let app = http_api::router(state);
        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind API listener on {bind_addr}"))?;
        let api_port = listener.local_addr()?.port();
        info!(api_port, "API listener bound, accepting traffic");

        let shutdown = ShutdownSignal::new();

        let mut api_shutdown_rx = shutdown.subscribe();
        let api_handle = tokio::spawn(async move {
            let graceful = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = api_shutdown_rx.recv().await;
            });
            if let Err(e) = graceful.await {
                tracing::error!(error = %e, "API server error");
            }
        });

        let scheduler_handle = tokio::spawn(crate::scheduler::run(
            queue.clone(),
            driver.clone(),
            config.queue.worker_batch_size as i64,
            shutdown.subscribe(),
        ));

        let heartbeat_handle = tokio::spawn(crate::heartbeat::run(
            event_bus.clone(),
            connections.clone(),
            Duration::from_secs(config.connections.idle_session_timeout_seconds / 2),
            chrono::Duration::seconds(config.connections.idle_session_timeout_seconds as i64),
            shutdown.subscribe(),
        ));

        Ok(Self {
            config,
            api_port,
            shutdown,
            background: vec![scheduler_handle, heartbeat_handle],
            api_handle,
        })
    }

    pub fn api_port(&self) -> u16 {
        self.api_port
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle that can be cloned into a signal handler to trigger
    /// shutdown from elsewhere.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Block until the API server task and every background loop exit.
    /// Shutdown reverses startup order: admission already stopped the
    /// moment the signal fires (no new sessions are accepted by the
    /// background loops, and axum stops admitting new connections), so
    /// this just drains what's in flight.
    pub async fn wait(self) -> Result<()> {
        for handle in self.background {
            let _ = handle.await;
        }
        let _ = self.api_handle.await;
        info!("daemon stopped");
        Ok(())
    }
}
