//! Periodic liveness signal: emits a low-priority heartbeat event onto
//! the event bus and sweeps idle connections out of the registry.

use std::sync::Arc;
use std::time::Duration;

use cadence_bridge::event_bus::EventBus;
use cadence_bridge::registry::ConnectionRegistry;
use tracing::debug;

/// Runs until `shutdown` fires. One tick does two things: emit a
/// heartbeat event (so subscribed sessions see the process is alive)
/// and sweep any connection idle past `idle_timeout`.
pub async fn run(
    event_bus: Arc<EventBus>,
    connections: Arc<ConnectionRegistry>,
    interval: Duration,
    idle_timeout: chrono::Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                event_bus.emit_heartbeat("cadence-daemon");
                connections.sweep_idle(idle_timeout).await;
                debug!(active = connections.active_count().await, "heartbeat tick");
            }
            _ = shutdown.recv() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_bridge::event_bus::EventBusConfig;
    use cadence_bridge::registry::ConnectionHandle;
    use uuid::Uuid;

    struct StubHandle;

    #[async_trait::async_trait]
    impl ConnectionHandle for StubHandle {
        async fn send(&self, _payload: serde_json::Value) -> Result<(), String> {
            Ok(())
        }
        async fn close(&self) {}
    }

    #[tokio::test]
    async fn sweep_disconnects_only_past_idle_timeout() {
        let connections = Arc::new(ConnectionRegistry::new());
        connections
            .connect(Uuid::new_v4(), Arc::new(StubHandle), Uuid::new_v4(), None)
            .await;
        assert_eq!(connections.active_count().await, 1);

        connections.sweep_idle(chrono::Duration::hours(1)).await;
        assert_eq!(connections.active_count().await, 1);

        connections.sweep_idle(chrono::Duration::zero()).await;
        assert_eq!(connections.active_count().await, 0);
    }

    #[tokio::test]
    async fn emit_heartbeat_does_not_panic_with_no_subscribers() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.emit_heartbeat("test");
        bus.stop().await;
    }
}
