//! Event Bus (C4): an async multiplexer between emitters (the workflow
//! driver, the message router) and one subscriber per streaming session.
//!
//! Emitters push into an unbounded `flume` channel and return immediately;
//! a dedicated processor task drains it into a buffer, flushing on
//! capacity or a batch timeout, sorting each flushed batch by priority
//! descending before fan-out.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cadence_core::types::{EventPriority, StreamEvent};
use tokio::sync::Mutex;
use uuid::Uuid;

/// A conjunction of optional predicates. An omitted (`None`/empty) field
/// matches everything for that dimension.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<HashSet<String>>,
    pub sources: Option<HashSet<String>>,
    pub execution_ids: Option<HashSet<Uuid>>,
    pub project_ids: Option<HashSet<Uuid>>,
    pub min_priority: Option<EventPriority>,
}

impl EventFilter {
    pub fn matches(&self, event: &StreamEvent) -> bool {
        if let Some(types) = &self.event_types {
            if !types.contains(&format!("{:?}", event.event_type)) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&event.source) {
                return false;
            }
        }
        if let Some(ids) = &self.execution_ids {
            match event.execution_id {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(ids) = &self.project_ids {
            match event.project_id {
                Some(id) if ids.contains(&id) => {}
                _ => return false,
            }
        }
        if let Some(min) = self.min_priority {
            if (event.priority as i32) < (min as i32) {
                return false;
            }
        }
        true
    }
}

type Callback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

struct Subscriber {
    filter: EventFilter,
    callback: Callback,
}

pub struct EventBusConfig {
    pub buffer_size: usize,
    pub batch_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            batch_timeout: Duration::from_millis(50),
        }
    }
}

pub struct EventBus {
    tx: flume::Sender<StreamEvent>,
    subscribers: Arc<Mutex<std::collections::HashMap<Uuid, Subscriber>>>,
    stopped: Arc<AtomicBool>,
    processor: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Arc<Self> {
        let (tx, rx) = flume::unbounded();
        let subscribers = Arc::new(Mutex::new(std::collections::HashMap::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let bus = Arc::new(Self {
            tx,
            subscribers: subscribers.clone(),
            stopped: stopped.clone(),
            processor: Mutex::new(None),
        });

        let handle = tokio::spawn(Self::process(rx, subscribers, config));
        // `try_lock` never contends here: nothing else can see `bus` yet.
        *bus.processor.try_lock().expect("no contention at construction") = Some(handle);
        bus
    }

    async fn process(
        rx: flume::Receiver<StreamEvent>,
        subscribers: Arc<Mutex<std::collections::HashMap<Uuid, Subscriber>>>,
        config: EventBusConfig,
    ) {
        let mut buffer: Vec<StreamEvent> = Vec::new();
        loop {
            let deadline = tokio::time::sleep(config.batch_timeout);
            tokio::pin!(deadline);

            tokio::select! {
                event = rx.recv_async() => {
                    match event {
                        Ok(event) => {
                            buffer.push(event);
                            if buffer.len() >= config.buffer_size {
                                Self::flush(&subscribers, &mut buffer).await;
                            }
                        }
                        Err(_) => {
                            Self::flush(&subscribers, &mut buffer).await;
                            return;
                        }
                    }
                }
                _ = &mut deadline, if !buffer.is_empty() => {
                    Self::flush(&subscribers, &mut buffer).await;
                }
            }
        }
    }

    async fn flush(
        subscribers: &Arc<Mutex<std::collections::HashMap<Uuid, Subscriber>>>,
        buffer: &mut Vec<StreamEvent>,
    ) {
        if buffer.is_empty() {
            return;
        }
        buffer.sort_by(|a, b| (b.priority as i32).cmp(&(a.priority as i32)));
        let subs = subscribers.lock().await;
        for event in buffer.drain(..) {
            for sub in subs.values() {
                if sub.filter.matches(&event) {
                    (sub.callback)(event.clone());
                }
            }
        }
    }

    pub async fn subscribe(
        &self,
        id: Uuid,
        filter: EventFilter,
        callback: impl Fn(StreamEvent) + Send + Sync + 'static,
    ) {
        self.subscribers.lock().await.insert(
            id,
            Subscriber {
                filter,
                callback: Arc::new(callback),
            },
        );
    }

    pub async fn unsubscribe(&self, id: Uuid) {
        self.subscribers.lock().await.remove(&id);
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Enqueue an event for delivery. Dropped with a warning once `stop`
    /// has been called.
    pub fn emit(&self, event: StreamEvent) {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::warn!("event emitted after event bus stop, dropping");
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::warn!("event bus processor gone, dropping event");
        }
    }

    pub fn emit_log(&self, source: &str, message: &str, execution_id: Option<Uuid>) {
        let mut event = StreamEvent::new(
            cadence_core::types::StreamEventType::Log,
            source,
            serde_json::json!({ "message": message }),
        )
        .with_priority(EventPriority::Normal);
        if let Some(id) = execution_id {
            event = event.with_execution(id);
        }
        self.emit(event);
    }

    pub fn emit_progress(&self, source: &str, execution_id: Uuid, project_id: Uuid, progress: u8) {
        let event = StreamEvent::new(
            cadence_core::types::StreamEventType::Status,
            source,
            serde_json::json!({ "event": "progress_update", "progress": progress }),
        )
        .with_priority(EventPriority::High)
        .with_execution(execution_id)
        .with_project(project_id);
        self.emit(event);
    }

    pub fn emit_error(&self, source: &str, message: &str, execution_id: Option<Uuid>) {
        let mut event = StreamEvent::new(
            cadence_core::types::StreamEventType::System,
            source,
            serde_json::json!({ "event": "error", "message": message }),
        )
        .with_priority(EventPriority::Critical);
        if let Some(id) = execution_id {
            event = event.with_execution(id);
        }
        self.emit(event);
    }

    pub fn emit_heartbeat(&self, source: &str) {
        let event = StreamEvent::new(
            cadence_core::types::StreamEventType::System,
            source,
            serde_json::json!({ "event": "heartbeat" }),
        )
        .with_priority(EventPriority::Low);
        self.emit(event);
    }

    /// Flushes whatever is buffered, then shuts the processor task down.
    /// Events emitted afterwards are dropped (see [`EventBus::emit`]).
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.processor.lock().await.take() {
            drop(self.tx.clone());
            let _ = handle.await;
        }
    }
}

#[async_trait::async_trait]
impl cadence_workflow::EventSink for EventBus {
    async fn publish(&self, event: StreamEvent) {
        self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn subscriber_with_matching_filter_receives_event() {
        let bus = EventBus::new(EventBusConfig {
            buffer_size: 1,
            batch_timeout: Duration::from_millis(10),
        });
        let received = StdArc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bus.subscribe(Uuid::new_v4(), EventFilter::default(), move |_event| {
            received2.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        bus.emit(StreamEvent::new(
            cadence_core::types::StreamEventType::Log,
            "test",
            serde_json::json!({}),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
        bus.stop().await;
    }

    #[tokio::test]
    async fn filter_rejects_non_matching_project_scope() {
        let bus = EventBus::new(EventBusConfig {
            buffer_size: 1,
            batch_timeout: Duration::from_millis(10),
        });
        let received = StdArc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        let mut project_ids = HashSet::new();
        project_ids.insert(Uuid::new_v4());
        bus.subscribe(
            Uuid::new_v4(),
            EventFilter {
                project_ids: Some(project_ids),
                ..Default::default()
            },
            move |_event| {
                received2.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await;

        bus.emit(
            StreamEvent::new(
                cadence_core::types::StreamEventType::Log,
                "test",
                serde_json::json!({}),
            )
            .with_project(Uuid::new_v4()),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 0);
        bus.stop().await;
    }

    #[tokio::test]
    async fn events_after_stop_are_dropped() {
        let bus = EventBus::new(EventBusConfig::default());
        bus.stop().await;
        bus.emit(StreamEvent::new(
            cadence_core::types::StreamEventType::Log,
            "test",
            serde_json::json!({}),
        ));
        // no panic, no delivery target to assert against — emit() is a no-op post-stop.
    }

    #[tokio::test]
    async fn unsubscribe_stops_further_delivery() {
        let bus = EventBus::new(EventBusConfig {
            buffer_size: 1,
            batch_timeout: Duration::from_millis(10),
        });
        let id = Uuid::new_v4();
        let received = StdArc::new(AtomicUsize::new(0));
        let received2 = received.clone();
        bus.subscribe(id, EventFilter::default(), move |_event| {
            received2.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        bus.unsubscribe(id).await;

        bus.emit(StreamEvent::new(
            cadence_core::types::StreamEventType::Log,
            "test",
            serde_json::json!({}),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 0);
        bus.stop().await;
    }

    #[tokio::test]
    async fn same_batch_delivers_higher_priority_first() {
        let bus = EventBus::new(EventBusConfig {
            buffer_size: 3,
            batch_timeout: Duration::from_secs(60),
        });
        let order = StdArc::new(std::sync::Mutex::new(Vec::new()));
        let order2 = order.clone();
        bus.subscribe(Uuid::new_v4(), EventFilter::default(), move |event| {
            order2.lock().unwrap().push(event.priority);
        })
        .await;

        bus.emit(
            StreamEvent::new(cadence_core::types::StreamEventType::Log, "test", serde_json::json!({}))
                .with_priority(EventPriority::Low),
        );
        bus.emit(
            StreamEvent::new(cadence_core::types::StreamEventType::Log, "test", serde_json::json!({}))
                .with_priority(EventPriority::Critical),
        );
        bus.emit(
            StreamEvent::new(cadence_core::types::StreamEventType::Log, "test", serde_json::json!({}))
                .with_priority(EventPriority::Normal),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        let seen = order.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![EventPriority::Critical, EventPriority::Normal, EventPriority::Low]
        );
        bus.stop().await;
    }
}
