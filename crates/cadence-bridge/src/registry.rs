//! Connection Registry (C3): tracks every live session and how to reach
//! it, grouped by user and by project for scoped broadcasts.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A handle capable of writing one more frame to a live session. Sessions
/// implement this over a websocket sink; tests can stub it.
#[async_trait::async_trait]
pub trait ConnectionHandle: Send + Sync {
    async fn send(&self, payload: serde_json::Value) -> Result<(), String>;
    async fn close(&self);
}

struct Connection {
    handle: Arc<dyn ConnectionHandle>,
    user_id: Uuid,
    project_id: Option<Uuid>,
    last_activity: Mutex<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Default, Serialize)]
pub struct RegistryMetrics {
    pub total_connections: u64,
    pub total_disconnections: u64,
    pub total_messages_sent: u64,
    pub total_errors: u64,
}

pub enum SendTarget {
    Connection(Uuid),
    User(Uuid),
    Project(Uuid),
    Broadcast,
}

/// Three maps behind one mutex, as the spec requires — a single lock
/// keeps `connect`/`disconnect` atomic across all three indices.
struct Inner {
    by_id: std::collections::HashMap<Uuid, Connection>,
    by_user: std::collections::HashMap<Uuid, HashSet<Uuid>>,
    by_project: std::collections::HashMap<Uuid, HashSet<Uuid>>,
}

pub struct ConnectionRegistry {
    inner: Mutex<Inner>,
    metrics: DashMap<&'static str, u64>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                by_id: std::collections::HashMap::new(),
                by_user: std::collections::HashMap::new(),
                by_project: std::collections::HashMap::new(),
            }),
            metrics: DashMap::new(),
        }
    }

    pub async fn connect(
        &self,
        id: Uuid,
        handle: Arc<dyn ConnectionHandle>,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.by_id.insert(
            id,
            Connection {
                handle,
                user_id,
                project_id,
                last_activity: Mutex::new(chrono::Utc::now()),
            },
        );
        inner.by_user.entry(user_id).or_default().insert(id);
        if let Some(project_id) = project_id {
            inner.by_project.entry(project_id).or_default().insert(id);
        }
        *self.metrics.entry("total_connections").or_insert(0) += 1;
    }

    pub async fn disconnect(&self, id: Uuid) {
        let mut inner = self.inner.lock().await;
        if let Some(conn) = inner.by_id.remove(&id) {
            if let Some(ids) = inner.by_user.get_mut(&conn.user_id) {
                ids.remove(&id);
            }
            if let Some(project_id) = conn.project_id {
                if let Some(ids) = inner.by_project.get_mut(&project_id) {
                    ids.remove(&id);
                }
            }
            drop(inner);
            conn.handle.close().await;
            *self.metrics.entry("total_disconnections").or_insert(0) += 1;
        }
    }

    /// Send `payload` to the sessions selected by `target`. A failed write
    /// to any one connection disconnects it immediately; failures on other
    /// connections in the same call are not affected.
    pub async fn send_to(&self, target: SendTarget, payload: serde_json::Value) {
        let ids = {
            let inner = self.inner.lock().await;
            match target {
                SendTarget::Connection(id) => {
                    if inner.by_id.contains_key(&id) {
                        vec![id]
                    } else {
                        vec![]
                    }
                }
                SendTarget::User(user_id) => inner
                    .by_user
                    .get(&user_id)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default(),
                SendTarget::Project(project_id) => inner
                    .by_project
                    .get(&project_id)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default(),
                SendTarget::Broadcast => inner.by_id.keys().copied().collect(),
            }
        };

        for id in ids {
            let handle = {
                let inner = self.inner.lock().await;
                inner.by_id.get(&id).map(|c| c.handle.clone())
            };
            let Some(handle) = handle else { continue };
            match handle.send(payload.clone()).await {
                Ok(()) => {
                    *self.metrics.entry("total_messages_sent").or_insert(0) += 1;
                }
                Err(_) => {
                    *self.metrics.entry("total_errors").or_insert(0) += 1;
                    self.disconnect(id).await;
                }
            }
        }
    }

    pub async fn touch(&self, id: Uuid) {
        let inner = self.inner.lock().await;
        if let Some(conn) = inner.by_id.get(&id) {
            *conn.last_activity.lock().await = chrono::Utc::now();
        }
    }

    /// Disconnect every session whose `last_activity` is older than
    /// `idle_timeout`. Intended to run on a periodic timer.
    pub async fn sweep_idle(&self, idle_timeout: chrono::Duration) {
        let now = chrono::Utc::now();
        let stale: Vec<Uuid> = {
            let inner = self.inner.lock().await;
            let mut stale = Vec::new();
            for (id, conn) in &inner.by_id {
                let last = *conn.last_activity.lock().await;
                if now - last > idle_timeout {
                    stale.push(*id);
                }
            }
            stale
        };
        for id in stale {
            self.disconnect(id).await;
        }
    }

    pub async fn active_count(&self) -> usize {
        self.inner.lock().await.by_id.len()
    }

    pub fn metrics(&self) -> RegistryMetrics {
        RegistryMetrics {
            total_connections: *self.metrics.get("total_connections").as_deref().unwrap_or(&0),
            total_disconnections: *self
                .metrics
                .get("total_disconnections")
                .as_deref()
                .unwrap_or(&0),
            total_messages_sent: *self
                .metrics
                .get("total_messages_sent")
                .as_deref()
                .unwrap_or(&0),
            total_errors: *self.metrics.get("total_errors").as_deref().unwrap_or(&0),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
