//! Wire protocol between a session (websocket or otherwise) and the
//! router: a closed set of incoming commands and one response envelope.

use cadence_core::types::StreamEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every command a session is allowed to send. Anything that doesn't
/// match one of these variants is rejected by serde before it reaches
/// the router, which then reports "Unknown message type".
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    StartAgent {
        project_id: Uuid,
        role: Option<String>,
    },
    CancelExecution {
        execution_id: Uuid,
    },
    PauseExecution {
        execution_id: Uuid,
    },
    ResumeExecution {
        execution_id: Uuid,
    },
    GetProject {
        project_id: Uuid,
    },
    UpdateProject {
        project_id: Uuid,
        name: Option<String>,
        description: Option<String>,
        requirements: Option<String>,
    },
    GetProjectStatus {
        project_id: Uuid,
    },
    GetExecution {
        execution_id: Uuid,
    },
    GetExecutionLogs {
        execution_id: Uuid,
    },
    GetFile {
        project_id: Uuid,
        path: String,
    },
    ListFiles {
        project_id: Uuid,
        path: Option<String>,
    },
    GetAgentConfig {
        role: String,
    },
    UpdateAgentConfig {
        role: String,
        provider: Option<String>,
        model: Option<String>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    },
    Subscribe {
        project_id: Option<Uuid>,
        execution_id: Option<Uuid>,
    },
    Unsubscribe,
    Ping,
    Heartbeat,
}

/// What every handler returns, regardless of which command it answered.
/// A handler failure is carried in `error`, never by closing the
/// connection.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerResponse {
    pub success: bool,
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HandlerResponse {
    pub fn ok(message_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message_type: message_type.into(),
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn err(message_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_type: message_type.into(),
            data: None,
            error: Some(error.into()),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn unknown_message_type() -> Self {
        Self::err("unknown", "Unknown message type")
    }
}

/// The frame sent on connect, before any event or response frame.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionAck {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A streamed `StreamEvent` wrapped with the `"event"` tag so it's
/// distinguishable from a `HandlerResponse` frame on the same socket.
#[derive(Debug, Clone, Serialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    pub event: StreamEvent,
}

impl EventFrame {
    pub fn new(event: StreamEvent) -> Self {
        Self {
            frame_type: "event",
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_agent_deserializes_from_tagged_json() {
        let raw = serde_json::json!({
            "type": "start_agent",
            "payload": { "project_id": Uuid::nil(), "role": "engineer" }
        });
        let msg: ClientMessage = serde_json::from_value(raw).unwrap();
        assert!(matches!(msg, ClientMessage::StartAgent { .. }));
    }

    #[test]
    fn unknown_type_fails_to_deserialize() {
        let raw = serde_json::json!({ "type": "delete_everything", "payload": {} });
        let result: Result<ClientMessage, _> = serde_json::from_value(raw);
        assert!(result.is_err());
    }

    #[test]
    fn unknown_message_type_response_is_not_success() {
        let response = HandlerResponse::unknown_message_type();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Unknown message type"));
    }
}
