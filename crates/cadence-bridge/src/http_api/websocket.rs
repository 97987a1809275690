//! The three websocket entry points: global, project-scoped, and
//! execution-scoped streaming sessions.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use cadence_auth::token::TokenKind;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::event_bus::EventFilter;
use crate::http_api::state::ApiState;
use crate::origin_validation::validate_websocket_origin;
use crate::protocol::{ClientMessage, ConnectionAck, EventFrame, HandlerResponse};
use crate::registry::ConnectionHandle;

#[derive(serde::Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

struct WsHandle {
    tx: mpsc::UnboundedSender<Message>,
}

#[async_trait::async_trait]
impl ConnectionHandle for WsHandle {
    async fn send(&self, payload: serde_json::Value) -> Result<(), String> {
        self.tx
            .send(Message::Text(payload.to_string().into()))
            .map_err(|e| e.to_string())
    }

    async fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }
}

pub async fn global(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    handle_upgrade(ws, state, query, headers, None, None).await
}

pub async fn project_scoped(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    handle_upgrade(ws, state, query, headers, Some(project_id), None).await
}

pub async fn execution_scoped(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
    Path(execution_id): Path<Uuid>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    handle_upgrade(ws, state, query, headers, None, Some(execution_id)).await
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    state: ApiState,
    query: WsQuery,
    headers: HeaderMap,
    project_id: Option<Uuid>,
    execution_id: Option<Uuid>,
) -> axum::response::Response {
    if validate_websocket_origin(&headers, &state.allowed_origins).is_err() {
        return StatusCode::FORBIDDEN.into_response();
    }

    let Some(token) = query.token else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    let claims = match state.token_authority.verify(&token, TokenKind::Access) {
        Ok(claims) => claims,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };
    if state.blacklist.is_token_revoked(claims.jti).await || state.blacklist.is_user_revoked(claims.sub).await {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let user_id = claims.sub;

    if let Some(project_id) = project_id {
        if state.store.get_project(project_id).await.ok().flatten().is_none() {
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    ws.on_upgrade(move |socket| session(socket, state, user_id, project_id, execution_id))
}

async fn session(
    socket: WebSocket,
    state: ApiState,
    user_id: Uuid,
    project_id: Option<Uuid>,
    execution_id: Option<Uuid>,
) {
    let connection_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    state
        .connections
        .connect(connection_id, Arc::new(WsHandle { tx: tx.clone() }), user_id, project_id)
        .await;

    let mut filter = EventFilter::default();
    if let Some(project_id) = project_id {
        filter.project_ids = Some(std::iter::once(project_id).collect());
    }
    if let Some(execution_id) = execution_id {
        filter.execution_ids = Some(std::iter::once(execution_id).collect());
    }
    let forward_tx = tx.clone();
    state
        .event_bus
        .subscribe(connection_id, filter, move |event| {
            let frame = EventFrame::new(event);
            if let Ok(text) = serde_json::to_string(&frame) {
                let _ = forward_tx.send(Message::Text(text.into()));
            }
        })
        .await;

    let ack = ConnectionAck {
        connection_id,
        user_id,
        project_id,
        execution_id,
        timestamp: chrono::Utc::now(),
    };
    if let Ok(text) = serde_json::to_string(&ack) {
        let _ = tx.send(Message::Text(text.into()));
    }

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let response = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(client_message) => state.router.dispatch(user_id, connection_id, client_message).await,
            Err(_) => HandlerResponse::unknown_message_type(),
        };
        if let Ok(text) = serde_json::to_string(&response) {
            if tx.send(Message::Text(text.into())).is_err() {
                break;
            }
        }
    }

    state.event_bus.unsubscribe(connection_id).await;
    state.connections.disconnect(connection_id).await;
    drop(tx);
    let _ = writer.await;
}
