//! Observer websockets: the debugger message stream and the
//! session-updates stream.
//!
//! Observers may send the text frame `"ping"` and get `"pong"` back; every
//! other inbound frame is ignored.

use axum::extract::ws::{Message as WsFrame, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use super::AppState;
use crate::processors::debugger::{
    DebuggerFilter, DebuggerObserver, OBSERVER_QUEUE_CAPACITY,
};
use crate::processors::session::{SessionObserver, SessionSnapshot};

/// Raw query params; empty strings count as absent so a frontend can send
/// `?session_id=&cem_id=` without tripping parsing.
#[derive(Debug, Default, Deserialize)]
pub struct DebuggerQuery {
    pub session_id: Option<String>,
    pub cem_id: Option<String>,
    pub rm_id: Option<String>,
    pub include_session_history: Option<String>,
}

impl DebuggerQuery {
    fn into_filter(self) -> Result<DebuggerFilter, String> {
        let session_id = match self.session_id.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                raw.parse::<Uuid>()
                    .map_err(|e| format!("invalid session_id: {e}"))?,
            ),
        };
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let include_session_history = matches!(
            self.include_session_history.as_deref(),
            Some("true") | Some("True") | Some("1")
        );
        Ok(DebuggerFilter {
            session_id,
            cem_id: non_empty(self.cem_id),
            rm_id: non_empty(self.rm_id),
            include_session_history,
        })
    }
}

/// `WS /backend/debugger/`
pub async fn debugger_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<DebuggerQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_debugger_socket(socket, state, query))
}

async fn handle_debugger_socket(mut socket: WebSocket, state: AppState, query: DebuggerQuery) {
    let filter = match query.into_filter() {
        Ok(filter) => filter,
        Err(e) => {
            let _ = socket.send(WsFrame::Text(e.into())).await;
            return;
        }
    };
    info!(?filter, "debugger frontend connected");
    let replay_session = filter
        .include_session_history
        .then_some(filter.session_id)
        .flatten();

    // Register before any replay: live traffic processed during the replay
    // window queues up here instead of being lost, and drains afterwards.
    let (queue_tx, mut queue_rx) = mpsc::channel(OBSERVER_QUEUE_CAPACITY);
    state
        .debugger_observers
        .write()
        .expect("observer registry lock")
        .push(DebuggerObserver {
            filter,
            queue: queue_tx,
        });

    // Messages are persisted and fanned out in the same pipeline order, so
    // anything queued at or before the last replayed timestamp for this
    // session is a duplicate of the replay.
    let mut replay_cutoff: Option<DateTime<Utc>> = None;
    if let Some(session_id) = replay_session {
        let store = state.store.clone();
        let history = tokio::task::spawn_blocking(move || store.session_history(session_id))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "history replay task failed");
                Ok(Vec::new())
            });
        match history {
            Ok(records) => {
                for record in records {
                    let replayed_at = record.timestamp;
                    let message = record.into_message();
                    match serde_json::to_string(&message) {
                        Ok(text) => {
                            if socket.send(WsFrame::Text(text.into())).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => warn!(error = %e, "failed to serialize history record"),
                    }
                    replay_cutoff = Some(replayed_at);
                }
            }
            Err(e) => warn!(error = %e, "failed to load session history"),
        }
    }

    loop {
        tokio::select! {
            message = queue_rx.recv() => {
                let Some(message) = message else { break };
                if let (Some(session_id), Some(cutoff)) = (replay_session, replay_cutoff) {
                    if message.session_id == session_id && message.timestamp <= cutoff {
                        // Queued while the replay ran and already replayed.
                        continue;
                    }
                }
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if socket.send(WsFrame::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize message for observer"),
                }
            }
            incoming = socket.recv() => {
                if !handle_observer_frame(&mut socket, incoming).await {
                    break;
                }
            }
        }
    }
    info!("debugger frontend disconnected");
}

/// `WS /backend/session-updates/`
pub async fn session_updates_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session_updates_socket(socket, state))
}

async fn handle_session_updates_socket(mut socket: WebSocket, state: AppState) {
    info!("session-updates observer connected");

    // Bring the new observer up to date with every open session.
    let open: Vec<SessionSnapshot> = state
        .open_sessions
        .read()
        .expect("session map lock")
        .values()
        .cloned()
        .collect();
    for snapshot in open {
        match serde_json::to_string(&snapshot) {
            Ok(text) => {
                if socket.send(WsFrame::Text(text.into())).await.is_err() {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize session snapshot"),
        }
    }

    let (queue_tx, mut queue_rx) = mpsc::channel(OBSERVER_QUEUE_CAPACITY);
    state
        .session_observers
        .write()
        .expect("observer registry lock")
        .push(SessionObserver { queue: queue_tx });

    loop {
        tokio::select! {
            snapshot = queue_rx.recv() => {
                let Some(snapshot) = snapshot else { break };
                match serde_json::to_string(&snapshot) {
                    Ok(text) => {
                        if socket.send(WsFrame::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize session snapshot"),
                }
            }
            incoming = socket.recv() => {
                if !handle_observer_frame(&mut socket, incoming).await {
                    break;
                }
            }
        }
    }
    info!("session-updates observer disconnected");
}

/// Shared observer health-frame protocol.  Returns false when the socket is
/// done.
async fn handle_observer_frame(
    socket: &mut WebSocket,
    incoming: Option<Result<WsFrame, axum::Error>>,
) -> bool {
    match incoming {
        Some(Ok(WsFrame::Text(text))) => {
            if text.as_str() == "ping" {
                if socket.send(WsFrame::Text("pong".into())).await.is_err() {
                    return false;
                }
            }
            true
        }
        Some(Ok(WsFrame::Close(_))) | None => false,
        Some(Ok(_)) => true,
        Some(Err(e)) => {
            warn!(error = %e, "observer socket error");
            false
        }
    }
}
