//! Inbound peer websockets and outbound dialing.

use axum::{
    Json,
    extract::{Path, State, WebSocketUpgrade, ws::WebSocket},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use s2_protocol::OriginType;

use super::AppState;
use super::response::{bad_gateway, bad_request};
use crate::adapter::server_ws_adapter;
use crate::connection::{ConnectionInfo, spawn_connection};
use crate::dial::dial_peer;

/// `WS /backend/rm/{rm_id}/cem/{cem_id}/ws`
pub async fn rm_ws_handler(
    ws: WebSocketUpgrade,
    Path((rm_id, cem_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_peer_socket(
            socket,
            state,
            ConnectionInfo::new(rm_id, cem_id, OriginType::Rm),
        )
    })
}

/// `WS /backend/cem/{cem_id}/rm/{rm_id}/ws`
pub async fn cem_ws_handler(
    ws: WebSocketUpgrade,
    Path((cem_id, rm_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_peer_socket(
            socket,
            state,
            ConnectionInfo::new(cem_id, rm_id, OriginType::Cem),
        )
    })
}

async fn handle_peer_socket(socket: WebSocket, state: AppState, info: ConnectionInfo) {
    info!(connection = %info, "peer connected");

    // An RM that names the emulated CEM as its counterpart gets a device
    // model (and the CEM-side model connection) before its own half comes
    // up, so the pair is complete from the first frame.
    let emulated = state
        .cem
        .as_ref()
        .filter(|cem| info.origin_type.is_rm() && cem.serves(info.cem_id()));
    if let Some(cem) = emulated {
        cem.bind_rm(info.rm_id()).await;
    }

    let (receiver, sender) = server_ws_adapter(socket);
    match spawn_connection(
        Box::new(receiver),
        Box::new(sender),
        info.clone(),
        state.router.clone(),
    )
    .await
    {
        Ok((session_id, supervisor)) => {
            info!(connection = %info, session_id = %session_id, "session assigned");
            let _ = supervisor.await;
        }
        Err(e) => {
            warn!(connection = %info, error = %e, "failed to register half-connection");
        }
    }

    if let Some(cem) = emulated {
        cem.unbind_rm(info.rm_id()).await;
    }
    info!(connection = %info, "peer handler finished");
}

// ---------------------------------------------------------------------------
// Outbound dialing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct DialRequest {
    pub rm_id: String,
    pub cem_id: String,
    #[serde(default)]
    pub rm_uri: Option<String>,
    #[serde(default)]
    pub cem_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DialedConnection {
    pub origin_type: OriginType,
    pub session_id: Uuid,
}

/// `POST /backend/connections/` — dial one or both peers outbound.
pub async fn dial_connections(
    State(state): State<AppState>,
    Json(request): Json<DialRequest>,
) -> Response {
    if request.rm_uri.is_none() && request.cem_uri.is_none() {
        return bad_request("at least one of rm_uri or cem_uri must be supplied");
    }

    let mut dialed = Vec::new();

    if let Some(rm_uri) = &request.rm_uri {
        // Frames read from the RM's socket originate from the RM.
        let info = ConnectionInfo::new(&request.rm_id, &request.cem_id, OriginType::Rm);
        if let Some(cem) = state
            .cem
            .as_ref()
            .filter(|cem| cem.serves(&request.cem_id))
        {
            cem.bind_rm(&request.rm_id).await;
        }
        match dial_peer(state.router.clone(), rm_uri, info).await {
            Ok(session_id) => dialed.push(DialedConnection {
                origin_type: OriginType::Rm,
                session_id,
            }),
            Err(e) => return bad_gateway(format!("dialing RM at {rm_uri} failed: {e}")),
        }
    }

    if let Some(cem_uri) = &request.cem_uri {
        let info = ConnectionInfo::new(&request.cem_id, &request.rm_id, OriginType::Cem);
        match dial_peer(state.router.clone(), cem_uri, info).await {
            Ok(session_id) => dialed.push(DialedConnection {
                origin_type: OriginType::Cem,
                session_id,
            }),
            Err(e) => return bad_gateway(format!("dialing CEM at {cem_uri} failed: {e}")),
        }
    }

    (StatusCode::CREATED, Json(dialed)).into_response()
}
