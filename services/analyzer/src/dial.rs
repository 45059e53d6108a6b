//! Outbound websocket dialing: the analyzer initiates the connection to a
//! peer instead of waiting for one.

use thiserror::Error;
use tokio_tungstenite::connect_async;
use tracing::info;
use uuid::Uuid;

use crate::adapter::client_ws_adapter;
use crate::connection::{ConnectionInfo, spawn_connection};
use crate::router::{RouterError, RouterHandle};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Dial `uri`, register the resulting half-connection, and leave it running
/// in the background.  Returns the session id.
pub async fn dial_peer(
    router: RouterHandle,
    uri: &str,
    info: ConnectionInfo,
) -> Result<Uuid, DialError> {
    let (stream, _response) = connect_async(uri)
        .await
        .map_err(|e| DialError::Connect(e.to_string()))?;
    info!(connection = %info, uri = %uri, "dialed peer");

    let (receiver, sender) = client_ws_adapter(stream);
    let (session_id, _supervisor) = spawn_connection(
        Box::new(receiver),
        Box::new(sender),
        info,
        router,
    )
    .await?;
    Ok(session_id)
}
