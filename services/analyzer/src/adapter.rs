//! Uniform transport adapter over inbound (axum) and outbound
//! (tokio-tungstenite) websockets.
//!
//! Callers only ever see the three [`AdapterError`] kinds; the underlying
//! websocket library never leaks past this module.  A socket is handed out
//! as a receiver/sender pair so that the reader and writer tasks of a
//! half-connection stay independent.

use async_trait::async_trait;
use axum::extract::ws;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message as TungsteniteMessage;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

#[derive(Debug, Error)]
pub enum AdapterError {
    /// The peer closed the socket (or it was closed locally).
    #[error("connection closed")]
    Closed,
    /// A frame that is not valid for the S2 text protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Io(String),
}

/// Receiving half of an adapted websocket.
#[async_trait]
pub trait AdapterReceiver: Send + 'static {
    /// Block until the next text frame arrives.  Binary frames are decoded
    /// as UTF-8; decode failure is a protocol error.
    async fn receive(&mut self) -> Result<String, AdapterError>;
}

/// Sending half of an adapted websocket.
#[async_trait]
pub trait AdapterSender: Send + 'static {
    async fn send(&mut self, text: String) -> Result<(), AdapterError>;
    /// Idempotent close.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), AdapterError>;
    fn is_open(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Inbound: axum websocket
// ---------------------------------------------------------------------------

pub struct ServerWsReceiver {
    stream: SplitStream<ws::WebSocket>,
}

pub struct ServerWsSender {
    sink: SplitSink<ws::WebSocket, ws::Message>,
    open: bool,
}

/// Split an accepted axum websocket into adapter halves.
pub fn server_ws_adapter(socket: ws::WebSocket) -> (ServerWsReceiver, ServerWsSender) {
    let (sink, stream) = socket.split();
    (
        ServerWsReceiver { stream },
        ServerWsSender { sink, open: true },
    )
}

#[async_trait]
impl AdapterReceiver for ServerWsReceiver {
    async fn receive(&mut self) -> Result<String, AdapterError> {
        loop {
            match self.stream.next().await {
                Some(Ok(ws::Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(ws::Message::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|e| AdapterError::Protocol(format!("invalid UTF-8 frame: {e}")));
                }
                // axum answers pings on our behalf; pongs carry no payload we care about.
                Some(Ok(ws::Message::Ping(_) | ws::Message::Pong(_))) => continue,
                Some(Ok(ws::Message::Close(_))) | None => return Err(AdapterError::Closed),
                Some(Err(e)) => return Err(AdapterError::Io(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl AdapterSender for ServerWsSender {
    async fn send(&mut self, text: String) -> Result<(), AdapterError> {
        if !self.open {
            return Err(AdapterError::Closed);
        }
        self.sink
            .send(ws::Message::Text(text.into()))
            .await
            .map_err(|_| {
                self.open = false;
                AdapterError::Closed
            })
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), AdapterError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let frame = ws::CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = self.sink.send(ws::Message::Close(Some(frame))).await;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ---------------------------------------------------------------------------
// Outbound: tokio-tungstenite client
// ---------------------------------------------------------------------------

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct ClientWsReceiver {
    stream: SplitStream<ClientStream>,
}

pub struct ClientWsSender {
    sink: SplitSink<ClientStream, TungsteniteMessage>,
    open: bool,
}

/// Split a dialed tungstenite websocket into adapter halves.
pub fn client_ws_adapter(socket: ClientStream) -> (ClientWsReceiver, ClientWsSender) {
    let (sink, stream) = socket.split();
    (
        ClientWsReceiver { stream },
        ClientWsSender { sink, open: true },
    )
}

#[async_trait]
impl AdapterReceiver for ClientWsReceiver {
    async fn receive(&mut self) -> Result<String, AdapterError> {
        loop {
            match self.stream.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => return Ok(text.to_string()),
                Some(Ok(TungsteniteMessage::Binary(bytes))) => {
                    return String::from_utf8(bytes.to_vec())
                        .map_err(|e| AdapterError::Protocol(format!("invalid UTF-8 frame: {e}")));
                }
                Some(Ok(TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_))) => continue,
                Some(Ok(TungsteniteMessage::Frame(_))) => {
                    return Err(AdapterError::Protocol("unexpected raw frame".to_owned()));
                }
                Some(Ok(TungsteniteMessage::Close(_))) | None => return Err(AdapterError::Closed),
                Some(Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed))
                | Some(Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed)) => {
                    return Err(AdapterError::Closed);
                }
                Some(Err(tokio_tungstenite::tungstenite::Error::Protocol(e))) => {
                    return Err(AdapterError::Protocol(e.to_string()));
                }
                Some(Err(e)) => return Err(AdapterError::Io(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl AdapterSender for ClientWsSender {
    async fn send(&mut self, text: String) -> Result<(), AdapterError> {
        if !self.open {
            return Err(AdapterError::Closed);
        }
        self.sink
            .send(TungsteniteMessage::Text(text.into()))
            .await
            .map_err(|e| match e {
                tokio_tungstenite::tungstenite::Error::ConnectionClosed
                | tokio_tungstenite::tungstenite::Error::AlreadyClosed => {
                    self.open = false;
                    AdapterError::Closed
                }
                other => AdapterError::Io(other.to_string()),
            })
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), AdapterError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        let frame = tokio_tungstenite::tungstenite::protocol::CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        let _ = self.sink.send(TungsteniteMessage::Close(Some(frame))).await;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
