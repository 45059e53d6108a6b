//! A websocket server standing in for a peer the analyzer dials outbound.
//!
//! Binds port 0 and hands accepted connections back to the test, which
//! drives them as the remote RM or CEM.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::Message;

pub struct MockPeerServer {
    addr: SocketAddr,
    incoming: mpsc::Receiver<MockServerConn>,
    _task: tokio::task::JoinHandle<()>,
}

impl MockPeerServer {
    pub async fn start() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel(8);

        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _peer)) = listener.accept().await else {
                    break;
                };
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if tx.send(MockServerConn { ws }).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            addr,
            incoming: rx,
            _task: task,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// The next accepted connection, or None on timeout.
    pub async fn accept(&mut self, timeout: Duration) -> Option<MockServerConn> {
        tokio::time::timeout(timeout, self.incoming.recv())
            .await
            .ok()
            .flatten()
    }
}

pub struct MockServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl MockServerConn {
    pub async fn send_json(
        &mut self,
        payload: &serde_json::Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ws
            .send(Message::Text(payload.to_string().into()))
            .await?;
        Ok(())
    }

    pub async fn recv_json(&mut self, timeout: Duration) -> Option<serde_json::Value> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str(&text).ok();
                    }
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return None,
                },
                () = &mut deadline => return None,
            }
        }
    }
}
