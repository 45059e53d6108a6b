//! A minimal JSON websocket client used as a stand-in CEM, RM, or observer.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub struct MockPeer {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl MockPeer {
    /// Connect to a ws:// URL.
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    pub async fn send_json(
        &mut self,
        payload: &serde_json::Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ws
            .send(Message::Text(payload.to_string().into()))
            .await?;
        Ok(())
    }

    pub async fn send_text(
        &mut self,
        text: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.ws.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Next text frame as raw text, or None on close/timeout.
    pub async fn recv_text(&mut self, timeout: Duration) -> Option<String> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                frame = self.ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                    Some(Ok(Message::Close(_))) | None => return None,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => return None,
                },
                () = &mut deadline => return None,
            }
        }
    }

    /// Next text frame parsed as JSON, or None on close/timeout.
    pub async fn recv_json(&mut self, timeout: Duration) -> Option<serde_json::Value> {
        let text = self.recv_text(timeout).await?;
        serde_json::from_str(&text).ok()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
