//! A JSON-RPC WebSocket client for exercising the gateway in tests.
//!
//! `call` pairs requests with responses by id; server-initiated event
//! notifications arriving in between are buffered and can be drained with
//! `next_notification`.

use cam_protocol::NOTIFICATION_METHOD;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::time::Duration;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Default wait for a single frame before a test is declared stuck.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MockRpcClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
    notifications: VecDeque<Value>,
    next_id: u64,
}

impl MockRpcClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self {
            write,
            read,
            notifications: VecDeque::new(),
            next_id: 0,
        })
    }

    /// Send a raw text frame as-is (for malformed-input tests).
    pub async fn send_raw(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Text(text.to_owned().into())).await?;
        Ok(())
    }

    /// Issue a call and wait for the response with the matching id.
    pub async fn call(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        self.next_id += 1;
        let id = self.next_id;
        let mut request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "id": id,
        });
        if let Some(params) = params {
            request["params"] = params;
        }
        self.send_raw(&request.to_string()).await?;
        self.recv_response_with_id(Value::from(id)).await
    }

    /// Wait for the next response frame regardless of its id (for raw-frame
    /// tests where no id was assigned by `call`).
    pub async fn recv_response(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        loop {
            let frame = self.recv_json().await?;
            if frame.get("method").and_then(Value::as_str) == Some(NOTIFICATION_METHOD) {
                self.notifications.push_back(frame);
                continue;
            }
            return Ok(frame);
        }
    }

    /// Wait for the response carrying `id`, buffering notifications.
    async fn recv_response_with_id(
        &mut self,
        id: Value,
    ) -> Result<Value, Box<dyn std::error::Error>> {
        loop {
            let frame = self.recv_response().await?;
            if frame.get("id") == Some(&id) {
                return Ok(frame);
            }
        }
    }

    /// Next event notification: buffered if one arrived already, otherwise
    /// read from the socket.
    pub async fn next_notification(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        if let Some(frame) = self.notifications.pop_front() {
            return Ok(frame);
        }
        loop {
            let frame = self.recv_json().await?;
            if frame.get("method").and_then(Value::as_str) == Some(NOTIFICATION_METHOD) {
                return Ok(frame);
            }
            // A response nobody is waiting for; drop it and keep reading.
        }
    }

    /// True when no notification arrives within `window`.
    pub async fn expect_no_notification(&mut self, window: Duration) -> bool {
        if !self.notifications.is_empty() {
            return false;
        }
        (tokio::time::timeout(window, self.next_notification()).await).is_err()
    }

    async fn recv_json(&mut self) -> Result<Value, Box<dyn std::error::Error>> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.read.next())
                .await
                .map_err(|_| "timed out waiting for a frame")?;
            match frame {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    return Ok(value);
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by server".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
