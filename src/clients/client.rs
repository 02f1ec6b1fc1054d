//! Minimal endpoint client.
//!
//! Provides typed wrappers for the built-in commands plus a raw escape
//! hatch for arbitrary payloads. The wire protocol is one request and one
//! reply per connection, so the client holds an address rather than a
//! live stream and dials for every call.

use crate::protocol::Reply;

use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Issues commands against a running endpoint.
#[derive(Debug, Clone)]
pub struct Client {
    addr: String,
}

impl Client {
    /// Create a client for the endpoint at `addr` (`host:port`). No
    /// connection is made until a command is issued.
    pub fn new(addr: impl Into<String>) -> Client {
        Client { addr: addr.into() }
    }

    /// Send an arbitrary payload and return the decoded reply.
    ///
    /// The write half is shut down after the payload so the server sees
    /// end of stream even if it defers parsing; the reply is everything
    /// the server writes before closing.
    pub async fn send(&self, payload: &Value) -> crate::Result<Reply> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        let bytes = serde_json::to_vec(payload)?;
        stream.write_all(&bytes).await?;
        stream.shutdown().await?;

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        if buf.is_empty() {
            return Err("connection closed without a reply".into());
        }

        debug!(bytes = buf.len(), "reply received");
        Ok(serde_json::from_slice(&buf)?)
    }

    /// Issue a named command and unwrap its result, turning an error
    /// reply into an `Err` carrying the server's message.
    pub async fn command(&self, command: &str, params: Map<String, Value>) -> crate::Result<Value> {
        let reply = self
            .send(&json!({ "type": command, "params": params }))
            .await?;
        reply.into_result()
    }

    /// Summarize the open scene.
    pub async fn scene_info(&self) -> crate::Result<Value> {
        self.command("get_scene_info", Map::new()).await
    }

    /// Inspect one object by name.
    pub async fn object_info(&self, name: &str) -> crate::Result<Value> {
        let mut params = Map::new();
        params.insert("name".into(), json!(name));
        self.command("get_object_info", params).await
    }

    /// Execute a source fragment and return its captured output.
    pub async fn execute_code(&self, code: &str) -> crate::Result<Value> {
        let mut params = Map::new();
        params.insert("code".into(), json!(code));
        self.command("execute_code", params).await
    }

    /// Capture the viewport.
    pub async fn screenshot(
        &self,
        max_size: Option<u32>,
        filepath: Option<&str>,
        format: Option<&str>,
    ) -> crate::Result<Value> {
        let mut params = Map::new();
        if let Some(max_size) = max_size {
            params.insert("max_size".into(), json!(max_size));
        }
        if let Some(filepath) = filepath {
            params.insert("filepath".into(), json!(filepath));
        }
        if let Some(format) = format {
            params.insert("format".into(), json!(format));
        }
        self.command("get_viewport_screenshot", params).await
    }

    /// Ask the host process to shut down. The reply arrives before the
    /// endpoint stops listening.
    pub async fn shutdown(&self) -> crate::Result<Value> {
        self.command("server_shutdown", Map::new()).await
    }
}
