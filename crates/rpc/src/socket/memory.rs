//! In-process connector.
//!
//! [`memory`] returns a connector and the server half that accepts one
//! [`MemoryPeer`] per connection. The peer plays the engine: it reads the
//! requests the transport wrote and pushes responses, notifications and
//! lifecycle events back. A close frame written by the transport is answered
//! with [`SocketEvent::Closed`] carrying the same code and reason.

use serde_json::{Value as JsonValue, json};
use tokio::sync::mpsc;
use tracing::warn;

use super::{Connection, Connector, Endpoint, Frame, SocketEvent};
use crate::types::{CloseEvent, JSONRPC_VERSION};
use crate::{Error, Result};

/// Creates a connected connector/server pair.
pub fn memory() -> (MemoryConnector, MemoryServer) {
	let (accept_tx, accept_rx) = mpsc::unbounded_channel();
	(
		MemoryConnector {
			accept_tx,
			auto_open: true,
		},
		MemoryServer { accept_rx },
	)
}

/// Client half of [`memory`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
	accept_tx: mpsc::UnboundedSender<MemoryPeer>,
	auto_open: bool,
}

impl MemoryConnector {
	/// Leaves opening to [`MemoryPeer::open`] instead of opening on connect.
	pub fn manual_open(mut self) -> Self {
		self.auto_open = false;
		self
	}
}

impl Connector for MemoryConnector {
	fn connect(&self) -> Result<Connection> {
		let (connection, Endpoint { frames, events }) = Connection::pair();
		let (request_tx, request_rx) = mpsc::unbounded_channel();
		tokio::spawn(relay(frames, request_tx, events.clone()));
		if self.auto_open {
			let _ = events.send(SocketEvent::Open);
		}
		self.accept_tx
			.send(MemoryPeer {
				requests: request_rx,
				events,
			})
			.map_err(|_| Error::NotConnected("memory server dropped".into()))?;
		Ok(connection)
	}
}

async fn relay(mut frames: mpsc::UnboundedReceiver<Frame>, requests: mpsc::UnboundedSender<String>, events: mpsc::UnboundedSender<SocketEvent>) {
	while let Some(frame) = frames.recv().await {
		match frame {
			Frame::Text(text) => {
				let _ = requests.send(text);
			}
			Frame::Close(close) => {
				let _ = events.send(SocketEvent::Closed(close));
				return;
			}
		}
	}
}

/// Server half of [`memory`].
#[derive(Debug)]
pub struct MemoryServer {
	accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
	/// Waits for the next connection.
	pub async fn accept(&mut self) -> Option<MemoryPeer> {
		self.accept_rx.recv().await
	}
}

/// Engine side of one in-process connection.
#[derive(Debug)]
pub struct MemoryPeer {
	requests: mpsc::UnboundedReceiver<String>,
	events: mpsc::UnboundedSender<SocketEvent>,
}

impl MemoryPeer {
	/// Reports the connection as established.
	pub fn open(&self) {
		let _ = self.events.send(SocketEvent::Open);
	}

	/// Waits for the next request. `None` once the client closed or dropped
	/// the connection.
	pub async fn recv(&mut self) -> Option<JsonValue> {
		while let Some(text) = self.requests.recv().await {
			match serde_json::from_str(&text) {
				Ok(message) => return Some(message),
				Err(e) => warn!(target: "qix", error = %e, "memory peer received invalid json"),
			}
		}
		None
	}

	/// Returns an already written request without waiting.
	pub fn try_recv(&mut self) -> Option<JsonValue> {
		let text = self.requests.try_recv().ok()?;
		serde_json::from_str(&text).ok()
	}

	/// Pushes a raw message to the client.
	pub fn send(&self, message: JsonValue) {
		let _ = self.events.send(SocketEvent::Message(message.to_string()));
	}

	/// Answers `request` with `result`.
	pub fn reply(&self, request: &JsonValue, result: JsonValue) {
		self.send(json!({"jsonrpc": JSONRPC_VERSION, "id": request["id"], "result": result}));
	}

	/// Answers `request` with a wire error.
	pub fn reply_error(&self, request: &JsonValue, code: i64, message: &str) {
		self.send(json!({
			"jsonrpc": JSONRPC_VERSION,
			"id": request["id"],
			"error": {"code": code, "message": message, "parameter": ""},
		}));
	}

	/// Pushes a notification.
	pub fn notify(&self, method: &str, params: JsonValue) {
		self.send(json!({"jsonrpc": JSONRPC_VERSION, "method": method, "params": params}));
	}

	/// Reports a socket error.
	pub fn error(&self, reason: &str) {
		let _ = self.events.send(SocketEvent::Error(reason.to_owned()));
	}

	/// Terminates the connection from the engine side.
	pub fn close(&self, code: u16, reason: &str) {
		let _ = self.events.send(SocketEvent::Closed(CloseEvent::new(code, reason)));
	}
}
