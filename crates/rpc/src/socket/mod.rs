//! Socket seam between the transport and a concrete connection.
//!
//! A [`Connector`] produces a [`Connection`]: a pair of channels carrying
//! outbound [`Frame`]s and inbound [`SocketEvent`]s. The first inbound event
//! is [`SocketEvent::Open`] once the connection is established, or
//! [`SocketEvent::Error`] followed by [`SocketEvent::Closed`] if it fails.
//! [`SocketEvent::Closed`] is always the last event of a connection.

use tokio::sync::mpsc;

use crate::Result;
use crate::types::CloseEvent;

pub mod memory;
pub mod ws;

/// Outbound unit written to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
	/// A serialized JSON-RPC message.
	Text(String),
	/// Start the close handshake.
	Close(CloseEvent),
}

/// Inbound socket lifecycle and data.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
	/// The connection is established.
	Open,
	/// A text message arrived.
	Message(String),
	/// The socket reported an error.
	Error(String),
	/// The socket terminated.
	Closed(CloseEvent),
}

/// Channel pair connecting the transport to a live socket.
#[derive(Debug)]
pub struct Connection {
	/// Frames to write.
	pub outbound: mpsc::UnboundedSender<Frame>,
	/// Events read from the socket.
	pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// The socket-facing end of a [`Connection`].
#[derive(Debug)]
pub struct Endpoint {
	/// Frames the transport asked to write.
	pub frames: mpsc::UnboundedReceiver<Frame>,
	/// Sink for socket events.
	pub events: mpsc::UnboundedSender<SocketEvent>,
}

impl Connection {
	/// Creates a connected channel pair.
	pub fn pair() -> (Connection, Endpoint) {
		let (frame_tx, frame_rx) = mpsc::unbounded_channel();
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		(
			Connection {
				outbound: frame_tx,
				inbound: event_rx,
			},
			Endpoint {
				frames: frame_rx,
				events: event_tx,
			},
		)
	}
}

/// Factory for socket connections.
///
/// `connect` must return promptly; establishing the connection happens in the
/// background and is reported through the inbound channel.
pub trait Connector: Send + Sync + 'static {
	/// Starts a new connection.
	fn connect(&self) -> Result<Connection>;
}
