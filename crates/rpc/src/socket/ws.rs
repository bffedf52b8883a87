//! WebSocket connector.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, warn};
use url::Url;

use super::{Connection, Connector, Endpoint, Frame, SocketEvent};
use crate::types::CloseEvent;
use crate::{Error, Result};

/// Close code reported when the peer closes without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// Connects to the engine over `ws://` or `wss://`.
#[derive(Debug, Clone)]
pub struct WsConnector {
	url: Url,
	headers: Vec<(String, String)>,
}

impl WsConnector {
	/// Creates a connector for `url`.
	pub fn new(url: &str) -> Result<Self> {
		let url = Url::parse(url).map_err(|e| Error::Protocol(format!("invalid url {url}: {e}")))?;
		if !matches!(url.scheme(), "ws" | "wss") {
			return Err(Error::Protocol(format!("unsupported scheme: {}", url.scheme())));
		}
		Ok(Self {
			url,
			headers: Vec::new(),
		})
	}

	/// Adds a header to the upgrade request.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	/// Target url.
	pub fn url(&self) -> &Url {
		&self.url
	}

	fn request(&self) -> Result<Request> {
		let mut request = self
			.url
			.as_str()
			.into_client_request()
			.map_err(|e| Error::Protocol(e.to_string()))?;
		for (name, value) in &self.headers {
			let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::Protocol(e.to_string()))?;
			let value = HeaderValue::from_str(value).map_err(|e| Error::Protocol(e.to_string()))?;
			request.headers_mut().insert(name, value);
		}
		Ok(request)
	}
}

impl Connector for WsConnector {
	fn connect(&self) -> Result<Connection> {
		let request = self.request()?;
		let (connection, endpoint) = Connection::pair();
		tokio::spawn(run_socket(request, endpoint));
		Ok(connection)
	}
}

/// Drives one WebSocket until it closes.
async fn run_socket(request: Request, endpoint: Endpoint) {
	let Endpoint { mut frames, events } = endpoint;
	let uri = request.uri().to_string();

	let stream = match connect_async(request).await {
		Ok((stream, _response)) => stream,
		Err(e) => {
			warn!(target: "qix", uri = %uri, error = %e, "websocket connect failed");
			let _ = events.send(SocketEvent::Error(e.to_string()));
			let _ = events.send(SocketEvent::Closed(CloseEvent::abnormal(e.to_string())));
			return;
		}
	};
	debug!(target: "qix", uri = %uri, "websocket connected");
	let _ = events.send(SocketEvent::Open);

	let (mut sink, mut stream) = stream.split();
	let mut writable = true;
	loop {
		tokio::select! {
			frame = frames.recv(), if writable => match frame {
				Some(Frame::Text(text)) => {
					if let Err(e) = sink.send(Message::Text(text)).await {
						let _ = events.send(SocketEvent::Error(e.to_string()));
						let _ = events.send(SocketEvent::Closed(CloseEvent::abnormal(e.to_string())));
						return;
					}
				}
				Some(Frame::Close(close)) => {
					let frame = CloseFrame {
						code: CloseCode::from(close.code),
						reason: close.reason.into(),
					};
					if sink.send(Message::Close(Some(frame))).await.is_err() {
						let _ = events.send(SocketEvent::Closed(CloseEvent::abnormal("close handshake failed")));
						return;
					}
					writable = false;
				}
				None => {
					let _ = sink.close().await;
					return;
				}
			},
			message = stream.next() => match message {
				Some(Ok(Message::Text(text))) => {
					let _ = events.send(SocketEvent::Message(text));
				}
				Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
					Ok(text) => {
						let _ = events.send(SocketEvent::Message(text));
					}
					Err(e) => warn!(target: "qix", error = %e, "dropping non-utf8 binary frame"),
				},
				Some(Ok(Message::Close(frame))) => {
					let close = frame.map_or_else(
						|| CloseEvent::new(CLOSE_NO_STATUS, ""),
						|f| CloseEvent::new(u16::from(f.code), f.reason.into_owned()),
					);
					let _ = events.send(SocketEvent::Closed(close));
					return;
				}
				Some(Ok(_)) => {}
				Some(Err(e)) => {
					let _ = events.send(SocketEvent::Error(e.to_string()));
					let _ = events.send(SocketEvent::Closed(CloseEvent::abnormal(e.to_string())));
					return;
				}
				None => {
					let _ = events.send(SocketEvent::Closed(CloseEvent::abnormal("stream ended")));
					return;
				}
			},
		}
	}
}
