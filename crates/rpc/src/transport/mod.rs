//! Socket ownership and call correlation.
//!
//! A [`Transport`] wraps at most one live connection at a time. Each
//! connection gets a generation number from a monotonic clock and its own
//! reader task; events that arrive from a superseded generation are dropped,
//! so a forced reconnect can never be disturbed by the tail of the previous
//! socket.
//!
//! # Lifecycle
//!
//! [`Transport::open`] registers two lifecycle sentinels in the resolver
//! registry: "opened" settles when the socket reports open (or fails if the
//! socket errors or closes first) and "closed" settles with the close code and
//! reason when the socket terminates. Both are exposed as shared futures so
//! any number of callers can await them.
//!
//! A socket error after open is reported as [`TransportEvent::SocketError`]
//! rather than failing the already completed open. Errors and closure both
//! fail every outstanding call with [`Error::NotConnected`]; the sentinels are
//! never touched by that sweep.
//!
//! # Routing
//!
//! Every inbound message is announced as [`TransportEvent::Traffic`], annotated
//! with the handle of the call it answers when known. A message whose id is
//! pending is then emitted as [`TransportEvent::Message`] and settles its call;
//! an id-less message with `params` becomes [`TransportEvent::Notification`];
//! everything else is a plain [`TransportEvent::Message`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{EventBus, Subscription};
use crate::protocol::{self, CounterIdGen, Inbound};
use crate::resolver::{ResolverId, ResolverRegistry};
use crate::socket::{Connector, Frame, SocketEvent};
use crate::types::{CloseEvent, Direction, Handle, JSONRPC_VERSION, Notification, RequestId, RpcRequest};
use crate::{Error, Result};


/// Socket state as seen by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
	/// Never connected.
	Idle,
	/// Connect issued, waiting for open.
	Connecting,
	/// Calls may be written.
	Open,
	/// Close handshake in progress.
	Closing,
	/// Terminated.
	Closed,
}

/// Events emitted by a [`Transport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
	/// A message was written or read.
	Traffic {
		/// Sent or received.
		direction: Direction,
		/// The message as JSON.
		message: JsonValue,
		/// Target handle of the call involved, when known.
		handle: Option<Handle>,
	},
	/// An id-less message carrying parameters.
	Notification(Notification),
	/// Any other inbound message, responses included.
	Message(JsonValue),
	/// The socket terminated.
	Closed(CloseEvent),
	/// A socket error after the connection was established.
	SocketError(String),
}

enum Settled {
	Opened,
	Closed(CloseEvent),
	Response(JsonValue),
}

type OpenedFuture = Shared<BoxFuture<'static, Result<()>>>;
type ClosedFuture = Shared<BoxFuture<'static, CloseEvent>>;

/// Monotonic generation clock for connections.
#[derive(Debug, Default)]
struct GenerationClock {
	next: AtomicU64,
}

impl GenerationClock {
	fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

struct State {
	ready: ReadyState,
	generation: u64,
	outbound: Option<mpsc::UnboundedSender<Frame>>,
	opened: Option<OpenedFuture>,
	closed: Option<ClosedFuture>,
	reader: Option<CancellationToken>,
}

struct Inner {
	connector: Arc<dyn Connector>,
	state: Mutex<State>,
	resolvers: ResolverRegistry<Settled, Error>,
	ids: Mutex<CounterIdGen>,
	generations: GenerationClock,
	events: EventBus<TransportEvent>,
}

/// JSON-RPC transport over a [`Connector`].
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct Transport {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for Transport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("Transport")
			.field("ready", &state.ready)
			.field("generation", &state.generation)
			.finish_non_exhaustive()
	}
}

impl Transport {
	/// Creates an idle transport.
	pub fn new(connector: impl Connector) -> Self {
		Self::from_shared(Arc::new(connector))
	}

	/// Creates an idle transport over a shared connector.
	pub fn from_shared(connector: Arc<dyn Connector>) -> Self {
		Self {
			inner: Arc::new(Inner {
				connector,
				state: Mutex::new(State {
					ready: ReadyState::Idle,
					generation: 0,
					outbound: None,
					opened: None,
					closed: None,
					reader: None,
				}),
				resolvers: ResolverRegistry::new(),
				ids: Mutex::new(CounterIdGen::new()),
				generations: GenerationClock::default(),
				events: EventBus::new(),
			}),
		}
	}

	/// Connects and waits until the socket is open.
	///
	/// Without `force`, a transport that already connected once returns the
	/// outcome of that connection. With `force`, the current connection (if
	/// any) is abandoned and a new one started.
	pub async fn open(&self, force: bool) -> Result<()> {
		let opened = {
			let mut state = self.inner.state.lock();
			match &state.opened {
				Some(opened) if !force => opened.clone(),
				_ => self.connect(&mut state)?,
			}
		};
		opened.await
	}

	fn connect(&self, state: &mut State) -> Result<OpenedFuture> {
		let superseded = state.outbound.take().is_some();
		if let Some(reader) = state.reader.take() {
			reader.cancel();
		}
		if superseded {
			let failed = self.inner.resolvers.reject_all(Error::NotConnected("connection superseded".into()));
			debug!(target: "qix", failed, "previous connection superseded");
		}
		let connection = self.inner.connector.connect()?;
		let generation = self.inner.generations.next();

		let opened_rx = self.inner.resolvers.register(ResolverId::Opened, None);
		let closed_rx = self.inner.resolvers.register(ResolverId::Closed, None);
		let opened: OpenedFuture = async move {
			match opened_rx.await {
				Ok(Ok(_)) => Ok(()),
				Ok(Err(e)) => Err(e),
				Err(_) => Err(Error::NotConnected("connection superseded".into())),
			}
		}
		.boxed()
		.shared();
		let closed: ClosedFuture = async move {
			match closed_rx.await {
				Ok(Ok(Settled::Closed(event))) => event,
				_ => CloseEvent::abnormal("connection superseded"),
			}
		}
		.boxed()
		.shared();

		let reader = CancellationToken::new();
		tokio::spawn(read_loop(Arc::downgrade(&self.inner), generation, connection.inbound, reader.clone()));

		state.ready = ReadyState::Connecting;
		state.generation = generation;
		state.outbound = Some(connection.outbound);
		state.opened = Some(opened.clone());
		state.closed = Some(closed);
		state.reader = Some(reader);
		info!(target: "qix", generation, "transport connecting");
		Ok(opened)
	}

	/// Writes `request` and waits for its raw response object.
	///
	/// Fails with [`Error::NotConnected`] without writing anything unless the
	/// socket is open. Assigns a correlation id when the request has none and
	/// stamps the protocol version.
	pub async fn send(&self, mut request: RpcRequest) -> Result<JsonValue> {
		let outbound = {
			let state = self.inner.state.lock();
			match (&state.outbound, state.ready) {
				(Some(tx), ReadyState::Open) => tx.clone(),
				_ => return Err(Error::NotConnected("Not connected".into())),
			}
		};

		let id = match request.id {
			Some(id) => id,
			None => self.next_request_id(),
		};
		request.id = Some(id);
		request.jsonrpc = JSONRPC_VERSION.to_owned();
		let message = serde_json::to_value(&request)?;

		let rx = self.inner.resolvers.register(ResolverId::Call(id), Some(request.handle));
		debug!(target: "qix", id = id.0, method = %request.method, handle = request.handle.0, "sending");
		self.inner.events.emit(&TransportEvent::Traffic {
			direction: Direction::Sent,
			message: message.clone(),
			handle: Some(request.handle),
		});
		if outbound.send(Frame::Text(message.to_string())).is_err() {
			self.inner
				.resolvers
				.reject(ResolverId::Call(id), Error::NotConnected("socket writer gone".into()));
		}

		match rx.await {
			Ok(Ok(Settled::Response(response))) => Ok(response),
			Ok(Ok(_)) => Err(Error::Protocol(format!("call {id} settled by a lifecycle event"))),
			Ok(Err(e)) => Err(e),
			Err(_) => Err(Error::NotConnected("transport dropped".into())),
		}
	}

	/// Starts the close handshake and waits for the socket to terminate.
	///
	/// Returns immediately with the requested code when there is no
	/// connection; returns the recorded event when already closed.
	pub async fn close(&self, code: u16, reason: impl Into<String>) -> CloseEvent {
		let requested = CloseEvent::new(code, reason);
		let closed = {
			let mut state = self.inner.state.lock();
			if let (Some(tx), ReadyState::Open | ReadyState::Connecting) = (&state.outbound, state.ready) {
				let _ = tx.send(Frame::Close(requested.clone()));
				state.ready = ReadyState::Closing;
			}
			state.closed.clone()
		};
		info!(target: "qix", code, "transport closing");
		match closed {
			Some(closed) => closed.await,
			None => requested,
		}
	}

	/// Waits for the current connection to terminate. `None` if never opened.
	pub async fn closed(&self) -> Option<CloseEvent> {
		let closed = self.inner.state.lock().closed.clone();
		match closed {
			Some(closed) => Some(closed.await),
			None => None,
		}
	}

	/// Allocates the next correlation id.
	pub fn next_request_id(&self) -> RequestId {
		self.inner.ids.lock().next()
	}

	/// Current socket state.
	pub fn ready_state(&self) -> ReadyState {
		self.inner.state.lock().ready
	}

	/// Number of calls awaiting a response.
	pub fn pending_calls(&self) -> usize {
		self.inner.resolvers.pending_calls()
	}

	/// Subscribes to transport events.
	pub fn on(&self, handler: impl Fn(&TransportEvent) + Send + Sync + 'static) -> Subscription {
		self.inner.events.subscribe(handler)
	}
}

async fn read_loop(inner: Weak<Inner>, generation: u64, mut inbound: mpsc::UnboundedReceiver<SocketEvent>, cancel: CancellationToken) {
	loop {
		let event = tokio::select! {
			_ = cancel.cancelled() => return,
			event = inbound.recv() => event,
		};
		let Some(inner) = inner.upgrade() else {
			return;
		};
		let event = event.unwrap_or_else(|| SocketEvent::Closed(CloseEvent::abnormal("socket dropped")));
		let terminal = matches!(event, SocketEvent::Closed(_));
		inner.on_socket_event(generation, event);
		if terminal {
			return;
		}
	}
}

impl Inner {
	fn on_socket_event(&self, generation: u64, event: SocketEvent) {
		let current = self.state.lock().generation;
		if current != generation {
			warn!(target: "qix", generation, current, "dropping event from superseded connection");
			return;
		}

		match event {
			SocketEvent::Open => {
				self.state.lock().ready = ReadyState::Open;
				info!(target: "qix", generation, "transport open");
				self.resolvers.resolve(ResolverId::Opened, Settled::Opened);
			}
			SocketEvent::Message(text) => self.on_message(&text),
			SocketEvent::Error(reason) => {
				warn!(target: "qix", generation, %reason, "socket error");
				if !self.resolvers.reject(ResolverId::Opened, Error::Socket(reason.clone())) {
					self.events.emit(&TransportEvent::SocketError(reason.clone()));
				}
				self.resolvers.reject_all(Error::NotConnected(reason));
			}
			SocketEvent::Closed(event) => {
				{
					let mut state = self.state.lock();
					state.ready = ReadyState::Closed;
					state.outbound = None;
					state.reader = None;
				}
				info!(target: "qix", generation, code = event.code, reason = %event.reason, "transport closed");
				self.resolvers.reject(
					ResolverId::Opened,
					Error::NotConnected(format!("socket closed before open ({})", event.code)),
				);
				self.events.emit(&TransportEvent::Closed(event.clone()));
				self.resolvers.resolve(ResolverId::Closed, Settled::Closed(event));
				self.resolvers.reject_all(Error::NotConnected("Socket closed".into()));
			}
		}
	}

	fn on_message(&self, text: &str) {
		let message: JsonValue = match serde_json::from_str(text) {
			Ok(message) => message,
			Err(e) => {
				warn!(target: "qix", error = %e, "dropping malformed inbound message");
				return;
			}
		};

		let handle = protocol::message_id(&message).and_then(|id| self.resolvers.handle_of(ResolverId::Call(id)));
		debug!(target: "qix", handle = ?handle, "received");
		self.events.emit(&TransportEvent::Traffic {
			direction: Direction::Received,
			message: message.clone(),
			handle,
		});

		match protocol::classify(message, |id| self.resolvers.contains(ResolverId::Call(id))) {
			Inbound::Response(id, response) => {
				self.events.emit(&TransportEvent::Message(response.clone()));
				self.resolvers.resolve(ResolverId::Call(id), Settled::Response(response));
			}
			Inbound::Notification(notification) => self.events.emit(&TransportEvent::Notification(notification)),
			Inbound::Message(message) => self.events.emit(&TransportEvent::Message(message)),
		}
	}
}
