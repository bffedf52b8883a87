//! Session lifecycle and call dispatch.
//!
//! A [`Session`] owns one [`Transport`], the object cache, the delta store
//! and the interceptor chains. Its lifecycle is
//!
//! ```text
//! Unopened -> Opening -> Opened <-> Suspended
//!                           \           /
//!                            -> Closed <-
//! ```
//!
//! `Closed` is terminal. While `Suspended` no call reaches the socket and
//! engine pushes are ignored; [`Session::resume`] reconnects and rebinds
//! every cached object to its new handle (see the `suspend` module).
//!
//! Transport events are folded into [`SessionEvent`]s and [`ObjectEvent`]s
//! synchronously on the transport's reader task.

mod suspend;

#[cfg(test)]
mod tests;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use qix_rpc::{
	CLOSE_MANUAL_SUSPEND, CLOSE_NORMAL, CloseEvent, Connector, Direction, EventBus, Handle, JsonValue, Notification, RequestId,
	Subscription, Transport, TransportEvent, WsConnector,
};
use tower_layer::Layer;
use tracing::{debug, info, warn};

pub use suspend::AttachState;

use crate::api::Global;
use crate::cache::ApiCache;
use crate::config::SessionConfig;
use crate::delta::DeltaStore;
use crate::intercept::{CallContext, Interceptors, Position, Reply, Request, RequestInterceptor, ResponseInterceptor};
use crate::object::{Invoke, ObjectEvent, ObjectLayer, RemoteObject, SchemaInvoker};
use crate::schema::Schema;
use crate::{Error, Result};

const GLOBAL: &str = "Global";

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	/// [`Session::open`] not called yet.
	Unopened,
	/// Connecting.
	Opening,
	/// Calls flow.
	Opened,
	/// Disconnected on purpose or by the network; may be resumed.
	Suspended,
	/// Terminated.
	Closed,
}

/// Who suspended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
	/// [`Session::suspend`] was called.
	Manual,
	/// The socket dropped and `suspend_on_close` is set.
	Network,
}

/// Events of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
	/// The socket opened and the global object exists.
	Opened,
	/// The session entered the suspended state.
	Suspended {
		/// Who suspended it.
		initiator: Initiator,
		/// Close code of the dropped socket.
		code: u16,
		/// Close reason of the dropped socket.
		reason: String,
	},
	/// A suspended session was restored.
	Resumed,
	/// The session terminated.
	Closed(CloseEvent),
	/// The engine pushed a notification.
	Notification(Notification),
	/// A message was written or read.
	Traffic {
		/// Sent or received.
		direction: Direction,
		/// Raw message.
		message: JsonValue,
		/// Handle of the call involved, when known.
		handle: Option<Handle>,
	},
	/// The socket reported an error while open.
	SocketError(String),
}

type OpenFuture = Shared<BoxFuture<'static, Result<Global>>>;

struct Lifecycle {
	phase: SessionState,
	opening: Option<OpenFuture>,
	reconnect: bool,
}

pub(crate) struct SessionInner {
	config: SessionConfig,
	transport: Transport,
	schema: Arc<Schema>,
	interceptors: Interceptors,
	layers: Vec<Arc<dyn ObjectLayer>>,
	apis: ApiCache,
	deltas: DeltaStore,
	events: EventBus<SessionEvent>,
	lifecycle: Mutex<Lifecycle>,
	open_doc_params: Mutex<Option<JsonValue>>,
	_transport_events: Mutex<Option<Subscription>>,
}

/// A session with one engine.
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}

impl Session {
	/// Starts building a session for `config`.
	pub fn builder(config: SessionConfig) -> SessionBuilder {
		SessionBuilder::new(config)
	}

	pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
		Self { inner }
	}

	/// The configuration the session was built with.
	pub fn config(&self) -> &SessionConfig {
		&self.inner.config
	}

	/// The schema objects are generated from.
	pub fn schema(&self) -> &Schema {
		&self.inner.schema
	}

	/// The underlying transport.
	pub fn transport(&self) -> &Transport {
		&self.inner.transport
	}

	pub(crate) fn deltas(&self) -> &DeltaStore {
		&self.inner.deltas
	}

	/// Current lifecycle phase.
	pub fn state(&self) -> SessionState {
		self.inner.lifecycle.lock().phase
	}

	/// Subscribes to session events.
	pub fn on(&self, handler: impl Fn(&SessionEvent) + Send + Sync + 'static) -> Subscription {
		self.inner.events.subscribe(handler)
	}

	/// The cached object at `handle`.
	pub fn object(&self, handle: Handle) -> Option<RemoteObject> {
		self.inner.apis.get(handle)
	}

	/// Every cached object in handle order.
	pub fn objects(&self) -> Vec<RemoteObject> {
		self.inner.apis.all()
	}

	/// Connects and returns the global object.
	///
	/// Concurrent and repeated calls share one attempt; a failed attempt is
	/// forgotten so the next call connects again.
	pub async fn open(&self) -> Result<Global> {
		let opening = {
			let mut lifecycle = self.inner.lifecycle.lock();
			if lifecycle.phase == SessionState::Closed {
				return Err(Error::NotConnected("session closed".into()));
			}
			match &lifecycle.opening {
				Some(opening) => opening.clone(),
				None => {
					let weak = Arc::downgrade(&self.inner);
					let reconnect = lifecycle.reconnect;
					let opening = async move {
						let inner = weak.upgrade().ok_or_else(|| Error::NotConnected("session dropped".into()))?;
						Session::from_inner(inner).establish(reconnect).await
					}
					.boxed()
					.shared();
					lifecycle.phase = SessionState::Opening;
					lifecycle.opening = Some(opening.clone());
					opening
				}
			}
		};

		let result = opening.await;
		if let Err(e) = &result {
			warn!(target: "qix", error = %e, "session open failed");
			let mut lifecycle = self.inner.lifecycle.lock();
			if lifecycle.phase == SessionState::Opening {
				lifecycle.phase = SessionState::Unopened;
				lifecycle.opening = None;
				lifecycle.reconnect = true;
			}
		}
		result
	}

	async fn establish(&self, reconnect: bool) -> Result<Global> {
		self.inner.transport.open(reconnect).await?;
		let global = self.materialize(Handle::GLOBAL, GLOBAL, GLOBAL, Some(GLOBAL))?;
		{
			let mut lifecycle = self.inner.lifecycle.lock();
			if lifecycle.phase == SessionState::Opening {
				lifecycle.phase = SessionState::Opened;
			}
		}
		info!(target: "qix", url = %self.inner.config.url, "session opened");
		self.inner.events.emit(&SessionEvent::Opened);
		Global::try_from(global)
	}

	/// Issues `request` through the interceptor chains.
	///
	/// A suspended session fails the call with [`Error::SessionSuspended`]
	/// without writing anything.
	pub fn send(&self, request: Request) -> Call {
		let id = self.inner.transport.next_request_id();
		let future = if self.state() == SessionState::Suspended {
			futures::future::ready(Err(Error::SessionSuspended)).boxed()
		} else {
			self.clone().dispatch(id, request.clone()).boxed()
		};
		Call {
			id,
			session: self.clone(),
			request,
			future,
		}
	}

	async fn dispatch(self, id: RequestId, request: Request) -> Result<Reply> {
		if self.state() == SessionState::Suspended {
			return Err(Error::SessionSuspended);
		}
		let (request, outcome) = match self.inner.interceptors.request(&self, request.clone()).await {
			Ok(request) => {
				debug!(target: "qix", id = id.0, method = %request.method, handle = request.handle.0, "call");
				let outcome = self
					.inner
					.transport
					.send(request.to_rpc(id))
					.await
					.map(Reply::Value)
					.map_err(Error::from);
				(request, outcome)
			}
			Err(e) => (request, Err(e)),
		};
		let call = CallContext::new(self.clone(), request, id);
		self.inner.interceptors.response(&call, outcome).await
	}

	/// Suspends with the manual-suspend close code.
	pub async fn suspend(&self) -> Result<()> {
		self.suspend_with(CLOSE_MANUAL_SUSPEND, "").await
	}

	/// Closes the socket but keeps every object for a later
	/// [`resume`](Self::resume). Pending calls fail with
	/// [`Error::NotConnected`].
	pub async fn suspend_with(&self, code: u16, reason: &str) -> Result<()> {
		{
			let mut lifecycle = self.inner.lifecycle.lock();
			match lifecycle.phase {
				SessionState::Opened => lifecycle.phase = SessionState::Suspended,
				SessionState::Suspended => return Ok(()),
				_ => return Err(Error::NotConnected("session is not open".into())),
			}
		}
		self.inner.transport.close(code, reason).await;
		info!(target: "qix", code, "session suspended");
		self.inner.events.emit(&SessionEvent::Suspended {
			initiator: Initiator::Manual,
			code,
			reason: reason.to_owned(),
		});
		Ok(())
	}

	/// Closes with the normal close code.
	pub async fn close(&self) -> CloseEvent {
		self.close_with(CLOSE_NORMAL, "").await
	}

	/// Terminates the session: closes the socket, then closes every object.
	pub async fn close_with(&self, code: u16, reason: &str) -> CloseEvent {
		let previous = std::mem::replace(&mut self.inner.lifecycle.lock().phase, SessionState::Closed);
		let event = self.inner.transport.close(code, reason).await;
		if previous != SessionState::Closed {
			info!(target: "qix", code = event.code, "session closed");
			self.inner.events.emit(&SessionEvent::Closed(event.clone()));
			self.inner.teardown();
		}
		event
	}

	/// Returns the cached object at `handle`, creating it from the schema
	/// when the cache has none.
	pub(crate) fn materialize(&self, handle: Handle, kind: &str, id: &str, generic_type: Option<&str>) -> Result<RemoteObject> {
		self.inner.apis.get_or_try_insert_with(handle, || {
			self.inner.schema.type_def(kind)?;
			let invoker = self
				.inner
				.layers
				.iter()
				.filter(|layer| layer.applies_to(kind, generic_type))
				.fold(Arc::new(SchemaInvoker) as Arc<dyn Invoke>, |inner, layer| layer.layer(inner));
			Ok(RemoteObject::new(
				handle,
				id,
				kind,
				generic_type.map(str::to_owned),
				Arc::downgrade(&self.inner),
				invoker,
			))
		})
	}
}

impl SessionInner {
	fn phase(&self) -> SessionState {
		self.lifecycle.lock().phase
	}

	fn on_transport_event(&self, event: &TransportEvent) {
		match event {
			TransportEvent::Traffic {
				direction,
				message,
				handle,
			} => {
				if *direction == Direction::Sent && message.get("method").and_then(JsonValue::as_str) == Some("OpenDoc") {
					*self.open_doc_params.lock() = message.get("params").cloned();
				}
				self.events.emit(&SessionEvent::Traffic {
					direction: *direction,
					message: message.clone(),
					handle: *handle,
				});
				if let Some(object) = handle.and_then(|h| self.apis.get(h)) {
					object.emit(&ObjectEvent::Traffic {
						direction: *direction,
						message: message.clone(),
					});
				}
			}
			TransportEvent::Notification(notification) => {
				self.events.emit(&SessionEvent::Notification(notification.clone()));
			}
			TransportEvent::Message(message) => self.on_message(message),
			TransportEvent::Closed(event) => self.on_socket_closed(event),
			TransportEvent::SocketError(reason) => {
				if self.phase() != SessionState::Suspended {
					self.events.emit(&SessionEvent::SocketError(reason.clone()));
				}
			}
		}
	}

	fn on_message(&self, message: &JsonValue) {
		if self.phase() == SessionState::Suspended {
			return;
		}
		for handle in handles(message, "change") {
			if let Some(object) = self.apis.get(handle) {
				object.emit(&ObjectEvent::Changed);
			}
		}
		for handle in handles(message, "close") {
			self.deltas.drop_handle(handle);
			if let Some(object) = self.apis.get(handle) {
				object.close();
			}
		}
	}

	fn on_socket_closed(&self, event: &CloseEvent) {
		let suspend = {
			let mut lifecycle = self.lifecycle.lock();
			if lifecycle.phase != SessionState::Opened || event.is_deliberate() {
				return;
			}
			lifecycle.phase = if self.config.suspend_on_close {
				SessionState::Suspended
			} else {
				SessionState::Closed
			};
			self.config.suspend_on_close
		};

		if suspend {
			warn!(target: "qix", code = event.code, reason = %event.reason, "socket dropped, session suspended");
			self.events.emit(&SessionEvent::Suspended {
				initiator: Initiator::Network,
				code: event.code,
				reason: event.reason.clone(),
			});
		} else {
			warn!(target: "qix", code = event.code, reason = %event.reason, "socket dropped, session closed");
			self.events.emit(&SessionEvent::Closed(event.clone()));
			self.teardown();
		}
	}

	fn teardown(&self) {
		for object in self.apis.drain() {
			object.close();
		}
		self.deltas.clear();
	}
}

fn handles<'a>(message: &'a JsonValue, field: &str) -> impl Iterator<Item = Handle> + 'a {
	message
		.get(field)
		.and_then(JsonValue::as_array)
		.into_iter()
		.flatten()
		.filter_map(JsonValue::as_i64)
		.map(Handle)
}

impl fmt::Debug for Session {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("url", &self.inner.config.url)
			.field("state", &self.state())
			.field("objects", &self.inner.apis.len())
			.finish()
	}
}

/// An issued call; resolves to its [`Reply`].
///
/// The request is written when the call is first polled.
#[must_use = "calls do nothing unless awaited"]
pub struct Call {
	id: RequestId,
	session: Session,
	request: Request,
	future: BoxFuture<'static, Result<Reply>>,
}

impl Call {
	/// Correlation id of the call.
	pub fn id(&self) -> RequestId {
		self.id
	}

	/// The request as given to [`Session::send`].
	pub fn request(&self) -> &Request {
		&self.request
	}

	/// Issues the same request again as a new call.
	pub fn retry(&self) -> Call {
		self.session.send(self.request.clone())
	}
}

impl Future for Call {
	type Output = Result<Reply>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.future.as_mut().poll(cx)
	}
}

impl fmt::Debug for Call {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Call").field("id", &self.id).field("method", &self.request.method).finish()
	}
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	config: SessionConfig,
	connector: Option<Arc<dyn Connector>>,
	schema: Option<Schema>,
	interceptors: Interceptors,
	layers: Vec<Arc<dyn ObjectLayer>>,
}

impl SessionBuilder {
	/// Starts from `config` with the built-in schema and interceptors.
	pub fn new(config: SessionConfig) -> Self {
		Self {
			config,
			connector: None,
			schema: None,
			interceptors: Interceptors::builtin(),
			layers: Vec::new(),
		}
	}

	/// Replaces the WebSocket connector built from the config url.
	pub fn connector(mut self, connector: impl Connector) -> Self {
		self.connector = Some(Arc::new(connector));
		self
	}

	/// Replaces the built-in schema.
	pub fn schema(mut self, schema: Schema) -> Self {
		self.schema = Some(schema);
		self
	}

	/// Adds a request interceptor.
	pub fn request_interceptor(mut self, position: Position, interceptor: impl RequestInterceptor + 'static) -> Self {
		self.interceptors.add_request(position, Arc::new(interceptor));
		self
	}

	/// Adds a response interceptor.
	pub fn response_interceptor(mut self, position: Position, interceptor: impl ResponseInterceptor + 'static) -> Self {
		self.interceptors.add_response(position, Arc::new(interceptor));
		self
	}

	/// Wraps the call stack of matching objects; later layers wrap earlier
	/// ones.
	pub fn layer(mut self, layer: impl ObjectLayer + 'static) -> Self {
		self.layers.push(Arc::new(layer));
		self
	}

	/// Builds the session without connecting.
	pub fn build(self) -> Result<Session> {
		let connector: Arc<dyn Connector> = match self.connector {
			Some(connector) => connector,
			None => {
				let connector = self
					.config
					.headers
					.iter()
					.try_fold(WsConnector::new(&self.config.url)?, |connector, (name, value)| {
						Ok::<_, Error>(connector.header(name, value))
					})?;
				Arc::new(connector)
			}
		};
		let schema = match self.schema {
			Some(schema) => schema,
			None => Schema::builtin()?,
		};

		let inner = Arc::new(SessionInner {
			config: self.config,
			transport: Transport::from_shared(connector),
			schema: Arc::new(schema),
			interceptors: self.interceptors,
			layers: self.layers,
			apis: ApiCache::default(),
			deltas: DeltaStore::default(),
			events: EventBus::new(),
			lifecycle: Mutex::new(Lifecycle {
				phase: SessionState::Unopened,
				opening: None,
				reconnect: false,
			}),
			open_doc_params: Mutex::new(None),
			_transport_events: Mutex::new(None),
		});

		let weak = Arc::downgrade(&inner);
		let subscription = inner.transport.on(move |event| {
			if let Some(inner) = weak.upgrade() {
				inner.on_transport_event(event);
			}
		});
		*inner._transport_events.lock() = Some(subscription);
		Ok(Session::from_inner(inner))
	}
}

impl fmt::Debug for SessionBuilder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("SessionBuilder")
			.field("config", &self.config)
			.field("interceptors", &self.interceptors)
			.field("layers", &self.layers.len())
			.finish()
	}
}

/// Builds a WebSocket session from `config` with the built-in schema.
pub fn create(config: SessionConfig) -> Result<Session> {
	Session::builder(config).build()
}
