//! Remote objects: client-side capabilities for engine handles.
//!
//! A [`RemoteObject`] is a cheap handle-sized clone; every clone refers to
//! the same object, so handle rebinding after a resume is visible through
//! all of them. Calls go through a per-object [`Invoke`] stack: the schema
//! invoker at the bottom, wrapped by every [`ObjectLayer`] whose
//! [`applies_to`](ObjectLayer::applies_to) accepts the object's type.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use qix_rpc::{Direction, EventBus, Handle, JsonValue, Subscription};
use tower_layer::Layer;
use tracing::trace;

use crate::intercept::{Reply, Request};
use crate::schema::{MethodDef, Params};
use crate::session::{Session, SessionInner};
use crate::{Error, Result};

/// Events of one remote object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEvent {
	/// The engine reported the object's state as changed.
	Changed,
	/// The object is gone; no further events follow.
	Closed,
	/// A message addressed to or from this object's handle.
	Traffic {
		/// Sent or received.
		direction: Direction,
		/// Raw message.
		message: JsonValue,
	},
}

/// One step of an object's call stack.
#[async_trait]
pub trait Invoke: Send + Sync {
	/// Performs `method` on `object` with already resolved wire parameters.
	async fn invoke(&self, object: &RemoteObject, method: &MethodDef, params: JsonValue) -> Result<Reply>;
}

/// A [`Layer`] that wraps the call stack of matching object types.
///
/// Layers override behavior by deciding whether and how to delegate to the
/// wrapped [`Invoke`]. Additional typed methods belong in extension traits
/// over the [`api`](crate::api) wrappers.
pub trait ObjectLayer: Layer<Arc<dyn Invoke>, Service = Arc<dyn Invoke>> + Send + Sync {
	/// Whether this layer wraps objects of `kind` (and `generic_type`).
	fn applies_to(&self, kind: &str, generic_type: Option<&str>) -> bool;
}

/// Restricts a [`Layer`] to objects whose type or generic type is listed.
#[derive(Debug, Clone)]
pub struct ForTypes<L> {
	types: Vec<String>,
	layer: L,
}

impl<L> ForTypes<L> {
	/// Applies `layer` to the given types.
	pub fn new<T: Into<String>>(types: impl IntoIterator<Item = T>, layer: L) -> Self {
		Self {
			types: types.into_iter().map(Into::into).collect(),
			layer,
		}
	}
}

impl<L: Layer<Arc<dyn Invoke>, Service = Arc<dyn Invoke>>> Layer<Arc<dyn Invoke>> for ForTypes<L> {
	type Service = Arc<dyn Invoke>;

	fn layer(&self, inner: Arc<dyn Invoke>) -> Self::Service {
		self.layer.layer(inner)
	}
}

impl<L: Layer<Arc<dyn Invoke>, Service = Arc<dyn Invoke>> + Send + Sync> ObjectLayer for ForTypes<L> {
	fn applies_to(&self, kind: &str, generic_type: Option<&str>) -> bool {
		self.types.iter().any(|t| t == kind || Some(t.as_str()) == generic_type)
	}
}

/// Bottom of every call stack: sends the call through the session pipeline.
pub(crate) struct SchemaInvoker;

#[async_trait]
impl Invoke for SchemaInvoker {
	async fn invoke(&self, object: &RemoteObject, method: &MethodDef, params: JsonValue) -> Result<Reply> {
		let session = object.session()?;
		let request = Request::new(method.name.clone(), object.handle(), params).with_out_key(method.out_key.clone());
		session.send(request).await
	}
}

struct ObjectInner {
	handle: AtomicI64,
	id: String,
	kind: String,
	generic_type: Option<String>,
	session: Weak<SessionInner>,
	events: EventBus<ObjectEvent>,
	closed: AtomicBool,
	invoker: Arc<dyn Invoke>,
}

/// Client-side capability for one engine object.
#[derive(Clone)]
pub struct RemoteObject {
	inner: Arc<ObjectInner>,
}

impl RemoteObject {
	pub(crate) fn new(
		handle: Handle,
		id: impl Into<String>,
		kind: impl Into<String>,
		generic_type: Option<String>,
		session: Weak<SessionInner>,
		invoker: Arc<dyn Invoke>,
	) -> Self {
		Self {
			inner: Arc::new(ObjectInner {
				handle: AtomicI64::new(handle.0),
				id: id.into(),
				kind: kind.into(),
				generic_type,
				session,
				events: EventBus::new(),
				closed: AtomicBool::new(false),
				invoker,
			}),
		}
	}

	/// Current engine handle.
	pub fn handle(&self) -> Handle {
		Handle(self.inner.handle.load(Ordering::Acquire))
	}

	pub(crate) fn set_handle(&self, handle: Handle) {
		self.inner.handle.store(handle.0, Ordering::Release);
	}

	/// Engine-assigned identifier.
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// Engine type, e.g. `GenericObject`.
	pub fn kind(&self) -> &str {
		&self.inner.kind
	}

	/// Client-defined generic type, e.g. `barchart`.
	pub fn generic_type(&self) -> Option<&str> {
		self.inner.generic_type.as_deref()
	}

	/// Whether the object has been closed.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.load(Ordering::Acquire)
	}

	/// The owning session.
	pub fn session(&self) -> Result<Session> {
		self.inner
			.session
			.upgrade()
			.map(Session::from_inner)
			.ok_or_else(|| Error::NotConnected("session dropped".into()))
	}

	/// Calls `method` with `params`, resolving parameter names against the
	/// schema.
	pub async fn call(&self, method: &str, params: impl Into<Params>) -> Result<Reply> {
		let def = self.session()?.schema().method(self.kind(), method)?;
		let params = def.resolve(params.into());
		trace!(target: "qix", handle = self.handle().0, method = %def.name, "object call");
		self.inner.invoker.invoke(self, &def, params).await
	}

	/// Subscribes to this object's events.
	pub fn on(&self, handler: impl Fn(&ObjectEvent) + Send + Sync + 'static) -> Subscription {
		self.inner.events.subscribe(handler)
	}

	pub(crate) fn emit(&self, event: &ObjectEvent) {
		self.inner.events.emit(event);
	}

	/// Emits [`ObjectEvent::Closed`] once and drops every listener.
	pub(crate) fn close(&self) {
		if self.inner.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.events.emit(&ObjectEvent::Closed);
		self.inner.events.clear();
	}

	/// Whether both values refer to the same object.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.inner, &other.inner)
	}
}

impl fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RemoteObject")
			.field("handle", &self.handle())
			.field("id", &self.inner.id)
			.field("kind", &self.inner.kind)
			.field("generic_type", &self.inner.generic_type)
			.finish()
	}
}
