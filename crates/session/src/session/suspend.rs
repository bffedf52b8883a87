//! Resuming a suspended session.
//!
//! Resume reconnects the transport and waits for the engine's `OnConnected`
//! notification to learn whether the old engine session was reattached.
//! Every cached object is then either rebound to a handle in the new
//! connection or closed:
//!
//! * the global object always survives;
//! * the document is looked up with `GetActiveDoc`, falling back to
//!   replaying the last `OpenDoc`;
//! * every other object is looked up by id on the restored document.
//!
//! These lookups are written straight to the transport and bypass the
//! interceptor chains. Any failure closes the new socket and leaves the
//! session suspended.

use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use qix_rpc::{CLOSE_NORMAL, Handle, JsonValue, RpcRequest, TransportEvent};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{Session, SessionEvent, SessionState};
use crate::object::{ObjectEvent, RemoteObject};
use crate::{Error, Result};

/// How long resume waits for the engine to report the session state.
pub(crate) const ON_CONNECTED_TIMEOUT: Duration = Duration::from_millis(5000);

/// Whether the engine kept the previous session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
	/// The engine reattached the previous session.
	Attached,
	/// The engine started a fresh session.
	Created,
}

impl AttachState {
	fn from_wire(state: Option<&str>) -> Self {
		match state {
			Some("SESSION_ATTACHED") => Self::Attached,
			_ => Self::Created,
		}
	}
}

struct Reconciliation {
	attach: AttachState,
	changed: Vec<(RemoteObject, Handle)>,
	closed: Vec<RemoteObject>,
}

impl Session {
	/// Reconnects a suspended session and rebinds its objects.
	///
	/// With `only_if_attached`, fails with [`Error::SessionNotAttached`] when
	/// the engine created a new session instead of reattaching the old one.
	/// Does nothing for an open session.
	pub async fn resume(&self, only_if_attached: bool) -> Result<AttachState> {
		match self.state() {
			SessionState::Suspended => {}
			SessionState::Opened => return Ok(AttachState::Attached),
			_ => return Err(Error::NotConnected("session is not suspended".into())),
		}

		match self.restore(only_if_attached).await {
			Ok(reconciliation) => {
				let attach = reconciliation.attach;
				self.reconcile(reconciliation);
				info!(target: "qix", ?attach, "session resumed");
				self.inner.events.emit(&SessionEvent::Resumed);
				Ok(attach)
			}
			Err(e) => {
				warn!(target: "qix", error = %e, "resume failed");
				self.inner.transport.close(CLOSE_NORMAL, "").await;
				Err(e)
			}
		}
	}

	async fn restore(&self, only_if_attached: bool) -> Result<Reconciliation> {
		let attach = self.reopen().await?;
		if attach == AttachState::Created && only_if_attached {
			return Err(Error::SessionNotAttached);
		}

		let mut reconciliation = Reconciliation {
			attach,
			changed: Vec::new(),
			closed: Vec::new(),
		};
		for global in self.inner.apis.all_of_type("Global") {
			let handle = global.handle();
			reconciliation.changed.push((global, handle));
		}
		let doc = self.restore_doc(&mut reconciliation).await?;
		self.restore_doc_objects(doc, &mut reconciliation).await?;
		Ok(reconciliation)
	}

	async fn reopen(&self) -> Result<AttachState> {
		let (tx, rx) = oneshot::channel();
		let tx = Mutex::new(Some(tx));
		let _connected = self.inner.transport.on(move |event| {
			if let TransportEvent::Notification(notification) = event
				&& notification.method == "OnConnected"
				&& let Some(tx) = tx.lock().take()
			{
				let state = notification.params.get("qSessionState").and_then(JsonValue::as_str).map(str::to_owned);
				let _ = tx.send(state);
			}
		});

		self.inner.transport.open(true).await?;
		let state = match tokio::time::timeout(ON_CONNECTED_TIMEOUT, rx).await {
			Ok(Ok(state)) => state,
			_ => {
				debug!(target: "qix", "no session state reported");
				None
			}
		};
		Ok(AttachState::from_wire(state.as_deref()))
	}

	async fn restore_doc(&self, reconciliation: &mut Reconciliation) -> Result<Option<Handle>> {
		let Some(doc) = self.inner.apis.all_of_type("Doc").into_iter().next() else {
			return Ok(None);
		};

		let transport = &self.inner.transport;
		let mut response = transport.send(RpcRequest::new("GetActiveDoc", Handle::GLOBAL, json!([]))).await?;
		let replay = self.inner.open_doc_params.lock().clone();
		if response.get("error").is_some()
			&& let Some(params) = replay
		{
			response = transport.send(RpcRequest::new("OpenDoc", Handle::GLOBAL, params)).await?;
		}

		match restored_handle(&response) {
			Some(handle) => {
				reconciliation.changed.push((doc, handle));
				Ok(Some(handle))
			}
			None => {
				reconciliation.closed.push(doc);
				Ok(None)
			}
		}
	}

	async fn restore_doc_objects(&self, doc: Option<Handle>, reconciliation: &mut Reconciliation) -> Result<()> {
		let objects = self
			.inner
			.apis
			.all()
			.into_iter()
			.filter(|object| object.kind() != "Global" && object.kind() != "Doc");
		let Some(doc) = doc else {
			reconciliation.closed.extend(objects);
			return Ok(());
		};

		let transport = &self.inner.transport;
		let mut lookups = Vec::new();
		for object in objects {
			match lookup_method(object.kind()) {
				Some(method) => lookups.push(async move {
					let response = transport.send(RpcRequest::new(method, doc, json!([object.id()]))).await;
					(object, response)
				}),
				None => reconciliation.closed.push(object),
			}
		}

		for (object, response) in join_all(lookups).await {
			match restored_handle(&response?) {
				Some(handle) => reconciliation.changed.push((object, handle)),
				None => reconciliation.closed.push(object),
			}
		}
		Ok(())
	}

	fn reconcile(&self, reconciliation: Reconciliation) {
		let Reconciliation { attach, changed, closed } = reconciliation;
		self.inner.lifecycle.lock().phase = SessionState::Opened;
		if attach == AttachState::Created {
			self.inner.deltas.clear();
		}
		self.inner.apis.clear();

		for object in closed {
			debug!(target: "qix", handle = object.handle().0, id = object.id(), "object not restored");
			object.close();
		}

		let mut restored = Vec::with_capacity(changed.len());
		for (object, handle) in changed {
			object.set_handle(handle);
			match self.inner.apis.add(handle, object.clone()) {
				Ok(()) => restored.push(object),
				Err(e) => {
					warn!(target: "qix", error = %e, id = object.id(), "restored object collides");
					object.close();
				}
			}
		}
		for object in restored {
			if object.kind() != "Global" {
				object.emit(&ObjectEvent::Changed);
			}
		}
	}
}

/// Method that looks an object up by id on its document.
fn lookup_method(kind: &str) -> Option<String> {
	match kind {
		"GenericVariable" => Some("GetVariableById".into()),
		"Field" | "Variable" => None,
		_ => kind.strip_prefix("Generic").map(|rest| format!("Get{rest}")),
	}
}

fn restored_handle(response: &JsonValue) -> Option<Handle> {
	if response.get("error").is_some() {
		return None;
	}
	response.pointer("/result/qReturn/qHandle").and_then(JsonValue::as_i64).map(Handle)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn lookup_methods() {
		assert_eq!(lookup_method("GenericObject").as_deref(), Some("GetObject"));
		assert_eq!(lookup_method("GenericBookmark").as_deref(), Some("GetBookmark"));
		assert_eq!(lookup_method("GenericDimension").as_deref(), Some("GetDimension"));
		assert_eq!(lookup_method("GenericVariable").as_deref(), Some("GetVariableById"));
		assert_eq!(lookup_method("Field"), None);
		assert_eq!(lookup_method("Variable"), None);
		assert_eq!(lookup_method("Custom"), None);
	}

	#[test]
	fn restored_handles() {
		assert_eq!(restored_handle(&json!({"result": {"qReturn": {"qHandle": 0}}})), Some(Handle(0)));
		assert_eq!(restored_handle(&json!({"result": {"qReturn": {"qHandle": null}}})), None);
		assert_eq!(restored_handle(&json!({"error": {"code": 2}, "result": {"qReturn": {"qHandle": 4}}})), None);
	}

	#[test]
	fn attach_state_from_wire() {
		assert_eq!(AttachState::from_wire(Some("SESSION_ATTACHED")), AttachState::Attached);
		assert_eq!(AttachState::from_wire(Some("SESSION_CREATED")), AttachState::Created);
		assert_eq!(AttachState::from_wire(None), AttachState::Created);
	}
}
