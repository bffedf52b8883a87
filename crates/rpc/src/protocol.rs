//! Message classification and correlation ids.

use serde_json::Value as JsonValue;

use crate::types::{Notification, RequestId};

/// Simple counter-based ID generator.
///
/// Ids start at 1 and increase monotonically for the lifetime of a transport,
/// across reconnects.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub u64);

impl CounterIdGen {
	/// Creates a new counter; the first id handed out is 1.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Increments the counter and returns the new id.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> RequestId {
		self.0 += 1;
		RequestId(self.0)
	}
}

/// Classification of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
	/// The response to a call that is still pending.
	Response(RequestId, JsonValue),
	/// A message without a pending id but with notification parameters.
	Notification(Notification),
	/// Anything else: change/close pushes, late or duplicate responses.
	Message(JsonValue),
}

/// Extracts the numeric correlation id of a message, if any.
pub fn message_id(message: &JsonValue) -> Option<RequestId> {
	message.get("id").and_then(JsonValue::as_u64).map(RequestId)
}

/// Classifies `message`; `is_pending` reports whether an id awaits a response.
pub fn classify(message: JsonValue, is_pending: impl FnOnce(RequestId) -> bool) -> Inbound {
	if let Some(id) = message_id(&message)
		&& is_pending(id)
	{
		return Inbound::Response(id, message);
	}
	if message.get("params").is_some()
		&& let Some(method) = message.get("method").and_then(JsonValue::as_str)
	{
		return Inbound::Notification(Notification {
			method: method.to_owned(),
			params: message.get("params").cloned().unwrap_or_default(),
		});
	}
	Inbound::Message(message)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn ids_start_at_one() {
		let mut ids = CounterIdGen::new();
		assert_eq!(ids.next(), RequestId(1));
		assert_eq!(ids.next(), RequestId(2));
	}

	#[test]
	fn pending_id_is_response() {
		let msg = json!({"id": 4, "result": {}});
		assert!(matches!(classify(msg, |id| id == RequestId(4)), Inbound::Response(RequestId(4), _)));
	}

	#[test]
	fn unknown_id_is_message() {
		let msg = json!({"id": 4, "result": {}});
		assert!(matches!(classify(msg, |_| false), Inbound::Message(_)));
	}

	#[test]
	fn params_without_id_is_notification() {
		let msg = json!({"jsonrpc": "2.0", "method": "OnConnected", "params": {"qSessionState": "SESSION_CREATED"}});
		let Inbound::Notification(notif) = classify(msg, |_| false) else {
			panic!("expected notification");
		};
		assert_eq!(notif.method, "OnConnected");
		assert_eq!(notif.params["qSessionState"], "SESSION_CREATED");
	}

	#[test]
	fn change_push_is_message() {
		let msg = json!({"jsonrpc": "2.0", "change": [1, 2]});
		assert!(matches!(classify(msg, |_| true), Inbound::Message(_)));
	}
}
