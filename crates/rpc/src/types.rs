//! Wire-level types shared by the transport and the session layer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// JSON-RPC version stamped on every outgoing call.
pub const JSONRPC_VERSION: &str = "2.0";

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Closure issued by a manual suspend.
pub const CLOSE_MANUAL_SUSPEND: u16 = 4000;
/// Connection lost without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Engine-assigned identifier of a server-side object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(pub i64);

impl Handle {
	/// The root object every session starts from.
	pub const GLOBAL: Self = Self(-1);

	/// Returns true for the root object.
	pub const fn is_global(self) -> bool {
		self.0 == Self::GLOBAL.0
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "handle#{}", self.0)
	}
}

/// Correlation id linking a call to its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// An outgoing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
	/// Correlation id; assigned by the transport when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<RequestId>,
	/// Protocol version, stamped by the transport.
	#[serde(default)]
	pub jsonrpc: String,
	/// Remote method name.
	pub method: String,
	/// Target object.
	pub handle: Handle,
	/// Positional (array) or named (object) parameters.
	pub params: JsonValue,
	/// Requests a delta-encoded result.
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub delta: bool,
}

impl RpcRequest {
	/// Creates a call without an id.
	pub fn new(method: impl Into<String>, handle: Handle, params: JsonValue) -> Self {
		Self {
			id: None,
			jsonrpc: String::new(),
			method: method.into(),
			handle,
			params,
			delta: false,
		}
	}

	/// Sets the correlation id.
	pub fn with_id(mut self, id: RequestId) -> Self {
		self.id = Some(id);
		self
	}

	/// Requests a delta-encoded result.
	pub fn with_delta(mut self, delta: bool) -> Self {
		self.delta = delta;
		self
	}
}

/// An unsolicited message carrying `method` and `params` but no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	/// Notification name, e.g. `OnConnected`.
	pub method: String,
	/// Notification payload.
	#[serde(default)]
	pub params: JsonValue,
}

/// Close code and reason of a terminated socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseEvent {
	/// Close code.
	pub code: u16,
	/// Close reason.
	pub reason: String,
}

impl CloseEvent {
	/// Creates a close event.
	pub fn new(code: u16, reason: impl Into<String>) -> Self {
		Self {
			code,
			reason: reason.into(),
		}
	}

	/// A connection lost without a close handshake.
	pub fn abnormal(reason: impl Into<String>) -> Self {
		Self::new(CLOSE_ABNORMAL, reason)
	}

	/// Returns true for closures the client itself initiated on purpose.
	pub fn is_deliberate(&self) -> bool {
		matches!(self.code, CLOSE_NORMAL | CLOSE_MANUAL_SUSPEND)
	}
}

/// Direction of a traffic event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	/// Written to the socket.
	Sent,
	/// Read from the socket.
	Received,
}
