//! Session errors.

use std::fmt;

use qix_rpc::Handle;
use serde::{Deserialize, Serialize};

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error object reported by the engine for a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
	/// Engine error code.
	pub code: i64,
	/// Human readable message.
	#[serde(default)]
	pub message: String,
	/// Offending parameter, if the engine named one.
	#[serde(default)]
	pub parameter: String,
}

impl fmt::Display for RemoteError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} ({})", self.message, self.code)?;
		if !self.parameter.is_empty() {
			write!(f, ": {}", self.parameter)?;
		}
		Ok(())
	}
}

/// Possible session errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// No live socket.
	#[error("not connected: {0}")]
	NotConnected(String),
	/// The engine answered with an explicit null object reference.
	#[error("object not found")]
	ObjectNotFound,
	/// A delta response carried something other than a patch list.
	#[error("expected an array of patches for `{0}`")]
	ExpectedArrayOfPatches(String),
	/// A patch did not fit the cached tree.
	#[error(transparent)]
	MalformedPatchTarget(#[from] qix_patch::PatchError),
	/// A handle was registered twice in the object cache.
	#[error("{0} is already registered")]
	EntryAlreadyDefined(Handle),
	/// The schema has no struct for an object type.
	#[error("schema has no type `{0}`")]
	SchemaStructTypeNotFound(String),
	/// The object type has no such method.
	#[error("type `{kind}` has no method `{method}`")]
	UnknownMethod {
		/// Object type.
		kind: String,
		/// Requested method.
		method: String,
	},
	/// A call was attempted while the session is suspended.
	#[error("session suspended")]
	SessionSuspended,
	/// Resume required a reattached session but the engine created a new one.
	#[error("session not attached")]
	SessionNotAttached,
	/// The engine rejected the call.
	#[error("remote error: {0}")]
	Remote(RemoteError),
	/// A reply did not have the expected shape.
	#[error("unexpected reply: {0}")]
	UnexpectedReply(String),
	/// Transport-level protocol violation.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// Invalid configuration or schema document.
	#[error("config error: {0}")]
	Config(String),
}

impl Error {
	/// Numeric code of the engine client error taxonomy.
	///
	/// Remote errors return the engine's own code.
	pub fn code(&self) -> i64 {
		match self {
			Self::NotConnected(_) => -1,
			Self::ObjectNotFound => -2,
			Self::ExpectedArrayOfPatches(_) => -3,
			Self::MalformedPatchTarget(_) => -4,
			Self::EntryAlreadyDefined(_) => -5,
			Self::SchemaStructTypeNotFound(_) => -8,
			Self::SessionSuspended => -11,
			Self::SessionNotAttached => -12,
			Self::Remote(remote) => remote.code,
			Self::UnknownMethod { .. } | Self::UnexpectedReply(_) | Self::Protocol(_) | Self::Config(_) => 0,
		}
	}

	/// Returns true for failures a caller may recover from by resuming and
	/// retrying.
	pub fn is_connectivity(&self) -> bool {
		matches!(self, Self::NotConnected(_) | Self::SessionSuspended)
	}
}

impl From<qix_rpc::Error> for Error {
	fn from(err: qix_rpc::Error) -> Self {
		match err {
			qix_rpc::Error::NotConnected(reason) | qix_rpc::Error::Socket(reason) => Self::NotConnected(reason),
			other => Self::Protocol(other.to_string()),
		}
	}
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::UnexpectedReply(err.to_string())
	}
}
