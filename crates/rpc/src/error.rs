//! Transport errors.

/// A convenient type alias for `Result` with `E` = [`enum@Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Possible transport errors.
///
/// Errors are cloneable so a single failure can settle every outstanding call
/// and every waiter on the shared lifecycle futures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// No live socket, or the socket went away while the call was pending.
	#[error("not connected: {0}")]
	NotConnected(String),
	/// The socket reported an error before the connection was established.
	#[error("socket error: {0}")]
	Socket(String),
	/// A message could not be encoded or decoded.
	#[error("deserialization failed: {0}")]
	Deserialize(String),
	/// The connector or peer violated the protocol.
	#[error("protocol error: {0}")]
	Protocol(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Self::Deserialize(err.to_string())
	}
}
