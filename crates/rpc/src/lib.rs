//! JSON-RPC transport for the analytics engine protocol.
//!
//! This crate owns everything below the session layer:
//! * [`Transport`]: a single socket multiplexing concurrent calls, routing each
//!   response to its caller by correlation id and surfacing notifications,
//!   traffic and lifecycle as [`TransportEvent`]s.
//! * [`ResolverRegistry`]: single-fire pending-call bookkeeping.
//! * [`EventBus`]: typed listener registration returning [`Subscription`] guards.
//! * [`Connector`]: the socket seam, with a WebSocket implementation
//!   ([`WsConnector`]) and an in-process one ([`memory`]).

#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod protocol;
pub mod resolver;
pub mod socket;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use event::{EventBus, Subscription};
pub use protocol::{CounterIdGen, Inbound};
pub use resolver::{ResolverId, ResolverRegistry};
pub use serde_json::Value as JsonValue;
pub use socket::memory::{MemoryConnector, MemoryPeer, MemoryServer, memory};
pub use socket::ws::WsConnector;
pub use socket::{Connection, Connector, Frame, SocketEvent};
pub use transport::{ReadyState, Transport, TransportEvent};
pub use types::{
	CLOSE_ABNORMAL, CLOSE_MANUAL_SUSPEND, CLOSE_NORMAL, CloseEvent, Direction, Handle, JSONRPC_VERSION, Notification, RequestId, RpcRequest,
};
