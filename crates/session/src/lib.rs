//! Client sessions for the analytics engine's JSON-RPC protocol.
//!
//! A [`Session`] connects to one engine, turns object references returned by
//! calls into [`RemoteObject`]s, keeps them in a handle-keyed cache and
//! folds engine pushes into per-object `Changed` and `Closed` events.
//!
//! * Calls are described by a [`Schema`]; named parameters are laid out in
//!   declaration order with defaults.
//! * Results pass an interceptor pipeline ([`intercept`]) that translates
//!   errors, reconstructs delta-encoded results with `qix-patch`, unwraps
//!   out-parameters and materializes object references.
//! * A session may be suspended and resumed; resuming rebinds every cached
//!   object to its handle in the new connection or closes it.
//!
//! ```no_run
//! # async fn demo() -> qix_session::Result<()> {
//! use qix_session::{SessionConfig, create};
//! use serde_json::json;
//!
//! let session = create(SessionConfig::new("ws://localhost:9076/app/engineData"))?;
//! let global = session.open().await?;
//! let doc = global.open_doc("sales.qvf").await?;
//! let chart = doc.create_session_object(json!({"qInfo": {"qType": "table"}})).await?;
//! let layout = chart.get_layout().await?;
//! # let _ = layout;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod api;
mod cache;
pub mod config;
mod delta;
pub mod error;
pub mod intercept;
pub mod object;
pub mod schema;
mod session;

pub use api::{Doc, GenericObject, GenericVariable, Global};
pub use config::{ProtocolConfig, SessionConfig};
pub use error::{Error, RemoteError, Result};
pub use intercept::{CallContext, Position, Reply, Request, RequestInterceptor, ResponseInterceptor};
pub use object::{ForTypes, Invoke, ObjectEvent, ObjectLayer, RemoteObject};
pub use qix_rpc::{CloseEvent, Direction, Handle, JsonValue, Notification, RequestId};
pub use schema::{MethodDef, OutKey, Params, Schema};
pub use session::{AttachState, Call, Initiator, Session, SessionBuilder, SessionEvent, SessionState, create};

#[cfg(test)]
pub(crate) fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().with_max_level(tracing::Level::DEBUG).try_init();
}
