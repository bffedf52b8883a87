//! Request and response interceptor pipeline.
//!
//! Every call made through a [`Session`] passes two ordered chains. Request
//! interceptors see the outgoing [`Request`] before it is written; response
//! interceptors see the raw response (as [`Reply::Value`]) and turn it step
//! by step into what the caller receives. Each stage runs either its
//! `on_fulfilled` or its `on_rejected` hook depending on the outcome of the
//! stage before it, so a stage may recover from an error or produce one.
//!
//! The built-in response chain is, in order: [`ErrorTranslation`],
//! [`DeltaDecode`], [`ResultUnwrap`], [`OutParam`], [`Materialize`]. The
//! request chain holds [`DeltaRequest`]. Custom stages join through
//! [`SessionBuilder`](crate::SessionBuilder), either at the front of a chain
//! or at its back. The back of the response chain is still ahead of
//! [`Materialize`], so custom stages see plain values there.

mod builtin;

use std::sync::Arc;

use async_trait::async_trait;
use qix_rpc::{Handle, JsonValue, RequestId, RpcRequest};

pub use builtin::{DeltaDecode, DeltaRequest, ErrorTranslation, Materialize, OutParam, ResultUnwrap};

use crate::object::RemoteObject;
use crate::schema::OutKey;
use crate::session::{Call, Session};
use crate::{Error, Result};

/// A call before it is written to the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
	/// Wire method name.
	pub method: String,
	/// Target object.
	pub handle: Handle,
	/// Wire parameters.
	pub params: JsonValue,
	/// Result field to unwrap; never written.
	pub out_key: OutKey,
	/// Request a delta-encoded result.
	pub delta: bool,
}

impl Request {
	/// Creates a request that unwraps nothing and asks for no delta.
	pub fn new(method: impl Into<String>, handle: Handle, params: JsonValue) -> Self {
		Self {
			method: method.into(),
			handle,
			params,
			out_key: OutKey::Whole,
			delta: false,
		}
	}

	/// Sets the result field to unwrap.
	pub fn with_out_key(mut self, out_key: OutKey) -> Self {
		self.out_key = out_key;
		self
	}

	pub(crate) fn to_rpc(&self, id: RequestId) -> RpcRequest {
		RpcRequest::new(self.method.clone(), self.handle, self.params.clone())
			.with_id(id)
			.with_delta(self.delta)
	}
}

/// What a call resolves to.
#[derive(Debug, Clone)]
pub enum Reply {
	/// Plain JSON: the raw response early in the chain, the unwrapped value
	/// at the end of it.
	Value(JsonValue),
	/// An object reference turned into a remote object.
	Object(RemoteObject),
}

impl Reply {
	/// The JSON value, failing for object replies.
	pub fn into_value(self) -> Result<JsonValue> {
		match self {
			Self::Value(value) => Ok(value),
			Self::Object(object) => Err(Error::UnexpectedReply(format!("expected a value, got {} object", object.kind()))),
		}
	}

	/// The remote object, failing for value replies.
	pub fn into_object(self) -> Result<RemoteObject> {
		match self {
			Self::Object(object) => Ok(object),
			Self::Value(value) => Err(Error::UnexpectedReply(format!("expected an object reference, got {value}"))),
		}
	}

	/// Borrows the JSON value of a value reply.
	pub fn as_value(&self) -> Option<&JsonValue> {
		match self {
			Self::Value(value) => Some(value),
			Self::Object(_) => None,
		}
	}
}

/// Call being processed by the response chain.
#[derive(Debug, Clone)]
pub struct CallContext {
	session: Session,
	request: Request,
	id: RequestId,
}

impl CallContext {
	pub(crate) fn new(session: Session, request: Request, id: RequestId) -> Self {
		Self { session, request, id }
	}

	/// Session the call was made on.
	pub fn session(&self) -> &Session {
		&self.session
	}

	/// The request as written, after the request chain.
	pub fn request(&self) -> &Request {
		&self.request
	}

	/// Correlation id of the call.
	pub fn id(&self) -> RequestId {
		self.id
	}

	/// Issues the same request again as a new call.
	pub fn retry(&self) -> Call {
		self.session.send(self.request.clone())
	}
}

/// Stage of the request chain.
#[async_trait]
pub trait RequestInterceptor: Send + Sync {
	/// Transforms a request the previous stage passed on.
	async fn on_fulfilled(&self, session: &Session, request: Request) -> Result<Request> {
		let _ = session;
		Ok(request)
	}

	/// Handles an error raised by a previous stage.
	async fn on_rejected(&self, session: &Session, error: Error) -> Result<Request> {
		let _ = session;
		Err(error)
	}
}

/// Stage of the response chain.
#[async_trait]
pub trait ResponseInterceptor: Send + Sync {
	/// Transforms the reply the previous stage produced.
	async fn on_fulfilled(&self, call: &CallContext, reply: Reply) -> Result<Reply> {
		let _ = call;
		Ok(reply)
	}

	/// Handles an error raised by the call or a previous stage; may recover,
	/// e.g. through [`CallContext::retry`].
	async fn on_rejected(&self, call: &CallContext, error: Error) -> Result<Reply> {
		let _ = call;
		Err(error)
	}
}

/// Where a custom interceptor joins its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
	/// Before the built-in stages; response stages see the raw response.
	First,
	/// After the built-in stages; response stages see the unwrapped value,
	/// ahead of object materialization.
	Last,
}

#[derive(Clone)]
pub(crate) struct Interceptors {
	request: Vec<Arc<dyn RequestInterceptor>>,
	response: Vec<Arc<dyn ResponseInterceptor>>,
	materialize: Arc<dyn ResponseInterceptor>,
}

impl Interceptors {
	pub fn builtin() -> Self {
		Self {
			request: vec![Arc::new(DeltaRequest)],
			response: vec![
				Arc::new(ErrorTranslation),
				Arc::new(DeltaDecode),
				Arc::new(ResultUnwrap),
				Arc::new(OutParam),
			],
			materialize: Arc::new(Materialize),
		}
	}

	pub fn add_request(&mut self, position: Position, interceptor: Arc<dyn RequestInterceptor>) {
		match position {
			Position::First => self.request.insert(0, interceptor),
			Position::Last => self.request.push(interceptor),
		}
	}

	pub fn add_response(&mut self, position: Position, interceptor: Arc<dyn ResponseInterceptor>) {
		match position {
			Position::First => self.response.insert(0, interceptor),
			Position::Last => self.response.push(interceptor),
		}
	}

	pub async fn request(&self, session: &Session, request: Request) -> Result<Request> {
		let mut outcome = Ok(request);
		for stage in &self.request {
			outcome = match outcome {
				Ok(request) => stage.on_fulfilled(session, request).await,
				Err(error) => stage.on_rejected(session, error).await,
			};
		}
		outcome
	}

	pub async fn response(&self, call: &CallContext, mut outcome: Result<Reply>) -> Result<Reply> {
		for stage in self.response.iter().chain([&self.materialize]) {
			outcome = match outcome {
				Ok(reply) => stage.on_fulfilled(call, reply).await,
				Err(error) => stage.on_rejected(call, error).await,
			};
		}
		outcome
	}
}

impl std::fmt::Debug for Interceptors {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Interceptors")
			.field("request", &self.request.len())
			.field("response", &self.response.len())
			.finish()
	}
}
