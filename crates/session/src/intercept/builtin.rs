//! Built-in interceptor stages.

use async_trait::async_trait;
use qix_patch::Patch;
use qix_rpc::{Handle, JsonValue};
use tracing::debug;

use super::{CallContext, Reply, Request, RequestInterceptor, ResponseInterceptor};
use crate::error::RemoteError;
use crate::schema::{OutKey, RETURN_KEY};
use crate::session::Session;
use crate::{Error, Result, delta};

/// Asks for delta-encoded results when the protocol allows it and the
/// method's out-key is eligible.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaRequest;

#[async_trait]
impl RequestInterceptor for DeltaRequest {
	async fn on_fulfilled(&self, session: &Session, mut request: Request) -> Result<Request> {
		request.delta = session.config().protocol.delta && request.out_key.allows_delta();
		Ok(request)
	}
}

/// Rejects responses carrying an `error` member.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorTranslation;

#[async_trait]
impl ResponseInterceptor for ErrorTranslation {
	async fn on_fulfilled(&self, _call: &CallContext, reply: Reply) -> Result<Reply> {
		if let Some(error) = reply.as_value().and_then(|response| response.get("error")) {
			let remote: RemoteError = serde_json::from_value(error.clone())?;
			return Err(Error::Remote(remote));
		}
		Ok(reply)
	}
}

/// Rebuilds delta-encoded result fields from the session's delta store.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaDecode;

#[async_trait]
impl ResponseInterceptor for DeltaDecode {
	async fn on_fulfilled(&self, call: &CallContext, reply: Reply) -> Result<Reply> {
		let Reply::Value(mut response) = reply else {
			return Ok(reply);
		};
		if response.get("delta") != Some(&JsonValue::Bool(true)) {
			return Ok(Reply::Value(response));
		}
		let request = call.request();
		if let Some(JsonValue::Object(result)) = response.get_mut("result") {
			for (field, value) in result.iter_mut() {
				let patches = patches_of(field, value)?;
				let key = delta::key(&request.method, field);
				*value = call.session().deltas().apply(request.handle, &key, &patches)?;
			}
		}
		Ok(Reply::Value(response))
	}
}

fn patches_of(field: &str, value: &JsonValue) -> Result<Vec<Patch>> {
	if !value.is_array() {
		return Err(Error::ExpectedArrayOfPatches(field.to_owned()));
	}
	serde_json::from_value(value.clone()).map_err(|_| Error::ExpectedArrayOfPatches(field.to_owned()))
}

/// Replaces the response with its `result` member.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultUnwrap;

#[async_trait]
impl ResponseInterceptor for ResultUnwrap {
	async fn on_fulfilled(&self, call: &CallContext, reply: Reply) -> Result<Reply> {
		match reply {
			Reply::Value(JsonValue::Object(mut response)) => match response.remove("result") {
				Some(result) => Ok(Reply::Value(result)),
				None => Err(Error::UnexpectedReply(format!("{} response has no result", call.request().method))),
			},
			other => Ok(other),
		}
	}
}

/// Selects the method's out parameter from the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutParam;

#[async_trait]
impl ResponseInterceptor for OutParam {
	async fn on_fulfilled(&self, call: &CallContext, reply: Reply) -> Result<Reply> {
		match reply {
			Reply::Value(result) => Ok(Reply::Value(out_param(call.request(), result))),
			other => Ok(other),
		}
	}
}

pub(crate) fn out_param(request: &Request, mut result: JsonValue) -> JsonValue {
	match request.method.as_str() {
		"CreateSessionApp" | "CreateSessionAppFromApp" => {
			let app_id = result.get("qSessionAppId").filter(|id| !id.is_null()).cloned();
			if let (Some(app_id), Some(JsonValue::Object(reference))) = (app_id, result.get_mut(RETURN_KEY)) {
				reference.insert("qGenericId".into(), app_id);
			}
		}
		"GetInteract" | "StoreTempSelectionState" | "CreateTemporaryBookmark" => {
			if let JsonValue::Object(fields) = &mut result {
				fields.remove(RETURN_KEY);
			}
		}
		_ => {}
	}

	let JsonValue::Object(mut fields) = result else {
		return result;
	};
	if let Some(value) = fields.remove(RETURN_KEY) {
		return value;
	}
	match &request.out_key {
		OutKey::Named(name) => fields.remove(name).unwrap_or(JsonValue::Null),
		OutKey::Whole => JsonValue::Object(fields),
	}
}

/// Turns object references into cached remote objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Materialize;

#[async_trait]
impl ResponseInterceptor for Materialize {
	async fn on_fulfilled(&self, call: &CallContext, reply: Reply) -> Result<Reply> {
		let Reply::Value(value) = reply else {
			return Ok(reply);
		};
		match reference(&value) {
			Reference::Object {
				handle,
				kind,
				id,
				generic_type,
			} => {
				debug!(target: "qix", handle = handle.0, kind, id, "materializing object");
				let object = call.session().materialize(handle, kind, id, generic_type)?;
				Ok(Reply::Object(object))
			}
			Reference::Missing => Err(Error::ObjectNotFound),
			Reference::None => Ok(Reply::Value(value)),
		}
	}
}

enum Reference<'a> {
	Object {
		handle: Handle,
		kind: &'a str,
		id: &'a str,
		generic_type: Option<&'a str>,
	},
	Missing,
	None,
}

fn reference(value: &JsonValue) -> Reference<'_> {
	let handle = value.get("qHandle");
	let kind = value.get("qType");
	if let (Some(handle), Some(kind)) = (handle.and_then(JsonValue::as_i64), kind.and_then(JsonValue::as_str))
		&& !kind.is_empty()
	{
		return Reference::Object {
			handle: Handle(handle),
			kind,
			id: value.get("qGenericId").and_then(JsonValue::as_str).unwrap_or_default(),
			generic_type: value.get("qGenericType").and_then(JsonValue::as_str),
		};
	}
	if handle.is_some_and(JsonValue::is_null) && kind.is_some_and(JsonValue::is_null) {
		return Reference::Missing;
	}
	Reference::None
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	fn request(method: &str, out_key: OutKey) -> Request {
		Request::new(method, Handle(1), json!([])).with_out_key(out_key)
	}

	#[test]
	fn out_param_prefers_return_then_named_then_whole() {
		let named = request("GetLayout", OutKey::Named("qLayout".into()));
		assert_eq!(out_param(&named, json!({"qLayout": {"a": 1}})), json!({"a": 1}));
		assert_eq!(
			out_param(&named, json!({"qReturn": {"qHandle": 2}, "qLayout": {}})),
			json!({"qHandle": 2})
		);

		let whole = request("GetSomething", OutKey::Whole);
		assert_eq!(out_param(&whole, json!({"a": 1, "b": 2})), json!({"a": 1, "b": 2}));
	}

	#[test]
	fn session_app_takes_its_id_from_the_out_param() {
		let call = request("CreateSessionApp", OutKey::Whole);
		let result = json!({
			"qReturn": {"qHandle": 1, "qType": "Doc", "qGenericId": ""},
			"qSessionAppId": "SessionApp_1",
		});
		assert_eq!(out_param(&call, result), json!({"qHandle": 1, "qType": "Doc", "qGenericId": "SessionApp_1"}));
	}

	#[test]
	fn misleading_return_members_are_dropped() {
		let call = request("StoreTempSelectionState", OutKey::Named("qId".into()));
		assert_eq!(out_param(&call, json!({"qReturn": true, "qId": "tmp1"})), json!("tmp1"));
	}

	#[test]
	fn references() {
		assert!(matches!(
			reference(&json!({"qHandle": 0, "qType": "Doc", "qGenericId": "app"})),
			Reference::Object { handle: Handle(0), kind: "Doc", id: "app", generic_type: None }
		));
		assert!(matches!(reference(&json!({"qHandle": null, "qType": null})), Reference::Missing));
		assert!(matches!(reference(&json!({"qHandle": 3})), Reference::None));
		assert!(matches!(reference(&json!("text")), Reference::None));
	}

	#[test]
	fn patches_must_be_arrays() {
		assert_eq!(
			patches_of("qLayout", &json!({"op": "add"})).unwrap_err(),
			Error::ExpectedArrayOfPatches("qLayout".into())
		);
		assert_eq!(
			patches_of("qLayout", &json!([{"op": "nope", "path": "/"}])).unwrap_err(),
			Error::ExpectedArrayOfPatches("qLayout".into())
		);
		assert_eq!(patches_of("qLayout", &json!([])).unwrap(), Vec::<Patch>::new());
	}
}
