use qix_rpc::JsonValue;
use serde_json::json;

use super::{Doc, object, wrapper};
use crate::schema::Params;
use crate::{Error, Result};

wrapper!(
	/// The engine-wide object at handle -1.
	Global,
	"Global"
);

impl Global {
	/// Opens a document by name.
	pub async fn open_doc(&self, doc_name: &str) -> Result<Doc> {
		object(self.call("OpenDoc", Params::positional([json!(doc_name)])).await?)
	}

	/// Opens a document with named parameters, e.g. `qNoData`.
	pub async fn open_doc_with(&self, params: Params) -> Result<Doc> {
		object(self.call("OpenDoc", params).await?)
	}

	/// The document already open in this engine session.
	pub async fn get_active_doc(&self) -> Result<Doc> {
		object(self.call("GetActiveDoc", Params::none()).await?)
	}

	/// Creates an unsaved session document.
	pub async fn create_session_app(&self) -> Result<Doc> {
		object(self.call("CreateSessionApp", Params::none()).await?)
	}

	/// Creates a session document seeded from an existing app.
	pub async fn create_session_app_from_app(&self, src_app_id: &str) -> Result<Doc> {
		object(self.call("CreateSessionAppFromApp", Params::positional([json!(src_app_id)])).await?)
	}

	/// Engine component version.
	pub async fn engine_version(&self) -> Result<String> {
		let version = self.call("EngineVersion", Params::none()).await?.into_value()?;
		version
			.get("qComponentVersion")
			.and_then(JsonValue::as_str)
			.map(str::to_owned)
			.ok_or_else(|| Error::UnexpectedReply(format!("no component version in {version}")))
	}

	/// Documents available to the user.
	pub async fn get_doc_list(&self) -> Result<JsonValue> {
		self.call("GetDocList", Params::none()).await?.into_value()
	}

	/// Authenticated user of the connection.
	pub async fn get_authenticated_user(&self) -> Result<String> {
		let user = self.call("GetAuthenticatedUser", Params::none()).await?.into_value()?;
		match user {
			JsonValue::String(user) => Ok(user),
			other => Err(Error::UnexpectedReply(format!("expected a user name, got {other}"))),
		}
	}
}
