use qix_rpc::JsonValue;
use serde_json::json;

use super::{GenericObject, GenericVariable, flag, object, wrapper};
use crate::Result;
use crate::schema::Params;

wrapper!(
	/// An open document (app).
	Doc,
	"Doc"
);

impl Doc {
	/// Layout of the document.
	pub async fn get_app_layout(&self) -> Result<JsonValue> {
		self.call("GetAppLayout", Params::none()).await?.into_value()
	}

	/// Properties of the document.
	pub async fn get_app_properties(&self) -> Result<JsonValue> {
		self.call("GetAppProperties", Params::none()).await?.into_value()
	}

	/// Creates a persisted object from its properties.
	pub async fn create_object(&self, properties: JsonValue) -> Result<GenericObject> {
		object(self.call("CreateObject", Params::positional([properties])).await?)
	}

	/// Creates an object that lives as long as the engine session.
	pub async fn create_session_object(&self, properties: JsonValue) -> Result<GenericObject> {
		object(self.call("CreateSessionObject", Params::positional([properties])).await?)
	}

	/// Looks an object up by id.
	pub async fn get_object(&self, id: &str) -> Result<GenericObject> {
		object(self.call("GetObject", Params::positional([json!(id)])).await?)
	}

	/// Removes a persisted object; reports whether it existed.
	pub async fn destroy_object(&self, id: &str) -> Result<bool> {
		flag(self.call("DestroyObject", Params::positional([json!(id)])).await?)
	}

	/// Removes a session object; reports whether it existed.
	pub async fn destroy_session_object(&self, id: &str) -> Result<bool> {
		flag(self.call("DestroySessionObject", Params::positional([json!(id)])).await?)
	}

	/// Creates a variable from its properties.
	pub async fn create_variable(&self, properties: JsonValue) -> Result<GenericVariable> {
		object(self.call("CreateVariableEx", Params::positional([properties])).await?)
	}

	/// Looks a variable up by id.
	pub async fn get_variable_by_id(&self, id: &str) -> Result<GenericVariable> {
		object(self.call("GetVariableById", Params::positional([json!(id)])).await?)
	}

	/// Looks a variable up by name.
	pub async fn get_variable_by_name(&self, name: &str) -> Result<GenericVariable> {
		object(self.call("GetVariableByName", Params::positional([json!(name)])).await?)
	}

	/// Clears every selection in the default state.
	pub async fn clear_all(&self) -> Result<()> {
		self.call("ClearAll", Params::named([("qLockedAlso", json!(false))])).await?;
		Ok(())
	}
}
