use qix_rpc::JsonValue;
use serde_json::json;

use super::wrapper;
use crate::Result;
use crate::schema::Params;

wrapper!(
	/// A generic object such as a chart or list.
	GenericObject,
	"GenericObject"
);

impl GenericObject {
	/// Evaluated layout.
	pub async fn get_layout(&self) -> Result<JsonValue> {
		self.call("GetLayout", Params::none()).await?.into_value()
	}

	/// Stored properties.
	pub async fn get_properties(&self) -> Result<JsonValue> {
		self.call("GetProperties", Params::none()).await?.into_value()
	}

	/// Properties with inherited values resolved.
	pub async fn get_effective_properties(&self) -> Result<JsonValue> {
		self.call("GetEffectiveProperties", Params::none()).await?.into_value()
	}

	/// Replaces the stored properties.
	pub async fn set_properties(&self, properties: JsonValue) -> Result<()> {
		self.call("SetProperties", Params::positional([properties])).await?;
		Ok(())
	}

	/// Data pages of the hypercube at `path`.
	pub async fn get_hyper_cube_data(&self, path: &str, pages: JsonValue) -> Result<JsonValue> {
		self.call("GetHyperCubeData", Params::positional([json!(path), pages]))
			.await?
			.into_value()
	}
}

wrapper!(
	/// A variable.
	GenericVariable,
	"GenericVariable"
);

impl GenericVariable {
	/// Evaluated layout.
	pub async fn get_layout(&self) -> Result<JsonValue> {
		self.call("GetLayout", Params::none()).await?.into_value()
	}

	/// Stored properties.
	pub async fn get_properties(&self) -> Result<JsonValue> {
		self.call("GetProperties", Params::none()).await?.into_value()
	}

	/// Replaces the stored properties.
	pub async fn set_properties(&self, properties: JsonValue) -> Result<()> {
		self.call("SetProperties", Params::positional([properties])).await?;
		Ok(())
	}

	/// Sets the value as text.
	pub async fn set_string_value(&self, value: &str) -> Result<()> {
		self.call("SetStringValue", Params::positional([json!(value)])).await?;
		Ok(())
	}
}
