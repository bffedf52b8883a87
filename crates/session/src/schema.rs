//! Method tables compiled from the engine schema document.
//!
//! The schema is a JSON document of the shape
//! `{"structs": {Type: {Method: {"In": [{Name, DefaultValue}], "Out": [{Name}]}}}}`.
//! Loading it produces one [`TypeDef`] per engine type, each mapping method
//! names to a [`MethodDef`]: the wire name, the ordered parameters with their
//! defaults, and the [`OutKey`] naming the result field to unwrap.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

use crate::{Error, Result};

/// Result field holding a returned object reference or value.
pub const RETURN_KEY: &str = "qReturn";
/// Result field of methods that only report success.
pub const SUCCESS_KEY: &str = "qSuccess";

const BUILTIN: &str = include_str!("../schema/engine.json");

/// Which field of the result a method's value lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutKey {
	/// The method has exactly one output with this name.
	Named(String),
	/// Zero or several outputs; the whole result is the value.
	Whole,
}

impl OutKey {
	fn from_outputs(outputs: &[RawParam]) -> Self {
		match outputs {
			[only] => Self::Named(only.name.clone()),
			_ => Self::Whole,
		}
	}

	/// Output name, if single.
	pub fn name(&self) -> Option<&str> {
		match self {
			Self::Named(name) => Some(name),
			Self::Whole => None,
		}
	}

	/// Whether a call with this out-key may request a delta-encoded result.
	pub fn allows_delta(&self) -> bool {
		matches!(self, Self::Named(name) if name != SUCCESS_KEY)
	}
}

impl std::fmt::Display for OutKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Named(name) => f.write_str(name),
			Self::Whole => f.write_str("-1"),
		}
	}
}

/// Declared parameter of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
	/// Parameter name.
	pub name: String,
	/// Value used when a named call omits the parameter.
	pub default: JsonValue,
}

/// Compiled method entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
	/// Wire method name.
	pub name: String,
	/// Parameters in positional order.
	pub params: Vec<ParamDef>,
	/// Result field to unwrap.
	pub out_key: OutKey,
}

impl MethodDef {
	/// Turns call arguments into the wire `params` array.
	///
	/// Positional arguments pass through unchanged. Named arguments are laid
	/// out in declaration order with defaults for omitted parameters, provided
	/// every given name is a declared parameter; otherwise the map is passed as
	/// a single positional argument.
	pub fn resolve(&self, params: Params) -> JsonValue {
		match params {
			Params::Positional(values) => JsonValue::Array(values),
			Params::Named(map) if map.keys().all(|key| self.params.iter().any(|p| p.name == *key)) => JsonValue::Array(
				self.params
					.iter()
					.map(|p| map.get(&p.name).cloned().unwrap_or_else(|| p.default.clone()))
					.collect(),
			),
			Params::Named(map) => JsonValue::Array(vec![JsonValue::Object(map)]),
		}
	}
}

/// Call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
	/// Arguments in declaration order.
	Positional(Vec<JsonValue>),
	/// Arguments by parameter name.
	Named(Map<String, JsonValue>),
}

impl Params {
	/// No arguments.
	pub fn none() -> Self {
		Self::Positional(Vec::new())
	}

	/// Positional arguments.
	pub fn positional(values: impl IntoIterator<Item = JsonValue>) -> Self {
		Self::Positional(values.into_iter().collect())
	}

	/// Named arguments.
	pub fn named<K: Into<String>>(entries: impl IntoIterator<Item = (K, JsonValue)>) -> Self {
		Self::Named(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

impl From<Vec<JsonValue>> for Params {
	fn from(values: Vec<JsonValue>) -> Self {
		Self::Positional(values)
	}
}

/// Methods of one engine type.
#[derive(Debug, Clone)]
pub struct TypeDef {
	name: String,
	methods: BTreeMap<String, Arc<MethodDef>>,
}

impl TypeDef {
	/// Type name.
	pub fn name(&self) -> &str {
		&self.name
	}

	/// Looks up a method by wire name; a lower-case first letter is accepted.
	pub fn method(&self, method: &str) -> Option<Arc<MethodDef>> {
		self.methods.get(method).or_else(|| self.methods.get(&pascal_case(method))).cloned()
	}

	/// Wire names of all methods.
	pub fn methods(&self) -> impl Iterator<Item = &str> {
		self.methods.keys().map(String::as_str)
	}
}

fn pascal_case(method: &str) -> String {
	let mut chars = method.chars();
	match chars.next() {
		Some(first) => first.to_uppercase().chain(chars).collect(),
		None => String::new(),
	}
}

/// Compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
	version: Option<String>,
	types: HashMap<String, Arc<TypeDef>>,
}

#[derive(Deserialize)]
struct RawSchema {
	#[serde(default)]
	version: Option<String>,
	structs: HashMap<String, HashMap<String, RawMethod>>,
}

#[derive(Deserialize)]
struct RawMethod {
	#[serde(rename = "In", default)]
	inputs: Vec<RawParam>,
	#[serde(rename = "Out", default)]
	outputs: Vec<RawParam>,
}

#[derive(Deserialize)]
struct RawParam {
	#[serde(rename = "Name")]
	name: String,
	#[serde(rename = "DefaultValue", default)]
	default: JsonValue,
}

impl Schema {
	/// The embedded schema covering the common engine types.
	pub fn builtin() -> Result<Self> {
		Self::from_json(BUILTIN)
	}

	/// Compiles a schema document.
	pub fn from_json(input: &str) -> Result<Self> {
		let raw: RawSchema = serde_json::from_str(input).map_err(|e| Error::Config(format!("invalid schema: {e}")))?;
		let types = raw
			.structs
			.into_iter()
			.map(|(type_name, methods)| {
				let methods = methods
					.into_iter()
					.map(|(method, def)| {
						let compiled = MethodDef {
							name: method.clone(),
							out_key: OutKey::from_outputs(&def.outputs),
							params: def
								.inputs
								.into_iter()
								.map(|p| ParamDef {
									name: p.name,
									default: p.default,
								})
								.collect(),
						};
						(method, Arc::new(compiled))
					})
					.collect();
				let def = TypeDef {
					name: type_name.clone(),
					methods,
				};
				(type_name, Arc::new(def))
			})
			.collect();
		Ok(Self {
			version: raw.version,
			types,
		})
	}

	/// Schema version, when the document declares one.
	pub fn version(&self) -> Option<&str> {
		self.version.as_deref()
	}

	/// Looks up a type.
	pub fn type_def(&self, kind: &str) -> Result<Arc<TypeDef>> {
		self.types
			.get(kind)
			.cloned()
			.ok_or_else(|| Error::SchemaStructTypeNotFound(kind.to_owned()))
	}

	/// Looks up a method of a type.
	pub fn method(&self, kind: &str, method: &str) -> Result<Arc<MethodDef>> {
		self.type_def(kind)?.method(method).ok_or_else(|| Error::UnknownMethod {
			kind: kind.to_owned(),
			method: method.to_owned(),
		})
	}
}

#[cfg(test)]
mod tests {
	use pretty_assertions::assert_eq;
	use serde_json::json;

	use super::*;

	#[test]
	fn builtin_compiles() {
		let schema = Schema::builtin().unwrap();
		assert_eq!(schema.version(), Some("12.20.0"));
		for kind in ["Global", "Doc", "GenericObject", "GenericVariable", "GenericBookmark", "Field", "Variable"] {
			assert!(schema.type_def(kind).is_ok(), "{kind}");
		}
	}

	#[test]
	fn out_keys() {
		let schema = Schema::builtin().unwrap();
		let layout = schema.method("GenericObject", "GetLayout").unwrap();
		assert_eq!(layout.out_key, OutKey::Named("qLayout".into()));
		assert!(layout.out_key.allows_delta());

		let destroy = schema.method("Doc", "DestroyObject").unwrap();
		assert!(!destroy.out_key.allows_delta());

		let session_app = schema.method("Global", "CreateSessionApp").unwrap();
		assert_eq!(session_app.out_key, OutKey::Whole);
		assert!(!session_app.out_key.allows_delta());
	}

	#[test]
	fn camel_case_lookup() {
		let schema = Schema::builtin().unwrap();
		assert_eq!(schema.method("Doc", "getVariableByName").unwrap().name, "GetVariableByName");
	}

	#[test]
	fn unknown_type_and_method() {
		let schema = Schema::builtin().unwrap();
		assert!(matches!(schema.type_def("Nope"), Err(Error::SchemaStructTypeNotFound(_))));
		assert!(matches!(schema.method("Doc", "Nope"), Err(Error::UnknownMethod { .. })));
	}

	#[test]
	fn named_params_fill_defaults() {
		let schema = Schema::builtin().unwrap();
		let select = schema.method("GenericObject", "SelectHyperCubeValues").unwrap();
		let params = select.resolve(Params::named([("qPath", json!("/qHyperCubeDef")), ("qValues", json!([2]))]));
		assert_eq!(params, json!(["/qHyperCubeDef", 0, [2], false]));
	}

	#[test]
	fn named_params_with_unknown_key_pass_through() {
		let schema = Schema::builtin().unwrap();
		let create = schema.method("Doc", "CreateObject").unwrap();
		let props = Params::named([("qInfo", json!({"qType": "table"}))]);
		assert_eq!(create.resolve(props), json!([{"qInfo": {"qType": "table"}}]));
	}

	#[test]
	fn positional_params_pass_through() {
		let schema = Schema::builtin().unwrap();
		let open = schema.method("Global", "OpenDoc").unwrap();
		assert_eq!(open.resolve(Params::positional([json!("sales.qvf")])), json!(["sales.qvf"]));
	}
}
