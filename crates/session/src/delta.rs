//! Per-handle cache of delta-reconstructed results.

use std::collections::HashMap;

use parking_lot::Mutex;
use qix_patch::Patch;
use qix_rpc::{Handle, JsonValue};

use crate::Result;

/// Cache key of one result field of a method on a handle.
pub(crate) fn key(method: &str, field: &str) -> String {
	format!("{method}-{field}")
}

/// Last reconstructed result per handle and method.
#[derive(Debug, Default)]
pub(crate) struct DeltaStore {
	entries: Mutex<HashMap<Handle, HashMap<String, JsonValue>>>,
}

impl DeltaStore {
	/// Applies `patches` to the cached value and returns a copy of the result.
	///
	/// A missing entry starts as an empty array when the first patch carries
	/// an array, else as an empty object. A first patch on the root with a
	/// scalar value sets the entry directly.
	pub fn apply(&self, handle: Handle, key: &str, patches: &[Patch]) -> Result<JsonValue> {
		let mut entries = self.entries.lock();
		let values = entries.entry(handle).or_default();
		let entry = values.entry(key.to_owned()).or_insert_with(|| match patches.first().and_then(Patch::value) {
			Some(JsonValue::Array(_)) => JsonValue::Array(Vec::new()),
			_ => JsonValue::Object(Default::default()),
		});

		match patches.first() {
			Some(first) if first.path() == "/" && first.value().is_some_and(|v| !v.is_object() && !v.is_array()) => {
				if let Some(value) = first.value() {
					*entry = value.clone();
				}
			}
			_ => qix_patch::apply(entry, patches)?,
		}
		Ok(entry.clone())
	}

	#[cfg(test)]
	pub fn get(&self, handle: Handle, key: &str) -> Option<JsonValue> {
		self.entries.lock().get(&handle)?.get(key).cloned()
	}

	/// Forgets every entry of a closed handle.
	pub fn drop_handle(&self, handle: Handle) {
		self.entries.lock().remove(&handle);
	}

	pub fn clear(&self) {
		self.entries.lock().clear();
	}
}
