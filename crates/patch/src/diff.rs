//! Patch generation.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value as JsonValue};

use crate::pointer;
use crate::{Patch, PatchError, apply};

/// Identity pointer the engine stamps on list items.
pub const DEFAULT_IDENTITY: &str = "/qInfo/qId";

/// Computes patches from `old` to `new` using the default identity pointer.
pub fn diff(old: &JsonValue, new: &JsonValue, base_path: &str) -> Vec<Patch> {
	Differ::default().diff(old, new, base_path)
}

/// Patch generator with a configurable list identity.
///
/// Lists are diffed by matching elements on the value found at the identity
/// pointer. When any element of either list lacks an identity, or identities
/// repeat, the whole list is replaced with a single operation.
#[derive(Debug, Clone)]
pub struct Differ {
	identity: String,
}

impl Default for Differ {
	fn default() -> Self {
		Self::new(DEFAULT_IDENTITY)
	}
}

impl Differ {
	/// Creates a differ matching list elements on `identity` (a pointer).
	pub fn new(identity: impl Into<String>) -> Self {
		Self { identity: identity.into() }
	}

	/// Returns the identity pointer.
	pub fn identity(&self) -> &str {
		&self.identity
	}

	/// Computes the ordered patches turning `old` into `new`.
	///
	/// `base_path` prefixes every emitted path; pass `""` for a whole tree.
	pub fn diff(&self, old: &JsonValue, new: &JsonValue, base_path: &str) -> Vec<Patch> {
		let mut out = Vec::new();
		self.value(old, new, base_path, &mut out);
		out
	}

	/// Rewrites `original` in place so that it equals `new`.
	pub fn update(&self, original: &mut JsonValue, new: &JsonValue) -> Result<(), PatchError> {
		let patches = self.diff(original, new, "");
		apply(original, &patches)
	}

	fn value(&self, old: &JsonValue, new: &JsonValue, path: &str, out: &mut Vec<Patch>) {
		if old == new {
			return;
		}
		match (old, new) {
			(JsonValue::Object(a), JsonValue::Object(b)) => self.object(a, b, path, out),
			(JsonValue::Array(a), JsonValue::Array(b)) => self.list(a, b, path, out),
			_ => out.push(Patch::Replace {
				path: pointer::target(path).to_owned(),
				value: new.clone(),
			}),
		}
	}

	fn object(&self, old: &Map<String, JsonValue>, new: &Map<String, JsonValue>, path: &str, out: &mut Vec<Patch>) {
		for (key, value) in new {
			let child = pointer::child(path, key);
			match old.get(key) {
				Some(prev) => self.value(prev, value, &child, out),
				None => out.push(Patch::Add { path: child, value: value.clone() }),
			}
		}
		for key in old.keys().filter(|k| !new.contains_key(*k)) {
			out.push(Patch::Remove { path: pointer::child(path, key) });
		}
	}

	fn list(&self, old: &[JsonValue], new: &[JsonValue], path: &str, out: &mut Vec<Patch>) {
		let (Some(old_ids), Some(new_ids)) = (self.identities(old), self.identities(new)) else {
			out.push(Patch::Replace {
				path: pointer::target(path).to_owned(),
				value: JsonValue::Array(new.to_vec()),
			});
			return;
		};

		let wanted: HashMap<&str, usize> = new_ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
		let mut order: Vec<&str> = old_ids.iter().map(String::as_str).collect();

		// Descending so removals never shift an index still to be visited.
		for idx in (0..old.len()).rev() {
			match wanted.get(old_ids[idx].as_str()) {
				Some(&target) => self.value(&old[idx], &new[target], &pointer::index(path, idx), out),
				None => {
					out.push(Patch::Remove { path: pointer::index(path, idx) });
					order.remove(idx);
				}
			}
		}

		// Everything before `idx` already matches `new`, so a stray element is
		// always found at or after `idx`.
		for (idx, id) in new_ids.iter().enumerate() {
			match order.iter().position(|cur| *cur == id.as_str()) {
				None => {
					out.push(Patch::Add {
						path: pointer::index(path, idx),
						value: new[idx].clone(),
					});
					order.insert(idx, id.as_str());
				}
				Some(found) if found != idx => {
					out.push(Patch::Move {
						path: pointer::index(path, idx),
						from: pointer::index(path, found),
					});
					let moved = order.remove(found);
					order.insert(idx, moved);
				}
				Some(_) => {}
			}
		}
	}

	/// Collects element identities, or `None` when any is missing or repeated.
	fn identities(&self, items: &[JsonValue]) -> Option<Vec<String>> {
		let mut seen = HashSet::with_capacity(items.len());
		items
			.iter()
			.map(|item| {
				let id = match item.pointer(&self.identity)? {
					JsonValue::String(s) => s.clone(),
					JsonValue::Null => return None,
					other => other.to_string(),
				};
				seen.insert(id.clone()).then_some(id)
			})
			.collect()
	}
}
