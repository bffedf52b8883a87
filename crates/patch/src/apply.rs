//! In-place patch application.

use serde_json::Value as JsonValue;

use crate::pointer;
use crate::{Patch, PatchError};

#[derive(Clone, Copy)]
enum Put {
	Insert,
	Overwrite,
}

/// Applies `patches` to `tree` in order.
///
/// Containers are updated in place: a list written over a list has its
/// content replaced, an object written over an object is cleared and then
/// refilled. Application stops at the first failing patch; earlier patches
/// remain applied.
pub fn apply(tree: &mut JsonValue, patches: &[Patch]) -> Result<(), PatchError> {
	for patch in patches {
		match patch {
			Patch::Add { path, value } => put(tree, path, value.clone(), Put::Insert)?,
			Patch::Replace { path, value } => put(tree, path, value.clone(), Put::Overwrite)?,
			Patch::Remove { path } => {
				take(tree, path)?;
			}
			Patch::Move { path, from } => {
				let value = take(tree, from)?;
				put(tree, path, value, Put::Insert)?;
			}
		}
	}
	Ok(())
}

fn put(tree: &mut JsonValue, path: &str, value: JsonValue, mode: Put) -> Result<(), PatchError> {
	let Some(segments) = pointer::segments(path) else {
		assign(tree, value);
		return Ok(());
	};
	let (key, parents) = segments.split_last().ok_or_else(|| PatchError::target(path))?;

	match resolve(tree, parents, path)? {
		JsonValue::Object(map) => {
			if let Some(slot) = map.get_mut(key.as_str()) {
				assign(slot, value);
			} else {
				map.insert(key.clone(), value);
			}
			Ok(())
		}
		JsonValue::Array(items) => {
			if key == "-" {
				items.push(value);
				return Ok(());
			}
			let idx = key.parse::<usize>().map_err(|_| PatchError::target(path))?;
			match mode {
				Put::Insert => items.insert(idx.min(items.len()), value),
				Put::Overwrite if idx == items.len() => items.push(value),
				Put::Overwrite => assign(items.get_mut(idx).ok_or_else(|| PatchError::target(path))?, value),
			}
			Ok(())
		}
		_ => Err(PatchError::target(path)),
	}
}

fn take(tree: &mut JsonValue, path: &str) -> Result<JsonValue, PatchError> {
	let segments = pointer::segments(path).ok_or_else(|| PatchError::target(path))?;
	let (key, parents) = segments.split_last().ok_or_else(|| PatchError::target(path))?;

	match resolve(tree, parents, path)? {
		JsonValue::Object(map) => map.remove(key.as_str()).ok_or_else(|| PatchError::target(path)),
		JsonValue::Array(items) => match key.parse::<usize>() {
			Ok(idx) if idx < items.len() => Ok(items.remove(idx)),
			_ => Err(PatchError::target(path)),
		},
		_ => Err(PatchError::target(path)),
	}
}

/// Walks to the container addressed by `segments`.
fn resolve<'a>(tree: &'a mut JsonValue, segments: &[String], path: &str) -> Result<&'a mut JsonValue, PatchError> {
	let mut cur = tree;
	for segment in segments {
		cur = match cur {
			JsonValue::Object(map) => map.get_mut(segment.as_str()),
			JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|idx| items.get_mut(idx)),
			_ => None,
		}
		.ok_or_else(|| PatchError::target(path))?;
	}
	Ok(cur)
}

fn assign(slot: &mut JsonValue, value: JsonValue) {
	match (slot, value) {
		(JsonValue::Array(items), JsonValue::Array(new)) => {
			items.clear();
			items.extend(new);
		}
		(JsonValue::Object(map), JsonValue::Object(new)) => {
			map.clear();
			map.extend(new);
		}
		(slot, value) => *slot = value,
	}
}
