//! Identity-aware JSON patch codec.
//!
//! The engine's delta protocol transmits result trees as ordered lists of
//! [`Patch`] operations against the previous result for the same call
//! signature. This crate provides both halves of that exchange:
//! * [`Differ`]: computes the patches turning one tree into another, matching
//!   list elements by an identity pointer (`/qInfo/qId` by default) so that a
//!   reordered list produces `move` operations instead of remove/add pairs.
//! * [`apply`]: applies patches in order, mutating a tree in place.
//!
//! For any pair of trees `a` and `b`, applying `diff(a, b)` to a clone of `a`
//! yields `b`.

#![warn(missing_docs)]

mod apply;
mod diff;
mod pointer;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use apply::apply;
pub use diff::{DEFAULT_IDENTITY, Differ, diff};
pub use pointer::{escape, unescape};

/// A single patch operation.
///
/// Paths are slash-delimited pointers with `~0`/`~1` escaping. The path `/`
/// addresses the whole tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
	/// Insert a key, or splice an element into a list (`-` appends).
	Add {
		/// Target pointer.
		path: String,
		/// Inserted value.
		value: JsonValue,
	},
	/// Delete a key, or splice an element out of a list.
	Remove {
		/// Target pointer.
		path: String,
	},
	/// Overwrite the value at `path`.
	Replace {
		/// Target pointer.
		path: String,
		/// Replacement value.
		value: JsonValue,
	},
	/// Relocate the value at `from` to `path`.
	Move {
		/// Destination pointer.
		path: String,
		/// Source pointer.
		from: String,
	},
}

impl Patch {
	/// Returns the target pointer of this operation.
	pub fn path(&self) -> &str {
		match self {
			Self::Add { path, .. } | Self::Remove { path } | Self::Replace { path, .. } | Self::Move { path, .. } => path,
		}
	}

	/// Returns the carried value for `add` and `replace`.
	pub fn value(&self) -> Option<&JsonValue> {
		match self {
			Self::Add { value, .. } | Self::Replace { value, .. } => Some(value),
			Self::Remove { .. } | Self::Move { .. } => None,
		}
	}
}

/// Failure to apply a patch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum PatchError {
	/// The parent of the target path does not resolve to an existing container,
	/// or the target itself is missing where the operation requires it.
	#[error("malformed patch target: {path}")]
	MalformedPatchTarget {
		/// Pointer of the offending operation.
		path: String,
	},
}

impl PatchError {
	pub(crate) fn target(path: &str) -> Self {
		Self::MalformedPatchTarget { path: path.to_owned() }
	}
}
