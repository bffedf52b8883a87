//! Typed wrappers over [`RemoteObject`] for the common engine types.
//!
//! Each wrapper checks the object type on conversion and exposes the
//! frequently used methods with Rust signatures. Everything else remains
//! reachable through [`RemoteObject::call`] via `Deref`.

mod doc;
mod generic;
mod global;

pub use doc::Doc;
pub use generic::{GenericObject, GenericVariable};
pub use global::Global;

use crate::intercept::Reply;
use crate::object::RemoteObject;
use crate::{Error, Result};

fn expect_kind(object: &RemoteObject, kind: &str) -> Result<()> {
	if object.kind() == kind {
		Ok(())
	} else {
		Err(Error::UnexpectedReply(format!("expected a {kind} object, got {}", object.kind())))
	}
}

fn object<T: TryFrom<RemoteObject, Error = Error>>(reply: Reply) -> Result<T> {
	T::try_from(reply.into_object()?)
}

fn flag(reply: Reply) -> Result<bool> {
	let value = reply.into_value()?;
	value
		.as_bool()
		.ok_or_else(|| Error::UnexpectedReply(format!("expected a boolean, got {value}")))
}

macro_rules! wrapper {
	($(#[$meta:meta])* $name:ident, $kind:literal) => {
		$(#[$meta])*
		#[derive(Debug, Clone)]
		pub struct $name($crate::object::RemoteObject);

		impl $name {
			/// Engine type wrapped by this type.
			pub const KIND: &'static str = $kind;

			/// The underlying remote object.
			pub fn object(&self) -> &$crate::object::RemoteObject {
				&self.0
			}

			/// Unwraps the remote object.
			pub fn into_object(self) -> $crate::object::RemoteObject {
				self.0
			}
		}

		impl TryFrom<$crate::object::RemoteObject> for $name {
			type Error = $crate::Error;

			fn try_from(object: $crate::object::RemoteObject) -> $crate::Result<Self> {
				$crate::api::expect_kind(&object, $kind)?;
				Ok(Self(object))
			}
		}

		impl std::ops::Deref for $name {
			type Target = $crate::object::RemoteObject;

			fn deref(&self) -> &$crate::object::RemoteObject {
				&self.0
			}
		}
	};
}

use wrapper;
