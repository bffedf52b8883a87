//! Handle-keyed registry of live remote objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use qix_rpc::{Handle, Subscription};

use crate::object::{ObjectEvent, RemoteObject};
use crate::{Error, Result};

struct Entry {
	object: RemoteObject,
	_closed: Subscription,
}

/// Object cache of a session.
///
/// An object removes itself when it emits [`ObjectEvent::Closed`].
#[derive(Clone, Default)]
pub(crate) struct ApiCache {
	entries: Arc<Mutex<BTreeMap<Handle, Entry>>>,
}

impl ApiCache {
	/// Registers `object` under `handle`.
	pub fn add(&self, handle: Handle, object: RemoteObject) -> Result<()> {
		let mut entries = self.entries.lock();
		if entries.contains_key(&handle) {
			return Err(Error::EntryAlreadyDefined(handle));
		}
		let entry = self.entry(handle, object);
		entries.insert(handle, entry);
		Ok(())
	}

	/// Returns the object at `handle`, registering the one built by `create`
	/// when there is none.
	///
	/// `create` runs without the cache locked and may read the cache. If
	/// another object was registered at `handle` meanwhile, that one wins.
	pub fn get_or_try_insert_with(&self, handle: Handle, create: impl FnOnce() -> Result<RemoteObject>) -> Result<RemoteObject> {
		if let Some(object) = self.get(handle) {
			return Ok(object);
		}
		let object = create()?;
		let mut entries = self.entries.lock();
		if let Some(entry) = entries.get(&handle) {
			return Ok(entry.object.clone());
		}
		let entry = self.entry(handle, object.clone());
		entries.insert(handle, entry);
		Ok(object)
	}

	fn entry(&self, handle: Handle, object: RemoteObject) -> Entry {
		let weak = Arc::downgrade(&self.entries);
		let closed = object.on(move |event| {
			if *event == ObjectEvent::Closed
				&& let Some(entries) = weak.upgrade()
			{
				ApiCache { entries }.remove(handle);
			}
		});
		Entry { object, _closed: closed }
	}

	pub fn get(&self, handle: Handle) -> Option<RemoteObject> {
		self.entries.lock().get(&handle).map(|e| e.object.clone())
	}

	/// Every cached object in handle order.
	pub fn all(&self) -> Vec<RemoteObject> {
		self.entries.lock().values().map(|e| e.object.clone()).collect()
	}

	pub fn all_of_type(&self, kind: &str) -> Vec<RemoteObject> {
		self.entries
			.lock()
			.values()
			.filter(|e| e.object.kind() == kind)
			.map(|e| e.object.clone())
			.collect()
	}

	pub fn remove(&self, handle: Handle) -> Option<RemoteObject> {
		let removed = self.entries.lock().remove(&handle);
		removed.map(|e| e.object)
	}

	/// Empties the cache without closing anything.
	pub fn clear(&self) {
		drop(self.drain());
	}

	/// Empties the cache, returning the objects it held.
	pub fn drain(&self) -> Vec<RemoteObject> {
		let entries = std::mem::take(&mut *self.entries.lock());
		entries.into_values().map(|e| e.object).collect()
	}

	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}
}
