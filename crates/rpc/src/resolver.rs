//! Pending-call bookkeeping.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::types::{Handle, RequestId};

/// Key of a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolverId {
	/// The transport's "opened" lifecycle sentinel.
	Opened,
	/// The transport's "closed" lifecycle sentinel.
	Closed,
	/// An outstanding call.
	Call(RequestId),
}

impl ResolverId {
	/// Returns true for the lifecycle sentinels.
	pub const fn is_sentinel(self) -> bool {
		matches!(self, Self::Opened | Self::Closed)
	}
}

struct Pending<T, E> {
	tx: oneshot::Sender<Result<T, E>>,
	handle: Option<Handle>,
}

/// Registry of single-fire pending outcomes.
///
/// Each entry settles at most once and is removed as it settles, so a
/// duplicate response for an id that already settled is a no-op.
pub struct ResolverRegistry<T, E> {
	pending: Mutex<HashMap<ResolverId, Pending<T, E>>>,
}

impl<T, E> Default for ResolverRegistry<T, E> {
	fn default() -> Self {
		Self {
			pending: Mutex::new(HashMap::new()),
		}
	}
}

impl<T, E> ResolverRegistry<T, E> {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a pending entry and returns the receiver of its outcome.
	///
	/// Registering an id that is already pending replaces the old entry; its
	/// receiver observes a dropped sender.
	pub fn register(&self, id: ResolverId, handle: Option<Handle>) -> oneshot::Receiver<Result<T, E>> {
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, Pending { tx, handle });
		rx
	}

	/// Fulfils and removes `id`. Returns false if nothing was pending.
	pub fn resolve(&self, id: ResolverId, value: T) -> bool {
		self.settle(id, Ok(value))
	}

	/// Fails and removes `id`. Returns false if nothing was pending.
	pub fn reject(&self, id: ResolverId, err: E) -> bool {
		self.settle(id, Err(err))
	}

	fn settle(&self, id: ResolverId, outcome: Result<T, E>) -> bool {
		let entry = self.pending.lock().remove(&id);
		match entry {
			Some(pending) => {
				let _ = pending.tx.send(outcome);
				true
			}
			None => false,
		}
	}

	/// Returns true if `id` is awaiting an outcome.
	pub fn contains(&self, id: ResolverId) -> bool {
		self.pending.lock().contains_key(&id)
	}

	/// Handle the pending call `id` targets, if known.
	pub fn handle_of(&self, id: ResolverId) -> Option<Handle> {
		self.pending.lock().get(&id).and_then(|p| p.handle)
	}

	/// Number of pending entries, sentinels included.
	pub fn len(&self) -> usize {
		self.pending.lock().len()
	}

	/// Number of pending calls, sentinels excluded.
	pub fn pending_calls(&self) -> usize {
		self.pending.lock().keys().filter(|id| !id.is_sentinel()).count()
	}

	/// Returns true when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl<T, E: Clone> ResolverRegistry<T, E> {
	/// Fails every pending call, leaving the lifecycle sentinels untouched.
	///
	/// Returns the number of calls failed.
	pub fn reject_all(&self, err: E) -> usize {
		let drained: Vec<Pending<T, E>> = {
			let mut pending = self.pending.lock();
			let ids: Vec<ResolverId> = pending.keys().copied().filter(|id| !id.is_sentinel()).collect();
			ids.into_iter().filter_map(|id| pending.remove(&id)).collect()
		};
		let count = drained.len();
		for entry in drained {
			let _ = entry.tx.send(Err(err.clone()));
		}
		count
	}
}
