//! Typed event fan-out.
//!
//! Every entity that produces events (transport, session, remote objects)
//! owns an [`EventBus`] for its own event enum. Subscribing returns a
//! [`Subscription`] guard; dropping the guard removes the listener.
//!
//! Handlers run synchronously on the emitting task. The listener list is
//! snapshotted before dispatch, so a handler may subscribe, unsubscribe or
//! clear the bus it is being called from.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Listeners<E> {
	next_id: u64,
	entries: Vec<(u64, Handler<E>)>,
}

/// Listener registry for one event type.
pub struct EventBus<E> {
	listeners: Arc<Mutex<Listeners<E>>>,
}

impl<E> Clone for EventBus<E> {
	fn clone(&self) -> Self {
		Self {
			listeners: Arc::clone(&self.listeners),
		}
	}
}

impl<E> Default for EventBus<E> {
	fn default() -> Self {
		Self {
			listeners: Arc::new(Mutex::new(Listeners {
				next_id: 0,
				entries: Vec::new(),
			})),
		}
	}
}

impl<E: 'static> std::fmt::Debug for EventBus<E> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus").field("listeners", &self.len()).finish()
	}
}

impl<E: 'static> EventBus<E> {
	/// Creates an empty bus.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handler` until the returned guard is dropped.
	#[must_use = "dropping the subscription removes the listener"]
	pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
		let id = {
			let mut listeners = self.listeners.lock();
			let id = listeners.next_id;
			listeners.next_id += 1;
			listeners.entries.push((id, Arc::new(handler)));
			id
		};
		let weak: Weak<Mutex<Listeners<E>>> = Arc::downgrade(&self.listeners);
		Subscription::new(move || {
			if let Some(listeners) = weak.upgrade() {
				listeners.lock().entries.retain(|(entry, _)| *entry != id);
			}
		})
	}

	/// Delivers `event` to every current listener.
	pub fn emit(&self, event: &E) {
		let handlers: Vec<Handler<E>> = self.listeners.lock().entries.iter().map(|(_, h)| Arc::clone(h)).collect();
		for handler in handlers {
			handler(event);
		}
	}

	/// Removes every listener.
	pub fn clear(&self) {
		self.listeners.lock().entries.clear();
	}

	/// Number of registered listeners.
	pub fn len(&self) -> usize {
		self.listeners.lock().entries.len()
	}

	/// Returns true when nobody is listening.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Guard that removes a listener when dropped.
#[must_use = "dropping the subscription removes the listener"]
pub struct Subscription {
	unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	fn new(unsubscribe: impl FnOnce() + Send + 'static) -> Self {
		Self {
			unsubscribe: Some(Box::new(unsubscribe)),
		}
	}

	/// Removes the listener now.
	pub fn unsubscribe(mut self) {
		if let Some(f) = self.unsubscribe.take() {
			f();
		}
	}

	/// Keeps the listener registered for the lifetime of the bus.
	pub fn detach(mut self) {
		self.unsubscribe = None;
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(f) = self.unsubscribe.take() {
			f();
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.unsubscribe.is_some()).finish()
	}
}
