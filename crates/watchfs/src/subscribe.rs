//! Mask-keyed handler registry and synchronous dispatcher.

use crate::event::{EventInfo, EventKind};

/// Callback invoked for delivered events, synchronously on the thread
/// draining the backend.
pub type Handler = Box<dyn FnMut(&EventInfo) + Send>;

struct Subscription {
	kind: EventKind,
	handler: Handler,
	once: bool,
}

/// Ordered subscription registry.
///
/// Registering any wildcard subscription flips the registry into "watch
/// any" mode for the rest of its lifetime: from then on every event is
/// delivered uniformly to the wildcard handlers, bypassing per-kind
/// matching.
#[derive(Default)]
pub struct Registry {
	subscriptions: Vec<Subscription>,
	watch_any: bool,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&EventInfo) + Send + 'static) {
		self.subscribe(kind, Box::new(handler), false);
	}

	/// Like [`Registry::on`], but the handler deregisters itself after
	/// its first invocation.
	pub fn once(&mut self, kind: EventKind, handler: impl FnMut(&EventInfo) + Send + 'static) {
		self.subscribe(kind, Box::new(handler), true);
	}

	/// Subscribe to every event, switching the registry into wildcard
	/// mode.
	pub fn on_any(&mut self, handler: impl FnMut(&EventInfo) + Send + 'static, fire_once: bool) {
		self.subscribe(EventKind::All, Box::new(handler), fire_once);
	}

	/// Convenience alias for the write-close kind, the usual notion of a
	/// file having changed.
	pub fn on_change(&mut self, handler: impl FnMut(&EventInfo) + Send + 'static, fire_once: bool) {
		self.subscribe(EventKind::CloseWrite, Box::new(handler), fire_once);
	}

	fn subscribe(&mut self, kind: EventKind, handler: Handler, once: bool) {
		if kind == EventKind::All {
			self.watch_any = true;
		}
		self.subscriptions.push(Subscription {
			kind,
			handler,
			once,
		});
	}

	/// Monotonic: never unset once any wildcard subscription exists.
	pub fn watch_any(&self) -> bool {
		self.watch_any
	}

	/// Whether any subscription covers `kind`.
	pub fn is_subscribed(&self, kind: EventKind) -> bool {
		self.subscriptions.iter().any(|s| s.kind.matches(kind))
	}

	/// Invoke every matching handler in registration order, exactly once
	/// per event. In wildcard mode only the wildcard handlers fire; the
	/// event's own kind is not consulted.
	pub fn emit(&mut self, info: &EventInfo) {
		let mut index = 0;
		while index < self.subscriptions.len() {
			let subscription = &mut self.subscriptions[index];
			let fire = if self.watch_any {
				subscription.kind == EventKind::All
			} else {
				subscription.kind.matches(info.kind())
			};

			if fire {
				(subscription.handler)(info);
				if subscription.once {
					self.subscriptions.remove(index);
					continue;
				}
			}
			index += 1;
		}
	}

	pub fn len(&self) -> usize {
		self.subscriptions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.subscriptions.is_empty()
	}
}
