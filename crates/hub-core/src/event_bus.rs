//! Event bus for broadcasting settlement events to subscribers.
//!
//! Uses tokio's broadcast channel so multiple consumers (indexers, order
//! watchers, tests) can observe packet and order lifecycle events without
//! coupling to the keepers.

use tokio::sync::broadcast;

use hub_types::events::HubEvent;

pub struct EventBus {
	sender: broadcast::Sender<HubEvent>,
}

impl EventBus {
	/// Creates a new EventBus with the specified channel capacity. When the
	/// channel is full the oldest events are dropped for lagging subscribers.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Creates a new subscriber receiving all events published after the
	/// subscription is created.
	pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event to all current subscribers. Having no subscribers
	/// is not an error worth surfacing; the event is simply dropped.
	pub fn publish(&self, event: HubEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}
