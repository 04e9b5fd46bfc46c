//! Event Bus: §4.10.3/§6. Broadcasts container lifecycle and stats events to
//! any number of subscribers (e.g. an admin WebSocket/SSE feed), grounded on
//! `tokio::sync::broadcast` the way the teacher fans out xDS updates to
//! multiple proxy workers.

use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContainerEvent {
	#[serde(rename = "ctr:progress")]
	Progress {
		endpoint_id: String,
		message: String,
		/// §4.10.1: pull progress is aggregated into the 10-40% band, with
		/// container-start and port-bind filling the remainder up to 100%.
		/// `None` for steps the spec leaves unnumbered.
		percent: Option<u8>,
	},
	#[serde(rename = "ctr:status")]
	Status { endpoint_id: String, status: String },
	#[serde(rename = "ctr:stats")]
	Stats {
		endpoint_id: String,
		cpu_percent: f64,
		memory_bytes: u64,
	},
}

pub struct EventBus {
	tx: broadcast::Sender<ContainerEvent>,
}

impl EventBus {
	pub fn new() -> EventBus {
		let (tx, _rx) = broadcast::channel(CHANNEL_CAPACITY);
		EventBus { tx }
	}

	/// Dropped silently when there are no subscribers, matching broadcast's
	/// semantics: nothing is listening, so nothing is lost that mattered.
	pub fn publish(&self, event: ContainerEvent) {
		let _ = self.tx.send(event);
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ContainerEvent> {
		self.tx.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> EventBus {
		EventBus::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn subscriber_receives_published_event() {
		let bus = EventBus::new();
		let mut rx = bus.subscribe();
		bus.publish(ContainerEvent::Status {
			endpoint_id: "ep1".into(),
			status: "running".into(),
		});
		let evt = rx.recv().await.unwrap();
		matches!(evt, ContainerEvent::Status { .. });
	}
}
