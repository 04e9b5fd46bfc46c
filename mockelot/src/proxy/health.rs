//! Health check ticker. Polls a proxy backend's health endpoint on an
//! interval and publishes status transitions to the event bus, using the
//! same periodic-poll-plus-watch-channel shape as the container stats
//! poller in `container::stats`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mockelot_core::drain::DrainWatcher;

use crate::client::OutboundClient;
use crate::eventbus::{ContainerEvent, EventBus};

pub struct HealthState {
	healthy: AtomicBool,
}

impl HealthState {
	pub fn new() -> HealthState {
		HealthState {
			healthy: AtomicBool::new(true),
		}
	}

	pub fn is_healthy(&self) -> bool {
		self.healthy.load(Ordering::Relaxed)
	}
}

impl Default for HealthState {
	fn default() -> HealthState {
		HealthState::new()
	}
}

/// Runs until `drain` fires. Intended to be spawned once per proxy endpoint
/// that has `health_check_enabled` set.
pub async fn run(
	endpoint_id: String,
	health_url: String,
	interval: Duration,
	client: OutboundClient,
	state: Arc<HealthState>,
	events: Arc<EventBus>,
	drain: DrainWatcher,
) {
	let mut ticker = tokio::time::interval(interval);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let healthy = client.health_check(&health_url, Duration::from_secs(5)).await;
				let was_healthy = state.healthy.swap(healthy, Ordering::Relaxed);
				if was_healthy != healthy {
					events.publish(ContainerEvent::Status {
						endpoint_id: endpoint_id.clone(),
						status: if healthy { "healthy".to_string() } else { "unhealthy".to_string() },
					});
				}
			}
			_ = drain.clone().wait_for_drain() => {
				break;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn starts_healthy() {
		let state = HealthState::new();
		assert!(state.is_healthy());
	}
}
