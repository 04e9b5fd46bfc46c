//! Container status/stats pollers. Two independent tickers per
//! running container — one watching lifecycle status, one sampling
//! CPU/memory — each publishing transitions to the event bus rather than
//! every sample, so idle containers don't spam subscribers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mockelot_core::drain::DrainWatcher;

use crate::container::runtime::{ContainerRuntime, ContainerStatus};
use crate::eventbus::{ContainerEvent, EventBus};

/// §4.10.3: status polling runs at 1 Hz for the first [`STARTUP_WINDOW`]
/// after a container starts, so a container that fails fast is caught
/// quickly, then drops to the steady-state cadence.
const STATUS_STARTUP_INTERVAL: Duration = Duration::from_secs(1);
const STATUS_STEADY_INTERVAL: Duration = Duration::from_secs(5);
const STARTUP_WINDOW: Duration = Duration::from_secs(60);
const STATS_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub async fn poll_status(
	endpoint_id: String,
	container_id: String,
	runtime: Arc<dyn ContainerRuntime>,
	events: Arc<EventBus>,
	drain: DrainWatcher,
) {
	let mut last: Option<ContainerStatus> = None;
	let started_at = Instant::now();
	let mut in_startup_window = true;
	let mut ticker = tokio::time::interval(STATUS_STARTUP_INTERVAL);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				if in_startup_window && started_at.elapsed() >= STARTUP_WINDOW {
					in_startup_window = false;
					ticker = tokio::time::interval(STATUS_STEADY_INTERVAL);
					ticker.tick().await; // first tick fires immediately; consume it
				}
				match runtime.status(&container_id).await {
					Ok(status) if last != Some(status) => {
						last = Some(status);
						events.publish(ContainerEvent::Status {
							endpoint_id: endpoint_id.clone(),
							status: format!("{status:?}").to_lowercase(),
						});
					}
					Ok(_) => {}
					Err(e) => tracing::warn!(%endpoint_id, error = %e, "container status poll failed"),
				}
			}
			_ = drain.clone().wait_for_drain() => break,
		}
	}
}

pub async fn poll_stats(
	endpoint_id: String,
	container_id: String,
	runtime: Arc<dyn ContainerRuntime>,
	events: Arc<EventBus>,
	drain: DrainWatcher,
) {
	let mut ticker = tokio::time::interval(STATS_POLL_INTERVAL);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				match runtime.stats(&container_id).await {
					Ok(stats) => events.publish(ContainerEvent::Stats {
						endpoint_id: endpoint_id.clone(),
						cpu_percent: stats.cpu_percent,
						memory_bytes: stats.memory_bytes,
					}),
					Err(e) => tracing::warn!(%endpoint_id, error = %e, "container stats poll failed"),
				}
			}
			_ = drain.clone().wait_for_drain() => break,
		}
	}
}

/// CPU percentage from a cgroup-style delta sample: `(cpu_delta / system_delta) * online_cpus * 100`.
pub fn cpu_percent(cpu_delta: u64, system_delta: u64, online_cpus: u32) -> f64 {
	if system_delta == 0 {
		return 0.0;
	}
	(cpu_delta as f64 / system_delta as f64) * online_cpus as f64 * 100.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cpu_percent_basic() {
		let pct = cpu_percent(200_000_000, 1_000_000_000, 4);
		assert!((pct - 80.0).abs() < f64::EPSILON);
	}

	#[test]
	fn cpu_percent_zero_system_delta_is_zero() {
		assert_eq!(cpu_percent(100, 0, 4), 0.0);
	}

	#[test]
	fn poll_cadences_match_the_documented_rates() {
		// 1 Hz during startup, then 0.2 Hz for both status and stats.
		assert_eq!(STATUS_STARTUP_INTERVAL, Duration::from_secs(1));
		assert_eq!(STATUS_STEADY_INTERVAL, Duration::from_secs(5));
		assert_eq!(STATS_POLL_INTERVAL, Duration::from_secs(5));
		assert_eq!(STARTUP_WINDOW, Duration::from_secs(60));
	}
}
