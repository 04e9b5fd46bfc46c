//! Container Manager. Owns the lifecycle of a single endpoint's
//! backing container — start/stop, status and stats polling, and proxying
//! once the container's port is bound — built on top of the
//! [`runtime::ContainerRuntime`] trait so the concrete engine is pluggable.

pub mod runtime;
pub mod stats;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use mockelot_core::drain::DrainWatcher;

use crate::error::ProxyError;
use crate::eventbus::{ContainerEvent, EventBus};
use crate::model::ContainerConfig;
use runtime::{ContainerRuntime, PullProgressEvent};

/// §4.10.1: pull progress fills the 10-40% band. Falls back to the
/// floor/ceiling of that band when a runtime reports a status line with no
/// layer counts attached, rather than guessing at a fraction.
fn pull_percent(event: &PullProgressEvent) -> u8 {
	match (event.layers_complete, event.layers_total) {
		(Some(complete), Some(total)) if total > 0 => {
			let fraction = (complete as f64 / total as f64).clamp(0.0, 1.0);
			10 + (fraction * 30.0).round() as u8
		},
		_ => 10,
	}
}

pub struct ContainerHandle {
	container_id: Arc<std::sync::Mutex<Option<String>>>,
	bound_port: Arc<AtomicU16>,
}

impl ContainerHandle {
	pub fn bound_port(&self) -> Option<u16> {
		let p = self.bound_port.load(Ordering::Relaxed);
		if p == 0 {
			None
		} else {
			Some(p)
		}
	}
}

/// Starts (or restarts, per `restart_on_server_start`) the container for one
/// endpoint and spawns its status/stats pollers. Fresh channels are created
/// per call: polling is scoped to a single server start rather than a
/// process-wide singleton, so a later restart doesn't leave the previous
/// poller running against a stale container id.
pub async fn start(
	endpoint_id: String,
	config: &ContainerConfig,
	runtime: Arc<dyn ContainerRuntime>,
	events: Arc<EventBus>,
	drain: DrainWatcher,
) -> Result<ContainerHandle, ProxyError> {
	if config.pull_on_startup {
		events.publish(ContainerEvent::Progress {
			endpoint_id: endpoint_id.clone(),
			message: format!("pulling {}", config.image_name),
			percent: Some(10),
		});

		let (progress_tx, mut progress_rx) = tokio::sync::mpsc::unbounded_channel();
		let forwarder = {
			let events = events.clone();
			let endpoint_id = endpoint_id.clone();
			tokio::spawn(async move {
				while let Some(event) = progress_rx.recv().await {
					events.publish(ContainerEvent::Progress {
						endpoint_id: endpoint_id.clone(),
						message: event.status.clone(),
						percent: Some(pull_percent(&event)),
					});
				}
			})
		};

		let pull_result = runtime.pull(&config.image_name, progress_tx).await;
		// Dropping the sender above (when `pull` returns) closes the
		// channel, so the forwarder task finishes draining on its own.
		let _ = forwarder.await;
		pull_result.map_err(ProxyError::ContainerUnreachable)?;

		events.publish(ContainerEvent::Progress {
			endpoint_id: endpoint_id.clone(),
			message: "pull complete".to_string(),
			percent: Some(40),
		});
	}

	let container_id = runtime
		.start(config)
		.await
		.map_err(ProxyError::ContainerUnreachable)?;

	events.publish(ContainerEvent::Progress {
		endpoint_id: endpoint_id.clone(),
		message: format!("container {container_id} starting"),
		percent: Some(70),
	});

	let bound_port = Arc::new(AtomicU16::new(0));
	{
		let runtime = runtime.clone();
		let container_id = container_id.clone();
		let bound_port = bound_port.clone();
		let events = events.clone();
		let endpoint_id = endpoint_id.clone();
		tokio::spawn(async move {
			for _ in 0..30 {
				match runtime.bound_port(&container_id).await {
					Ok(Some(port)) => {
						bound_port.store(port, Ordering::Relaxed);
						events.publish(ContainerEvent::Progress {
							endpoint_id,
							message: format!("container bound to port {port}"),
							percent: Some(100),
						});
						return;
					},
					Ok(None) => tokio::time::sleep(std::time::Duration::from_millis(500)).await,
					Err(e) => {
						tracing::warn!(%endpoint_id, error = %e, "polling for bound port failed");
						return;
					},
				}
			}
		});
	}

	tokio::spawn(stats::poll_status(
		endpoint_id.clone(),
		container_id.clone(),
		runtime.clone(),
		events.clone(),
		drain.clone(),
	));
	tokio::spawn(stats::poll_stats(
		endpoint_id,
		container_id.clone(),
		runtime,
		events,
		drain,
	));

	Ok(ContainerHandle {
		container_id: Arc::new(std::sync::Mutex::new(Some(container_id))),
		bound_port,
	})
}

pub async fn stop(handle: &ContainerHandle, runtime: &dyn ContainerRuntime) -> Result<(), ProxyError> {
	let id = handle
		.container_id
		.lock()
		.expect("container handle poisoned")
		.take();
	if let Some(id) = id {
		runtime
			.stop(&id)
			.await
			.map_err(ProxyError::ContainerUnreachable)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn pull_percent_scales_across_the_10_to_40_band() {
		let start = PullProgressEvent {
			status: "Downloading".to_string(),
			layer_id: Some("abc123".to_string()),
			layers_total: Some(4),
			layers_complete: Some(0),
		};
		let half = PullProgressEvent {
			layers_complete: Some(2),
			..start.clone()
		};
		let done = PullProgressEvent {
			layers_complete: Some(4),
			..start.clone()
		};
		assert_eq!(pull_percent(&start), 10);
		assert_eq!(pull_percent(&half), 25);
		assert_eq!(pull_percent(&done), 40);
	}

	#[test]
	fn pull_percent_without_layer_counts_falls_back_to_band_floor() {
		let event = PullProgressEvent {
			status: "Pulling from library/nginx".to_string(),
			layer_id: None,
			layers_total: None,
			layers_complete: None,
		};
		assert_eq!(pull_percent(&event), 10);
	}
}
