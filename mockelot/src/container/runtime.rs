//! Container runtime abstraction. Mockelot talks to *a* container
//! runtime through this trait rather than a concrete Docker/Podman SDK
//! integration, which stays out of scope. A real deployment provides an
//! implementation that shells out to `docker`/`podman` or speaks their
//! HTTP APIs; this crate ships the trait and the polling/lifecycle logic
//! that drives it.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::ContainerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
	Pending,
	Running,
	Stopped,
	Failed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerStats {
	pub cpu_percent: f64,
	pub memory_bytes: u64,
}

/// One line of a pull's NDJSON progress stream (§4.10.1). `layers_total`/
/// `layers_complete` are `None` when a runtime reports only a status
/// message for that line (e.g. "Pulling from library/nginx") rather than a
/// per-layer download count.
#[derive(Debug, Clone, Default)]
pub struct PullProgressEvent {
	pub status: String,
	pub layer_id: Option<String>,
	pub layers_total: Option<u64>,
	pub layers_complete: Option<u64>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
	/// Streams one [`PullProgressEvent`] per NDJSON line over `progress` as
	/// the image downloads, so the caller can compute real percentages
	/// instead of guessing from elapsed time. A runtime with nothing to
	/// report can simply drop `progress` without sending anything.
	async fn pull(&self, image: &str, progress: mpsc::UnboundedSender<PullProgressEvent>) -> anyhow::Result<()>;
	async fn start(&self, config: &ContainerConfig) -> anyhow::Result<String>;
	async fn stop(&self, container_id: &str) -> anyhow::Result<()>;
	async fn status(&self, container_id: &str) -> anyhow::Result<ContainerStatus>;
	async fn stats(&self, container_id: &str) -> anyhow::Result<ContainerStats>;
	/// The host-reachable port bound to `container_port`, once the runtime
	/// has assigned one. `None` while the container is still starting.
	async fn bound_port(&self, container_id: &str) -> anyhow::Result<Option<u16>>;
}

/// No-op runtime used when no concrete implementation is configured. Every
/// operation fails with [`crate::error::ProxyError::RuntimeUnavailable`] at
/// the call site rather than here, so this stays a thin stub.
pub struct UnavailableRuntime;

#[async_trait]
impl ContainerRuntime for UnavailableRuntime {
	async fn pull(&self, _image: &str, _progress: mpsc::UnboundedSender<PullProgressEvent>) -> anyhow::Result<()> {
		anyhow::bail!("no container runtime configured")
	}

	async fn start(&self, _config: &ContainerConfig) -> anyhow::Result<String> {
		anyhow::bail!("no container runtime configured")
	}

	async fn stop(&self, _container_id: &str) -> anyhow::Result<()> {
		anyhow::bail!("no container runtime configured")
	}

	async fn status(&self, _container_id: &str) -> anyhow::Result<ContainerStatus> {
		anyhow::bail!("no container runtime configured")
	}

	async fn stats(&self, _container_id: &str) -> anyhow::Result<ContainerStats> {
		anyhow::bail!("no container runtime configured")
	}

	async fn bound_port(&self, _container_id: &str) -> anyhow::Result<Option<u16>> {
		anyhow::bail!("no container runtime configured")
	}
}
