//! Process orchestration, grounded on the teacher's `app::run`/`Bound`
//! shape: build the registry, bind listeners, start per-endpoint container
//! managers and proxy health checkers, and hand back a `Bound` whose
//! `wait_termination` blocks until a shutdown signal drains everything.
//!
//! Simplified relative to the teacher: there is no dedicated data-plane
//! thread pool here (that machinery exists in the teacher to isolate xDS
//! control-plane work from proxy data-plane work, which Mockelot has no
//! equivalent of), so everything runs on the default multi-threaded tokio
//! runtime that `main` already starts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use mockelot_core::drain;
use mockelot_core::signal;

use crate::client::OutboundClient;
use crate::container::{self, runtime::UnavailableRuntime};
use crate::dispatcher::Dispatcher;
use crate::listener;
use crate::model::{AppConfig, EndpointType};
use crate::proxy::health;
use crate::registry::Registry;

pub struct ProcessConfig {
	pub http_addr: SocketAddr,
	pub https_addr: Option<SocketAddr>,
	/// Fallback client-facing base used only when a request arrives with no
	/// `Host` header; ordinarily the dispatcher derives this per-request.
	pub public_base: String,
}

pub struct Bound {
	pub shutdown: signal::Shutdown,
	drain_tx: drain::DrainTrigger,
}

impl Bound {
	pub async fn wait_termination(self) -> anyhow::Result<()> {
		self.shutdown.wait().await;
		self.drain_tx.start_drain_and_wait(drain::DrainMode::Graceful).await;
		Ok(())
	}
}

pub async fn run(config: AppConfig, process: ProcessConfig) -> anyhow::Result<Bound> {
	let registry = Registry::new(config);
	let shutdown = signal::Shutdown::new();
	let (drain_tx, drain_rx) = drain::new();

	let client = OutboundClient::new()?;
	let runtime: Arc<dyn container::runtime::ContainerRuntime> = Arc::new(UnavailableRuntime);

	let mut container_handles = HashMap::new();
	for endpoint in &registry.config().endpoints {
		if endpoint.kind != EndpointType::Container || !endpoint.enabled {
			continue;
		}
		let Some(cfg) = &endpoint.container else { continue };
		match container::start(
			endpoint.id.clone(),
			cfg,
			runtime.clone(),
			registry.events.clone(),
			drain_rx.clone(),
		)
		.await
		{
			Ok(handle) => {
				container_handles.insert(endpoint.id.clone(), Arc::new(handle));
			},
			Err(e) => {
				tracing::warn!(endpoint = %endpoint.id, error = %e, "failed to start container for endpoint");
			},
		}
	}

	for endpoint in &registry.config().endpoints {
		if endpoint.kind != EndpointType::Proxy || !endpoint.enabled {
			continue;
		}
		let Some(proxy_cfg) = &endpoint.proxy else { continue };
		if !proxy_cfg.health_check_enabled {
			continue;
		}
		let health_url = format!("{}{}", proxy_cfg.backend_url.trim_end_matches('/'), proxy_cfg.health_check_path);
		tokio::spawn(health::run(
			endpoint.id.clone(),
			health_url,
			std::time::Duration::from_secs(proxy_cfg.health_check_interval_s),
			client.clone(),
			Arc::new(health::HealthState::new()),
			registry.events.clone(),
			drain_rx.clone(),
		));
	}

	let dispatcher = Arc::new(Dispatcher {
		config: registry.config(),
		client,
		public_base_fallback: process.public_base,
		https_port: process.https_addr.map(|a| a.port()),
		logger: registry.logger.clone(),
		container_ports: container_handles,
	});

	{
		let dispatcher = dispatcher.clone();
		let drain_rx = drain_rx.clone();
		tokio::spawn(async move {
			if let Err(e) = listener::serve_http(process.http_addr, dispatcher, drain_rx).await {
				tracing::error!(error = %e, "http listener exited");
			}
		});
	}

	if let Some(https_addr) = process.https_addr {
		let dispatcher = dispatcher.clone();
		let certs = registry.certs.clone();
		let drain_rx = drain_rx.clone();
		tokio::spawn(async move {
			if let Err(e) = listener::serve_https(https_addr, dispatcher, certs, drain_rx).await {
				tracing::error!(error = %e, "https listener exited");
			}
		});
	}

	Ok(Bound { shutdown, drain_tx })
}
