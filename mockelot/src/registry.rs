//! Process-wide registry: §9 design notes ask for "a process-wide registry
//! created at `main` and threaded through constructors; no package-level
//! vars", mirroring how the teacher wires its `Stores`/`Metrics` bundle
//! through `Bind`/`Proxy` rather than reaching for statics.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::certs::CertCache;
use crate::eventbus::EventBus;
use crate::logger::RequestLogger;
use crate::model::AppConfig;

/// Shared, hot-swappable application state. Cloning a `Registry` clones the
/// `Arc`s inside it, so handlers can cheaply hold their own copy.
#[derive(Clone)]
pub struct Registry {
	config: Arc<ArcSwap<AppConfig>>,
	pub certs: Arc<CertCache>,
	pub logger: Arc<RequestLogger>,
	pub events: Arc<EventBus>,
}

impl Registry {
	pub fn new(config: AppConfig) -> Registry {
		let cert_cache_size = config.cert_cache_size;
		let log_capacity = config.log_capacity;
		Registry {
			config: Arc::new(ArcSwap::from_pointee(config)),
			certs: Arc::new(CertCache::new(cert_cache_size)),
			logger: Arc::new(RequestLogger::new(log_capacity)),
			events: Arc::new(EventBus::new()),
		}
	}

	pub fn config(&self) -> Arc<AppConfig> {
		self.config.load_full()
	}

	/// Atomically replaces the active config. Existing handlers mid-request
	/// keep the `Arc` they already loaded, so nothing tears an in-flight
	/// response.
	pub fn swap_config(&self, new: AppConfig) {
		self.config.store(Arc::new(new));
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn swap_replaces_config_atomically() {
		let reg = Registry::new(AppConfig::default());
		assert_eq!(reg.config().endpoints.len(), 0);
		let mut next = AppConfig::default();
		next.https_redirect = true;
		reg.swap_config(next);
		assert!(reg.config().https_redirect);
	}
}
