// Originally derived from https://github.com/istio/ztunnel (Apache 2.0 licensed)

use std::time::Instant;

use once_cell::sync::Lazy;
use tracing_subscriber::EnvFilter;

pub static APPLICATION_START_TIME: Lazy<Instant> = Lazy::new(Instant::now);

/// A guard returned by [setup_logging]; dropping it flushes any buffered log lines.
pub struct LogGuard(#[allow(dead_code)] tracing_appender::non_blocking::WorkerGuard);

/// Initialize the global tracing subscriber. Output format (plaintext vs. json) and level are
/// controlled by `LOG_FORMAT` and `RUST_LOG` respectively, matching how the rest of the ambient
/// stack expects to be configured.
pub fn setup_logging() -> LogGuard {
	Lazy::force(&APPLICATION_START_TIME);
	let (nb, guard) = tracing_appender::non_blocking(std::io::stderr());
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

	let builder = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(nb)
		.with_ansi(std::env::var("NO_COLOR").is_err());

	if json {
		builder.json().init();
	} else {
		builder.init();
	}
	LogGuard(guard)
}
