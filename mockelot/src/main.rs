use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use mockelot::app::{self, ProcessConfig};
use mockelot_core::{telemetry, version};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
#[command(disable_version_flag = true)]
struct Args {
	/// Use config from bytes (JSON or YAML)
	#[arg(short, long, value_name = "config")]
	config: Option<String>,

	/// Use config from file (JSON or YAML)
	#[arg(short, long, value_name = "file")]
	file: Option<PathBuf>,

	/// Parse and validate the config, print the result, and exit without
	/// starting any listeners.
	#[arg(long)]
	validate_only: bool,

	/// Address for the plaintext HTTP(+h2c) listener.
	#[arg(long, default_value = "0.0.0.0:8080")]
	http_addr: SocketAddr,

	/// Address for the TLS listener. Omit to disable HTTPS.
	#[arg(long)]
	https_addr: Option<SocketAddr>,

	/// Print version (as a simple version string)
	#[arg(short = 'V', value_name = "version")]
	version_short: bool,

	/// Print version (as JSON)
	#[arg(long = "version")]
	version_long: bool,
}

fn main() -> anyhow::Result<()> {
	let _log_flush = telemetry::setup_logging();

	let args = Args::parse();
	let Args {
		config,
		file,
		validate_only,
		http_addr,
		https_addr,
		version_short,
		version_long,
	} = args;

	if version_short {
		println!("{}", version::BuildInfo::new().version);
		return Ok(());
	}
	if version_long {
		println!("{}", version::BuildInfo::new());
		return Ok(());
	}

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.unwrap()
		.block_on(async move {
			let raw = match (config, file) {
				(Some(_), Some(_)) => anyhow::bail!("only one of --config or --file may be given"),
				(Some(config), None) => config,
				(None, Some(file)) => std::fs::read_to_string(&file)
					.map_err(|e| anyhow::anyhow!("reading {}: {e}", file.display()))?,
				(None, None) => "{}".to_string(),
			};

			let parsed = mockelot::config::parse(&raw)?;

			if validate_only {
				println!("configuration is valid: {} endpoint(s)", parsed.endpoints.len());
				return Ok(());
			}

			info!("version: {}", version::BuildInfo::new());
			info!(endpoints = parsed.endpoints.len(), "starting mockelot");

			let process = ProcessConfig {
				http_addr,
				https_addr,
				public_base: format!("http://localhost:{}", http_addr.port()),
			};

			app::run(parsed, process).await?.wait_termination().await
		})
}
