use std::fmt::{Display, Formatter};
use std::{env, fmt};

#[derive(serde::Serialize, Clone, Debug, Default)]
pub struct BuildInfo {
	pub version: String,
	pub rust_version: String,
	pub build_profile: String,
}

impl BuildInfo {
	pub fn new() -> Self {
		BuildInfo {
			version: env!("CARGO_PKG_VERSION").to_string(),
			rust_version: option_env!("CARGO_PKG_RUST_VERSION")
				.unwrap_or("unknown")
				.to_string(),
			build_profile: if cfg!(debug_assertions) {
				"debug".to_string()
			} else {
				"release".to_string()
			},
		}
	}
}

impl Display for BuildInfo {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"mockelot {} (rustc {}, {})",
			self.version, self.rust_version, self.build_profile
		)
	}
}
