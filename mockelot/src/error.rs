//! Error taxonomy: §7. Configuration errors are caught at load time and
//! fail startup (`ConfigError`); request-time errors map to wire-level
//! status codes (`ProxyError`) per §6's error mapping table.

use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("failed to parse config: {0}")]
	Parse(String),
	#[error("endpoint {endpoint}: type is {expected} but a different payload is set (or missing)")]
	TypeMismatch {
		endpoint: String,
		expected: &'static str,
	},
	#[error("endpoint {endpoint}: invalid pattern {pattern:?}: {source}")]
	InvalidPattern {
		endpoint: String,
		pattern: String,
		source: regex::Error,
	},
}

/// Wire-level error mapping, §6.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
	#[error("backend request failed: {0}")]
	BackendUnreachable(#[source] anyhow::Error),
	#[error("container backend unreachable: {0}")]
	ContainerUnreachable(#[source] anyhow::Error),
	#[error("container port not yet bound")]
	ContainerPortUnbound,
	#[error("container runtime unavailable")]
	RuntimeUnavailable,
	#[error("invalid backend url: {0}")]
	InvalidBackendUrl(String),
}

impl ProxyError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			ProxyError::BackendUnreachable(_) => StatusCode::BAD_GATEWAY,
			ProxyError::ContainerUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
			ProxyError::ContainerPortUnbound => StatusCode::SERVICE_UNAVAILABLE,
			ProxyError::RuntimeUnavailable => StatusCode::SERVICE_UNAVAILABLE,
			ProxyError::InvalidBackendUrl(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}
