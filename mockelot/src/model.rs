//! The configuration data model. Endpoints are the unit of routing; each
//! owns exactly one of a mock rule list, a proxy config, or a container
//! config, enforced by [`Endpoint::validate`] rather than by the type
//! system alone, since the wire format is a tagged `type` field alongside
//! three optional payloads.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
	#[default]
	None,
	Strip,
	Translate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
	Mock,
	Proxy,
	Container,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
	pub id: String,
	pub name: String,
	pub path_prefix: String,
	#[serde(default)]
	pub translation_mode: TranslationMode,
	#[serde(default)]
	pub translate_pattern: Option<String>,
	#[serde(default)]
	pub translate_replace: Option<String>,
	#[serde(rename = "type")]
	pub kind: EndpointType,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default)]
	pub responses: Vec<ResponseItem>,
	#[serde(default)]
	pub proxy: Option<ProxyConfig>,
	#[serde(default)]
	pub container: Option<ContainerConfig>,
}

fn default_true() -> bool {
	true
}

impl Endpoint {
	/// Enforces that exactly one of the three type-specific fields is set,
	/// matching `type`.
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self.kind {
			EndpointType::Mock => {
				if self.proxy.is_some() || self.container.is_some() {
					return Err(ConfigError::TypeMismatch {
						endpoint: self.id.clone(),
						expected: "mock",
					});
				}
			},
			EndpointType::Proxy => {
				if self.proxy.is_none() || self.container.is_some() {
					return Err(ConfigError::TypeMismatch {
						endpoint: self.id.clone(),
						expected: "proxy",
					});
				}
			},
			EndpointType::Container => {
				if self.container.is_none() || self.proxy.is_some() {
					return Err(ConfigError::TypeMismatch {
						endpoint: self.id.clone(),
						expected: "container",
					});
				}
			},
		}
		if let Some(pat) = &self.translate_pattern {
			regex::Regex::new(pat).map_err(|e| ConfigError::InvalidPattern {
				endpoint: self.id.clone(),
				pattern: pat.clone(),
				source: e,
			})?;
		}
		Ok(())
	}

	/// Flattens groups into an ordered list of (enabled) rules. A disabled
	/// group skips all of its responses.
	pub fn flattened_rules(&self) -> Vec<&MethodResponse> {
		let mut out = Vec::new();
		for item in &self.responses {
			match item {
				ResponseItem::Response { response } => out.push(response),
				ResponseItem::Group { group } => {
					if group.enabled {
						out.extend(group.responses.iter());
					}
				},
			}
		}
		out
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseItem {
	Response { response: MethodResponse },
	Group { group: ResponseGroup },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct ResponseGroup {
	pub name: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default)]
	pub responses: Vec<MethodResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
	#[default]
	Static,
	Template,
	Script,
}

/// Tri-state override: `Inherit` defers to the endpoint/global CORS setting,
/// `On`/`Off` force it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
	#[default]
	Inherit,
	On,
	Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct MethodResponse {
	pub id: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	pub path_pattern: String,
	pub methods: HashSet<String>,
	#[serde(default = "default_status")]
	pub status_code: u16,
	#[serde(default)]
	pub status_text: Option<String>,
	#[serde(default)]
	pub headers: HashMap<String, String>,
	#[serde(default)]
	pub body: String,
	#[serde(default)]
	pub response_delay_ms: u64,
	#[serde(default)]
	pub response_mode: ResponseMode,
	#[serde(default)]
	pub script_body: Option<String>,
	#[serde(default)]
	pub request_validation: Option<RequestValidation>,
	#[serde(default)]
	pub use_global_cors: TriState,
}

fn default_status() -> u16 {
	200
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
	#[default]
	None,
	Static,
	Regex,
	Script,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
	#[default]
	Contains,
	Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct RequestValidation {
	#[serde(default)]
	pub mode: ValidationMode,
	#[serde(default)]
	pub pattern: Option<String>,
	#[serde(default)]
	pub match_type: MatchType,
	#[serde(default)]
	pub script: Option<String>,
	#[serde(default)]
	pub headers: Vec<HeaderValidation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeaderValidationMode {
	#[default]
	None,
	Exact,
	Contains,
	Regex,
	Script,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct HeaderValidation {
	pub name: String,
	#[serde(default)]
	pub mode: HeaderValidationMode,
	#[serde(default)]
	pub pattern: Option<String>,
	#[serde(default)]
	pub script: Option<String>,
	#[serde(default)]
	pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderManipulationMode {
	Drop,
	Replace,
	Expression,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct HeaderManipulation {
	pub name: String,
	pub mode: HeaderManipulationMode,
	#[serde(default)]
	pub value: Option<String>,
	#[serde(default)]
	pub expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct StatusTranslation {
	pub from_pattern: String,
	pub to_code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
	pub backend_url: String,
	#[serde(default = "default_timeout_s")]
	pub timeout_s: u64,
	#[serde(default)]
	pub inbound_headers: Vec<HeaderManipulation>,
	#[serde(default)]
	pub outbound_headers: Vec<HeaderManipulation>,
	#[serde(default)]
	pub status_passthrough: bool,
	#[serde(default)]
	pub status_translation: Vec<StatusTranslation>,
	#[serde(default)]
	pub body_transform: Option<String>,
	#[serde(default)]
	pub health_check_enabled: bool,
	#[serde(default = "default_health_interval_s")]
	pub health_check_interval_s: u64,
	#[serde(default)]
	pub health_check_path: String,
}

fn default_timeout_s() -> u64 {
	30
}

fn default_health_interval_s() -> u64 {
	30
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
	#[default]
	No,
	Always,
	OnFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct EnvValue {
	pub value: String,
	#[serde(default)]
	pub is_expression: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct VolumeMount {
	pub host_path: String,
	pub container_path: String,
	#[serde(default)]
	pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
	#[serde(flatten)]
	pub proxy: ProxyConfig,
	pub image_name: String,
	pub container_port: u16,
	#[serde(default)]
	pub pull_on_startup: bool,
	#[serde(default)]
	pub restart_policy: RestartPolicy,
	#[serde(default)]
	pub volumes: Vec<VolumeMount>,
	#[serde(default)]
	pub environment: HashMap<String, EnvValue>,
	#[serde(default)]
	pub host_networking: bool,
	#[serde(default)]
	pub restart_on_server_start: bool,
	#[serde(skip)]
	pub container_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
	#[serde(default)]
	pub endpoints: Vec<Endpoint>,
	/// Legacy top-level list, migrated by [`crate::config::migrate_legacy`].
	#[serde(default)]
	pub responses: Vec<ResponseItem>,
	#[serde(default)]
	pub cors: Option<CorsConfig>,
	#[serde(default)]
	pub https_redirect: bool,
	#[serde(default = "default_log_capacity")]
	pub log_capacity: usize,
	#[serde(default = "default_cert_cache_size")]
	pub cert_cache_size: usize,
}

fn default_log_capacity() -> usize {
	1000
}

fn default_cert_cache_size() -> usize {
	256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CorsConfig {
	Headers { entries: Vec<CorsHeaderExpr> },
	Script { script: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
pub struct CorsHeaderExpr {
	pub name: String,
	pub expression: String,
}

impl AppConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		for e in &self.endpoints {
			e.validate()?;
		}
		Ok(())
	}
}
