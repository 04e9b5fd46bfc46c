//! Config loading. Accepts YAML or JSON, validates eagerly
//! (fail fast on invariant or pattern errors), and migrates the legacy
//! top-level `responses` list into a single synthetic mock endpoint.

use crate::error::ConfigError;
use crate::model::{AppConfig, Endpoint, EndpointType, TranslationMode};

pub fn parse(raw: &str) -> Result<AppConfig, ConfigError> {
	let trimmed = raw.trim_start();
	let mut config: AppConfig = if trimmed.starts_with('{') {
		serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?
	} else {
		serde_yaml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?
	};

	migrate_legacy(&mut config);
	config.validate()?;
	Ok(config)
}

/// Synthesizes a single mock endpoint from the legacy top-level `responses`
/// list when present and `endpoints` is still empty.
fn migrate_legacy(config: &mut AppConfig) {
	if config.responses.is_empty() || !config.endpoints.is_empty() {
		return;
	}
	tracing::warn!("config uses the legacy top-level `responses` list; migrating to a single endpoint. Update the config to use `endpoints` directly.");
	let legacy = std::mem::take(&mut config.responses);
	config.endpoints.push(Endpoint {
		id: "legacy".to_string(),
		name: "legacy".to_string(),
		path_prefix: "/".to_string(),
		translation_mode: TranslationMode::None,
		translate_pattern: None,
		translate_replace: None,
		kind: EndpointType::Mock,
		enabled: true,
		responses: legacy,
		proxy: None,
		container: None,
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_yaml_endpoints() {
		let yaml = r#"
endpoints:
  - id: e1
    name: e1
    pathPrefix: /foo
    type: mock
    responses: []
"#;
		let config = parse(yaml).unwrap();
		assert_eq!(config.endpoints.len(), 1);
	}

	#[test]
	fn migrates_legacy_top_level_responses() {
		let yaml = r#"
responses:
  - type: response
    response:
      id: r1
      pathPattern: /foo
      methods: [GET]
      statusCode: 200
      body: hi
"#;
		let config = parse(yaml).unwrap();
		assert_eq!(config.endpoints.len(), 1);
		assert_eq!(config.endpoints[0].path_prefix, "/");
		assert!(config.responses.is_empty());
	}

	#[test]
	fn rejects_type_mismatch() {
		let yaml = r#"
endpoints:
  - id: e1
    name: e1
    pathPrefix: /foo
    type: proxy
    responses: []
"#;
		assert!(parse(yaml).is_err());
	}
}
