//! Mock Handler: iterates a matched endpoint's flattened, enabled rules in
//! declaration order, picks the first whose method and path match and whose
//! validation passes, renders its body per `response_mode`, and applies the
//! configured delay before the response is written.

use std::time::Duration;

use http::{HeaderName, HeaderValue, StatusCode};

use crate::context::RequestContext;
use crate::http::{full, Response};
use crate::model::{Endpoint, MethodResponse, ResponseMode};
use crate::path::CompiledPattern;
use crate::script;
use crate::template;
use crate::validator;

pub struct MockResult {
	pub response: Response,
	pub matched_rule_id: Option<String>,
}

/// Finds and renders the first matching rule. Returns `None` when nothing in
/// the endpoint matches, so the caller (dispatcher) can fall through to a
/// generic 404.
pub async fn handle(endpoint: &Endpoint, ctx: &mut RequestContext) -> Option<MockResult> {
	for rule in endpoint.flattened_rules() {
		if !rule.enabled {
			continue;
		}
		if !rule.methods.iter().any(|m| m.eq_ignore_ascii_case(&ctx.method)) {
			continue;
		}
		let pattern = match CompiledPattern::compile(&rule.path_pattern) {
			Ok(p) => p,
			Err(e) => {
				tracing::warn!(rule_id = %rule.id, error = %e, "invalid path pattern, skipping rule");
				continue;
			},
		};
		let m = pattern.matches(&ctx.path);
		if !m.matched {
			continue;
		}
		ctx.path_params = m.path_params;

		if let Some(validation) = &rule.request_validation {
			let outcome = validator::validate(validation, ctx);
			if let Some(err) = &outcome.error {
				tracing::warn!(rule_id = %rule.id, error = %err, "validation error");
			}
			if !outcome.passed {
				continue;
			}
			for (k, v) in outcome.vars {
				ctx.vars.insert(k, v);
			}
		}

		let rendered = render_response(rule, ctx);
		if rendered.delay_ms > 0 {
			tokio::time::sleep(Duration::from_millis(rendered.delay_ms)).await;
		}

		return Some(MockResult {
			response: rendered.into_response(),
			matched_rule_id: Some(rule.id.clone()),
		});
	}
	None
}

/// A rendered rule, still mutable until the delay above has elapsed — a
/// script-mode rule can override status/headers/body/delay via the mutable
/// `response` object, so the final wire response is only built once
/// rendering is done.
struct RenderedResponse {
	status: StatusCode,
	headers: Vec<(String, String)>,
	body: String,
	delay_ms: u64,
}

impl RenderedResponse {
	fn into_response(self) -> Response {
		let mut builder = http::Response::builder().status(self.status);
		for (name, value) in &self.headers {
			if let (Ok(name), Ok(value)) = (
				HeaderName::from_bytes(name.as_bytes()),
				HeaderValue::from_str(value),
			) {
				builder = builder.header(name, value);
			}
		}
		builder.body(full(self.body)).expect("rendered headers always build a valid response")
	}
}

fn render_response(rule: &MethodResponse, ctx: &RequestContext) -> RenderedResponse {
	let default_status = StatusCode::from_u16(rule.status_code).unwrap_or(StatusCode::OK);
	let default_headers: Vec<(String, String)> = rule.headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

	match rule.response_mode {
		ResponseMode::Static => RenderedResponse {
			status: default_status,
			headers: default_headers,
			body: rule.body.clone(),
			delay_ms: rule.response_delay_ms,
		},
		ResponseMode::Template => {
			let request_json = ctx.to_json();
			let body = match template::render(&rule.body, &request_json) {
				Ok(rendered) => rendered,
				Err(e) => {
					tracing::warn!(rule_id = %rule.id, error = %e, "template render failed, using static body");
					rule.body.clone()
				},
			};
			// Template mode renders every header value too, not just the
			// body. A header whose template fails to render falls back to
			// its static literal, same as the body.
			let headers = default_headers
				.iter()
				.map(|(name, value)| match template::render(value, &request_json) {
					Ok(rendered) => (name.clone(), rendered),
					Err(e) => {
						tracing::warn!(rule_id = %rule.id, header = %name, error = %e, "header template render failed, using static value");
						(name.clone(), value.clone())
					},
				})
				.collect();
			RenderedResponse {
				status: default_status,
				headers,
				body,
				delay_ms: rule.response_delay_ms,
			}
		},
		ResponseMode::Script => {
			let src = rule.script_body.as_deref().unwrap_or(&rule.body);
			let seed = script::ResponseSeed {
				status: rule.status_code,
				status_text: rule.status_text.clone(),
				headers: rule.headers.clone(),
				body: rule.body.clone(),
				delay_ms: rule.response_delay_ms,
			};
			match script::eval_response_script(src, &ctx.to_json(), &seed) {
				Ok(result) => RenderedResponse {
					status: StatusCode::from_u16(result.status).unwrap_or(default_status),
					headers: result.headers.into_iter().collect(),
					body: result.body,
					delay_ms: result.delay_ms,
				},
				Err(e) => {
					tracing::warn!(rule_id = %rule.id, error = %e, "response script failed, using static body");
					RenderedResponse {
						status: default_status,
						headers: default_headers,
						body: rule.body.clone(),
						delay_ms: rule.response_delay_ms,
					}
				},
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::{Endpoint, EndpointType, ResponseItem, TranslationMode, TriState};
	use bytes::Bytes;
	use std::collections::HashSet;

	fn endpoint_with_rule(rule: MethodResponse) -> Endpoint {
		Endpoint {
			id: "ep1".into(),
			name: "test".into(),
			path_prefix: "/".into(),
			translation_mode: TranslationMode::None,
			translate_pattern: None,
			translate_replace: None,
			kind: EndpointType::Mock,
			enabled: true,
			responses: vec![ResponseItem::Response { response: rule }],
			proxy: None,
			container: None,
		}
	}

	fn base_rule(path: &str, methods: &[&str]) -> MethodResponse {
		MethodResponse {
			id: "r1".into(),
			enabled: true,
			path_pattern: path.into(),
			methods: methods.iter().map(|m| m.to_string()).collect::<HashSet<_>>(),
			status_code: 200,
			status_text: None,
			headers: Default::default(),
			body: "hello".into(),
			response_delay_ms: 0,
			response_mode: ResponseMode::Static,
			script_body: None,
			request_validation: None,
			use_global_cors: TriState::Inherit,
		}
	}

	fn ctx_for(method: &str, path: &str) -> RequestContext {
		let method: http::Method = method.parse().unwrap();
		let uri: http::Uri = path.parse().unwrap();
		let headers = http::HeaderMap::new();
		RequestContext::build(&method, &uri, &headers, Bytes::new())
	}

	#[tokio::test]
	async fn matches_path_and_method() {
		let ep = endpoint_with_rule(base_rule("/foo", &["GET"]));
		let mut ctx = ctx_for("GET", "/foo");
		let result = handle(&ep, &mut ctx).await;
		assert!(result.is_some());
	}

	#[tokio::test]
	async fn method_mismatch_falls_through() {
		let ep = endpoint_with_rule(base_rule("/foo", &["POST"]));
		let mut ctx = ctx_for("GET", "/foo");
		assert!(handle(&ep, &mut ctx).await.is_none());
	}

	#[tokio::test]
	async fn path_params_extracted_into_context() {
		let ep = endpoint_with_rule(base_rule("/users/{id}", &["GET"]));
		let mut ctx = ctx_for("GET", "/users/42");
		let result = handle(&ep, &mut ctx).await;
		assert!(result.is_some());
		assert_eq!(ctx.path_params.get("id"), Some(&"42".to_string()));
	}
}
