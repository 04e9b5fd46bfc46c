//! Dispatcher: selects the longest-matching endpoint by path prefix,
//! applies the endpoint's translation mode to the path seen downstream,
//! delegates to the mock/proxy/container handler, and merges in global CORS
//! headers unless the matched rule or endpoint opts out.

use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use regex::Regex;

use crate::client::OutboundClient;
use crate::container::ContainerHandle;
use crate::context::RequestContext;
use crate::cors;
use crate::http::{empty_response, plaintext_response, Response};
use crate::logger::RequestLogger;
use crate::model::{AppConfig, Endpoint, EndpointType, HeaderManipulation, HeaderManipulationMode, TranslationMode, TriState};
use crate::{mock, proxy};

pub struct Dispatcher {
	pub config: Arc<AppConfig>,
	pub client: OutboundClient,
	/// Used only when a request has no `Host` header to derive a
	/// client-facing base from. Absolute redirects are otherwise rebuilt
	/// from the client-facing `Host` when one is present.
	pub public_base_fallback: String,
	/// The HTTPS listener's port, for the https-redirect handler.
	pub https_port: Option<u16>,
	pub logger: Arc<RequestLogger>,
	/// Endpoint id -> live container port, populated once a container has
	/// finished starting. Absent entries mean "not yet bound" or "not a
	/// container endpoint".
	pub container_ports: std::collections::HashMap<String, Arc<ContainerHandle>>,
}

impl Dispatcher {
	/// Picks the endpoint whose `path_prefix` is the longest prefix of the
	/// request path. Ties are broken by declaration order (the earliest
	/// match wins), matching every other first-match-wins rule in the spec;
	/// `Iterator::max_by_key` would instead keep the *last* tied element, so
	/// this folds manually rather than reaching for it.
	pub fn select_endpoint<'a>(&'a self, path: &str) -> Option<&'a Endpoint> {
		let mut best: Option<&Endpoint> = None;
		for endpoint in &self.config.endpoints {
			if !endpoint.enabled || !path.starts_with(endpoint.path_prefix.as_str()) {
				continue;
			}
			if best.map(|b| endpoint.path_prefix.len() > b.path_prefix.len()).unwrap_or(true) {
				best = Some(endpoint);
			}
		}
		best
	}

	pub async fn dispatch(
		&self,
		method: Method,
		uri: http::Uri,
		headers: http::HeaderMap,
		body: Bytes,
		scheme: &str,
		remote_addr: &str,
	) -> Response {
		let started_at = std::time::Instant::now();
		let mut ctx = RequestContext::build(&method, &uri, &headers, body).with_connection_info(scheme, remote_addr, None);
		let public_base = self.public_base(&ctx, scheme);

		// Process liveness check, ahead of any endpoint matching or
		// https-redirect, so it always answers regardless of mock config.
		if ctx.path == "/healthz" && method == Method::GET {
			return plaintext_response(StatusCode::OK, "ok");
		}

		if scheme == "http" && self.config.https_redirect {
			return self.https_redirect_response(&ctx);
		}

		let Some(endpoint) = self.select_endpoint(&ctx.path) else {
			return plaintext_response(StatusCode::NOT_FOUND, "no matching endpoint");
		};

		if cors::is_preflight(&method, &headers) && self.use_global_cors(endpoint, None) && !endpoint_handles_options(endpoint, &ctx.path) {
			return self.preflight_response(&ctx).await;
		}

		let log_id = self.logger.log_request(Some(endpoint.id.clone()), &ctx.method, &ctx.path);

		let (translated_path, captures) = translate_path(endpoint, &ctx.path);
		ctx.path = translated_path;

		let mut response = match endpoint.kind {
			EndpointType::Mock => match mock::handle(endpoint, &mut ctx).await {
				Some(result) => result.response,
				None => plaintext_response(StatusCode::NOT_FOUND, "no matching mock rule"),
			},
			EndpointType::Proxy => self.dispatch_proxy(endpoint, &method, headers.clone(), &ctx, &captures, &public_base).await,
			EndpointType::Container => self.dispatch_container(endpoint, &method, headers.clone(), &mut ctx, &public_base).await,
		};

		if self.use_global_cors(endpoint, matched_rule_cors(endpoint, &ctx)) {
			if let Some(cors_cfg) = &self.config.cors {
				for (name, value) in cors::compute_headers(cors_cfg, &ctx).await {
					response.headers_mut().insert(name, value);
				}
			}
		}

		self.logger.update_request_log(&log_id, Some(response.status().as_u16()), None);
		tracing::info!(
			method = %ctx.method,
			path = %ctx.path,
			endpoint = %endpoint.id,
			status = response.status().as_u16(),
			duration_ms = started_at.elapsed().as_millis() as u64,
			"request handled"
		);
		response
	}

	/// Rebuilds the base from the client-facing `Host` header when present,
	/// falling back to the process's configured base otherwise.
	fn public_base(&self, ctx: &RequestContext, scheme: &str) -> String {
		match ctx.get_header("host") {
			Some(host) => format!("{scheme}://{host}"),
			None => self.public_base_fallback.clone(),
		}
	}

	fn https_redirect_response(&self, ctx: &RequestContext) -> Response {
		let host_only = ctx
			.get_header("host")
			.map(|h| h.split(':').next().unwrap_or(h).to_string())
			.unwrap_or_else(|| "localhost".to_string());
		let authority = match self.https_port {
			Some(443) | None => host_only,
			Some(port) => format!("{host_only}:{port}"),
		};
		let target = format!("https://{authority}{}", ctx.path);
		let target = if ctx.query.is_empty() {
			target
		} else {
			format!("{target}?{}", ctx.query_string())
		};
		let mut response = empty_response(StatusCode::FOUND);
		if let Ok(value) = http::HeaderValue::from_str(&target) {
			response.headers_mut().insert(http::header::LOCATION, value);
		}
		response
	}

	async fn dispatch_proxy(
		&self,
		endpoint: &Endpoint,
		method: &Method,
		headers: http::HeaderMap,
		ctx: &RequestContext,
		captures: &[String],
		public_base: &str,
	) -> Response {
		let Some(proxy_cfg) = &endpoint.proxy else {
			return plaintext_response(StatusCode::INTERNAL_SERVER_ERROR, "misconfigured proxy endpoint");
		};
		match proxy::handle(
			proxy_cfg,
			&endpoint.path_prefix,
			endpoint.translation_mode,
			captures,
			public_base,
			&self.client,
			ctx,
			method.clone(),
			headers,
		)
		.await
		{
			Ok(result) => result.response,
			Err(e) => {
				tracing::warn!(endpoint = %endpoint.id, error = %e, "proxy request failed");
				plaintext_response(e.status_code(), e.to_string())
			},
		}
	}

	async fn dispatch_container(
		&self,
		endpoint: &Endpoint,
		method: &Method,
		headers: http::HeaderMap,
		ctx: &mut RequestContext,
		public_base: &str,
	) -> Response {
		let Some(container_cfg) = &endpoint.container else {
			return plaintext_response(StatusCode::INTERNAL_SERVER_ERROR, "misconfigured container endpoint");
		};
		let Some(handle) = self.container_ports.get(&endpoint.id) else {
			return plaintext_response(StatusCode::SERVICE_UNAVAILABLE, "container not started");
		};
		let Some(port) = handle.bound_port() else {
			return plaintext_response(StatusCode::SERVICE_UNAVAILABLE, "container port not yet bound");
		};

		// Inbound header manipulation carries `hostPort` in the scripting
		// context so default rules can interpolate it.
		ctx.host_port = Some(port);

		let mut proxy_cfg = container_cfg.proxy.clone();
		proxy_cfg.backend_url = format!("http://127.0.0.1:{port}");
		// Container endpoints get a default inbound rule set ahead of any
		// user-configured ones, so a rule the user writes can still override
		// a default by naming the same header later.
		let mut inbound = container_default_headers(ctx, port);
		inbound.extend(proxy_cfg.inbound_headers.drain(..));
		proxy_cfg.inbound_headers = inbound;

		match proxy::handle(
			&proxy_cfg,
			&endpoint.path_prefix,
			TranslationMode::None,
			&[],
			public_base,
			&self.client,
			ctx,
			method.clone(),
			headers,
		)
		.await
		{
			Ok(result) => result.response,
			Err(e) => {
				tracing::warn!(endpoint = %endpoint.id, error = %e, "container request failed");
				plaintext_response(e.status_code(), e.to_string())
			},
		}
	}

	/// Resolves the backend WebSocket URL for a proxy/container endpoint
	/// without running the full dispatch pipeline, so the listener can
	/// perform the upgrade before any request body is read, ahead of the
	/// proxy flow's body-buffering step.
	pub fn resolve_ws_backend(&self, uri: &http::Uri) -> Option<String> {
		let path = uri.path();
		let endpoint = self.select_endpoint(path)?;
		let (translated_path, captures) = translate_path(endpoint, path);
		let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();

		let backend_base = match endpoint.kind {
			EndpointType::Proxy => {
				let proxy_cfg = endpoint.proxy.as_ref()?;
				proxy::substitute_captures(&proxy_cfg.backend_url, &captures)
			},
			EndpointType::Container => {
				let handle = self.container_ports.get(&endpoint.id)?;
				let port = handle.bound_port()?;
				format!("http://127.0.0.1:{port}")
			},
			EndpointType::Mock => return None,
		};

		let ws_base = if let Some(rest) = backend_base.strip_prefix("https://") {
			format!("wss://{rest}")
		} else if let Some(rest) = backend_base.strip_prefix("http://") {
			format!("ws://{rest}")
		} else {
			backend_base
		};
		Some(format!("{}{translated_path}{query}", ws_base.trim_end_matches('/')))
	}

	fn use_global_cors(&self, _endpoint: &Endpoint, rule_override: Option<TriState>) -> bool {
		if self.config.cors.is_none() {
			return false;
		}
		!matches!(rule_override, Some(TriState::Off))
	}

	async fn preflight_response(&self, ctx: &RequestContext) -> Response {
		let mut response = empty_response(StatusCode::NO_CONTENT);
		if let Some(cors_cfg) = &self.config.cors {
			for (name, value) in cors::compute_headers(cors_cfg, ctx).await {
				response.headers_mut().insert(name, value);
			}
		}
		response
	}
}

/// An endpoint that itself handles OPTIONS disables CORS injection for
/// that request. Only mock endpoints declare explicit per-rule
/// methods; proxy/container endpoints forward every method to the backend
/// and never "handle" OPTIONS themselves.
fn endpoint_handles_options(endpoint: &Endpoint, path: &str) -> bool {
	if endpoint.kind != EndpointType::Mock {
		return false;
	}
	endpoint.flattened_rules().into_iter().any(|rule| {
		rule.enabled
			&& rule.methods.iter().any(|m| m.eq_ignore_ascii_case("OPTIONS"))
			&& crate::path::CompiledPattern::compile(&rule.path_pattern)
				.map(|p| p.matches(path).matched)
				.unwrap_or(false)
	})
}

fn matched_rule_cors(endpoint: &Endpoint, ctx: &RequestContext) -> Option<TriState> {
	endpoint
		.flattened_rules()
		.into_iter()
		.find(|rule| {
			crate::path::CompiledPattern::compile(&rule.path_pattern)
				.map(|p| p.matches(&ctx.path).matched)
				.unwrap_or(false)
		})
		.map(|rule| rule.use_global_cors)
}

/// Default inbound rule set for container endpoints: drop
/// hop-by-hop headers, rewrite `Host` to the container's loopback address,
/// and add the `X-Forwarded-*` trio. Placed ahead of any user-configured
/// inbound rules so a user rule naming the same header still wins.
const HOP_BY_HOP_HEADERS: &[&str] = &[
	"connection",
	"keep-alive",
	"proxy-authenticate",
	"proxy-authorization",
	"te",
	"trailers",
	"transfer-encoding",
	"upgrade",
];

fn container_default_headers(ctx: &RequestContext, host_port: u16) -> Vec<HeaderManipulation> {
	let mut rules: Vec<HeaderManipulation> = HOP_BY_HOP_HEADERS
		.iter()
		.map(|name| HeaderManipulation {
			name: (*name).to_string(),
			mode: HeaderManipulationMode::Drop,
			value: None,
			expression: None,
		})
		.collect();

	rules.push(HeaderManipulation {
		name: "Host".to_string(),
		mode: HeaderManipulationMode::Replace,
		value: Some(format!("127.0.0.1:{host_port}")),
		expression: None,
	});
	rules.push(HeaderManipulation {
		name: "X-Forwarded-For".to_string(),
		mode: HeaderManipulationMode::Replace,
		value: Some(ctx.remote_addr.clone()),
		expression: None,
	});
	rules.push(HeaderManipulation {
		name: "X-Forwarded-Host".to_string(),
		mode: HeaderManipulationMode::Replace,
		value: Some(ctx.get_header("host").unwrap_or_default().to_string()),
		expression: None,
	});
	rules.push(HeaderManipulation {
		name: "X-Forwarded-Proto".to_string(),
		mode: HeaderManipulationMode::Replace,
		value: Some(ctx.scheme.clone()),
		expression: None,
	});
	rules
}

/// Applies an endpoint's translation mode to the path before it reaches a
/// mock/proxy/container handler, returning the translated path and (for
/// `translate` mode) the regex capture groups for `$1..$N` substitution
/// into `ProxyConfig.backend_url`.
fn translate_path(endpoint: &Endpoint, path: &str) -> (String, Vec<String>) {
	match endpoint.translation_mode {
		TranslationMode::None => (path.to_string(), Vec::new()),
		TranslationMode::Strip => {
			let stripped = path.strip_prefix(endpoint.path_prefix.as_str()).unwrap_or(path);
			let stripped = if stripped.starts_with('/') {
				stripped.to_string()
			} else {
				format!("/{stripped}")
			};
			(stripped, Vec::new())
		},
		TranslationMode::Translate => {
			let stripped = path.strip_prefix(endpoint.path_prefix.as_str()).unwrap_or(path);
			let (Some(pattern), Some(replace)) = (&endpoint.translate_pattern, &endpoint.translate_replace) else {
				return (stripped.to_string(), Vec::new());
			};
			match Regex::new(pattern) {
				Ok(re) => {
					let captures = re
						.captures(stripped)
						.map(|caps| (1..caps.len()).filter_map(|i| caps.get(i).map(|m| m.as_str().to_string())).collect())
						.unwrap_or_default();
					(re.replace(stripped, replace.as_str()).to_string(), captures)
				},
				Err(_) => (stripped.to_string(), Vec::new()),
			}
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::TranslationMode;

	fn endpoint(prefix: &str, mode: TranslationMode) -> Endpoint {
		Endpoint {
			id: "e".into(),
			name: "e".into(),
			path_prefix: prefix.into(),
			translation_mode: mode,
			translate_pattern: Some("^/v1".into()),
			translate_replace: Some("/v2".into()),
			kind: EndpointType::Mock,
			enabled: true,
			responses: vec![],
			proxy: None,
			container: None,
		}
	}

	fn endpoint_named(id: &str, prefix: &str) -> Endpoint {
		let mut e = endpoint(prefix, TranslationMode::None);
		e.id = id.to_string();
		e
	}

	fn dispatcher_with(endpoints: Vec<Endpoint>) -> Dispatcher {
		Dispatcher {
			config: Arc::new(AppConfig {
				endpoints,
				..Default::default()
			}),
			client: OutboundClient::new().expect("building outbound client"),
			public_base_fallback: "http://localhost".to_string(),
			https_port: None,
			logger: Arc::new(RequestLogger::new(10)),
			container_ports: std::collections::HashMap::new(),
		}
	}

	#[test]
	fn equal_length_prefix_ties_favor_earliest_declared() {
		let dispatcher = dispatcher_with(vec![endpoint_named("first", "/svc"), endpoint_named("second", "/svc")]);
		let selected = dispatcher.select_endpoint("/svc/foo").unwrap();
		assert_eq!(selected.id, "first");
	}

	#[test]
	fn longer_prefix_wins_regardless_of_declaration_order() {
		let dispatcher = dispatcher_with(vec![endpoint_named("short", "/svc"), endpoint_named("long", "/svc/v2")]);
		let selected = dispatcher.select_endpoint("/svc/v2/items").unwrap();
		assert_eq!(selected.id, "long");
	}

	#[test]
	fn none_mode_is_identity() {
		let ep = endpoint("/svc", TranslationMode::None);
		assert_eq!(translate_path(&ep, "/svc/foo").0, "/svc/foo");
	}

	#[test]
	fn strip_mode_removes_prefix() {
		let ep = endpoint("/svc", TranslationMode::Strip);
		assert_eq!(translate_path(&ep, "/svc/foo").0, "/foo");
	}

	#[test]
	fn translate_mode_applies_regex_after_strip() {
		let ep = endpoint("/svc", TranslationMode::Translate);
		assert_eq!(translate_path(&ep, "/svc/v1/items").0, "/v2/items");
	}

	#[test]
	fn translate_mode_captures_groups_for_backend_substitution() {
		let mut ep = endpoint("/svc", TranslationMode::Translate);
		ep.translate_pattern = Some(r"^/(\w+)/(\d+)$".to_string());
		ep.translate_replace = Some("/$1/$2".to_string());
		let (path, captures) = translate_path(&ep, "/svc/users/42");
		assert_eq!(path, "/users/42");
		assert_eq!(captures, vec!["users".to_string(), "42".to_string()]);
	}

	#[test]
	fn container_default_headers_rewrite_host_and_add_forwarded() {
		let method = http::Method::GET;
		let uri: http::Uri = "/svc/health".parse().unwrap();
		let mut raw_headers = http::HeaderMap::new();
		raw_headers.insert("host", http::HeaderValue::from_static("mock.local"));
		let ctx = RequestContext::build(&method, &uri, &raw_headers, bytes::Bytes::new())
			.with_connection_info("http", "10.0.0.1:5555", None);

		let rules = container_default_headers(&ctx, 49160);
		let host_rule = rules.iter().find(|r| r.name == "Host").unwrap();
		assert_eq!(host_rule.value.as_deref(), Some("127.0.0.1:49160"));
		let fwd_host = rules.iter().find(|r| r.name == "X-Forwarded-Host").unwrap();
		assert_eq!(fwd_host.value.as_deref(), Some("mock.local"));
		assert!(rules.iter().any(|r| r.name == "Connection" && r.mode == crate::model::HeaderManipulationMode::Drop));
	}
}
