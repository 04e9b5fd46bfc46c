//! Global CORS: §6, grounded on the teacher's `http/cors.rs` origin
//! matching and header-injection structure, but driven by the spec's two
//! modes instead of a fixed policy: an ordered list of `{name, expression}`
//! header templates, or a script that computes headers directly.
//!
//! Resolves Open Question 2: when a `headers`-mode expression renders to an
//! empty string, the header is suppressed entirely rather than sent empty,
//! matching how most reverse proxies treat a blank computed header as "not
//! set" rather than "set to nothing".

use std::time::Duration;

use http::{HeaderName, HeaderValue};

use crate::context::RequestContext;
use crate::model::CorsConfig;
use crate::script;

const HEADER_EXPR_TIMEOUT: Duration = script::HEADER_EXPR_TIMEOUT;
const SCRIPT_TIMEOUT: Duration = Duration::from_secs(2);

/// Computes the set of CORS response headers to add for this request, given
/// the global config and the inbound `Origin` header (if any).
pub async fn compute_headers(cors: &CorsConfig, ctx: &RequestContext) -> Vec<(HeaderName, HeaderValue)> {
	match cors {
		CorsConfig::Headers { entries } => compute_from_expressions(entries, ctx).await,
		CorsConfig::Script { script: src } => compute_from_script(src, ctx).await,
	}
}

async fn compute_from_expressions(
	entries: &[crate::model::CorsHeaderExpr],
	ctx: &RequestContext,
) -> Vec<(HeaderName, HeaderValue)> {
	let mut out = Vec::new();
	for entry in entries {
		let name = entry.name.clone();
		let expr = entry.expression.clone();
		let request_json = ctx.to_json();
		let rendered = tokio::time::timeout(HEADER_EXPR_TIMEOUT, async {
			tokio::task::spawn_blocking(move || script::eval_value(&expr, &request_json, HEADER_EXPR_TIMEOUT))
				.await
				.unwrap_or_else(|e| Ok(serde_json::Value::String(format!("<join error: {e}>"))))
		})
		.await;

		let value = match rendered {
			Ok(Ok(v)) => v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()),
			Ok(Err(e)) => {
				tracing::warn!(header = %name, error = %e, "cors header expression failed");
				continue;
			},
			Err(_) => {
				tracing::warn!(header = %name, "cors header expression timed out");
				continue;
			},
		};

		if value.is_empty() {
			continue;
		}
		if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
			out.push((name, value));
		}
	}
	out
}

async fn compute_from_script(src: &str, ctx: &RequestContext) -> Vec<(HeaderName, HeaderValue)> {
	let origin = ctx.get_header("origin").unwrap_or_default().to_string();
	let request_json = ctx.to_json();
	let request_headers = ctx.headers.clone();
	let script_src = src.to_string();

	let result = tokio::time::timeout(
		SCRIPT_TIMEOUT,
		tokio::task::spawn_blocking(move || script::eval_cors_script(&script_src, &request_json, &origin, &request_headers)),
	)
	.await;

	let map = match result {
		Ok(Ok(Ok(m))) => m,
		Ok(Ok(Err(e))) => {
			tracing::warn!(error = %e, "cors script failed");
			return Vec::new();
		},
		Ok(Err(e)) => {
			tracing::warn!(error = %e, "cors script task panicked");
			return Vec::new();
		},
		Err(_) => {
			tracing::warn!("cors script timed out");
			return Vec::new();
		},
	};

	let mut out = Vec::new();
	for (k, s) in map {
		if s.is_empty() {
			continue;
		}
		if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(k.as_bytes()), HeaderValue::from_str(&s)) {
			out.push((name, value));
		}
	}
	out
}

pub fn is_preflight(method: &http::Method, headers: &http::HeaderMap) -> bool {
	method == http::Method::OPTIONS && headers.contains_key("access-control-request-method")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::CorsHeaderExpr;
	use bytes::Bytes;

	fn ctx() -> RequestContext {
		let method = http::Method::GET;
		let uri: http::Uri = "/".parse().unwrap();
		let mut headers = http::HeaderMap::new();
		headers.insert("origin", HeaderValue::from_static("https://example.test"));
		RequestContext::build(&method, &uri, &headers, Bytes::new())
	}

	#[tokio::test]
	async fn empty_expression_suppresses_header() {
		let cors = CorsConfig::Headers {
			entries: vec![CorsHeaderExpr {
				name: "Access-Control-Allow-Origin".into(),
				expression: "".into(),
			}],
		};
		let headers = compute_headers(&cors, &ctx()).await;
		assert!(headers.is_empty());
	}

	#[tokio::test]
	async fn literal_expression_sets_header() {
		let cors = CorsConfig::Headers {
			entries: vec![CorsHeaderExpr {
				name: "Access-Control-Allow-Origin".into(),
				expression: "'*'".into(),
			}],
		};
		let headers = compute_headers(&cors, &ctx()).await;
		assert_eq!(headers.len(), 1);
		assert_eq!(headers[0].1, HeaderValue::from_static("*"));
	}

	#[tokio::test]
	async fn origin_reflecting_expression_sets_header() {
		let cors = CorsConfig::Headers {
			entries: vec![CorsHeaderExpr {
				name: "Access-Control-Allow-Origin".into(),
				expression: "request.headers.origin".into(),
			}],
		};
		let headers = compute_headers(&cors, &ctx()).await;
		assert_eq!(headers.len(), 1);
		assert_eq!(headers[0].1, HeaderValue::from_static("https://example.test"));
	}

	#[test]
	fn preflight_detection() {
		let mut headers = http::HeaderMap::new();
		headers.insert("access-control-request-method", HeaderValue::from_static("GET"));
		assert!(is_preflight(&http::Method::OPTIONS, &headers));
		assert!(!is_preflight(&http::Method::GET, &headers));
	}
}
