//! Proxy Handler. Forwards a matched request to a configured backend,
//! applies inbound/outbound header manipulation, optional status
//! translation, and optional body transformation, and rewrites same-origin
//! redirects so clients never see the backend's real address.

pub mod headers;
pub mod health;
pub mod redirect;
pub mod websocket;

use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::client::OutboundClient;
use crate::context::RequestContext;
use crate::error::ProxyError;
use crate::http::{full, Response};
use crate::model::{ProxyConfig, TranslationMode};
use crate::script;

pub struct ProxyResult {
	pub response: Response,
}

/// `path_prefix`/`translation_mode` describe the endpoint's translation
/// rule; `ctx.path` already holds the *translated* path (the dispatcher
/// applies `translate_path` before calling in), and `capture_groups` holds
/// any regex captures from `translate` mode for `$1..$N` substitution into
/// `backend_url`.
#[allow(clippy::too_many_arguments)]
pub async fn handle(
	proxy: &ProxyConfig,
	path_prefix: &str,
	translation_mode: TranslationMode,
	capture_groups: &[String],
	public_base: &str,
	client: &OutboundClient,
	ctx: &RequestContext,
	method: http::Method,
	mut inbound_headers: HeaderMap,
) -> Result<ProxyResult, ProxyError> {
	headers::apply(&proxy.inbound_headers, &mut inbound_headers, ctx);

	let backend_base = substitute_captures(&proxy.backend_url, capture_groups);
	let query = ctx.query_string();
	let backend_url = build_backend_url(&backend_base, &ctx.path, &query).map_err(|_| ProxyError::InvalidBackendUrl(proxy.backend_url.clone()))?;

	let timeout = Duration::from_secs(proxy.timeout_s);
	let (status, mut resp_headers, body) = client
		.send(method, &backend_url, inbound_headers, ctx.raw_body.clone(), timeout)
		.await
		.map_err(ProxyError::BackendUnreachable)?;

	headers::apply(&proxy.outbound_headers, &mut resp_headers, ctx);

	if let Some(location) = resp_headers.get(http::header::LOCATION).cloned() {
		if let Ok(loc_str) = location.to_str() {
			if let Some(rewritten) = redirect::rewrite_location(
				loc_str,
				&backend_base,
				path_prefix,
				translation_mode,
				&ctx.path,
				public_base,
			) {
				resp_headers.insert(http::header::LOCATION, rewritten);
			}
		}
	}

	let final_status = if proxy.status_passthrough {
		status
	} else {
		translate_status(&proxy.status_translation, status)
	};

	let content_type = resp_headers
		.get(http::header::CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
		.to_string();
	let final_body = match &proxy.body_transform {
		Some(transform_src) => transform_body(transform_src, &body, &content_type, ctx),
		None => body,
	};

	let mut builder = http::Response::builder().status(final_status);
	for (name, value) in resp_headers.iter() {
		builder = builder.header(name, value);
	}
	let response = builder
		.body(full(final_body))
		.expect("validated status and header values always build a response");

	Ok(ProxyResult { response })
}

/// `path` is the already-translated request path; the backend URL is
/// composed from `backend_url` plus that path, with no further
/// prefix-stripping here, since the dispatcher's `translate_path` already
/// produced the path each translation mode calls for.
fn build_backend_url(backend_base: &str, path: &str, query: &str) -> Result<String, ()> {
	let mut url = format!("{}{}", backend_base.trim_end_matches('/'), path);
	if !query.is_empty() {
		url.push('?');
		url.push_str(query);
	}
	url::Url::parse(&url).map(|_| ()).map_err(|_| ())?;
	Ok(url)
}

/// Substitutes `$1..$N` in `backend_url` with regex capture groups from
/// `translate` mode's path match (§6). Larger indices are substituted first
/// so `$10` isn't clobbered by a `$1` replacement.
pub(crate) fn substitute_captures(backend_url: &str, captures: &[String]) -> String {
	let mut out = backend_url.to_string();
	for (i, value) in captures.iter().enumerate().rev() {
		out = out.replace(&format!("${}", i + 1), value);
	}
	out
}

fn translate_status(rules: &[crate::model::StatusTranslation], status: StatusCode) -> StatusCode {
	for rule in rules {
		if status_pattern_matches(&rule.from_pattern, status.as_u16()) {
			if let Ok(code) = StatusCode::from_u16(rule.to_code) {
				return code;
			}
		}
	}
	status
}

/// §4.9.2's pattern grammar: an exact decimal (`"404"`) or a class
/// (`"Nxx"`, `N` in `1..=5`) matching any code whose first digit is `N`.
/// §8's testable property: `matches(code, "Nxx") ⇔ code/100 == N`.
pub(crate) fn status_pattern_matches(pattern: &str, code: u16) -> bool {
	if let Ok(exact) = pattern.parse::<u16>() {
		return exact == code;
	}
	let bytes = pattern.as_bytes();
	if bytes.len() == 3 && bytes[1].to_ascii_lowercase() == b'x' && bytes[2].to_ascii_lowercase() == b'x' {
		if let Some(class) = (bytes[0] as char).to_digit(10) {
			return (code / 100) as u32 == class;
		}
	}
	false
}

/// §4.9.1 step 6: a JS program with `body` (the backend's raw response body
/// as a string) and `contentType` globals; its return value becomes the
/// final body.
fn transform_body(script_src: &str, body: &Bytes, content_type: &str, ctx: &RequestContext) -> Bytes {
	let body_str = String::from_utf8_lossy(body).to_string();
	match script::eval_body_transform(script_src, &ctx.to_json(), &body_str, content_type) {
		Ok(value) => Bytes::from(value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())),
		Err(e) => {
			tracing::warn!(error = %e, "body transform failed, passing body through unchanged");
			body.clone()
		},
	}
}

impl RequestContext {
	/// Reconstructs a canonical query string from the parsed map. The only
	/// consumer is the outbound backend URL, which does not need to
	/// preserve the original key ordering or duplicate keys.
	pub fn query_string(&self) -> String {
		url::form_urlencoded::Serializer::new(String::new())
			.extend_pairs(self.query.iter())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backend_url_appends_translated_path() {
		let url = build_backend_url("http://backend:8080", "/items/1", "").unwrap();
		assert_eq!(url, "http://backend:8080/items/1");
	}

	#[test]
	fn substitute_captures_fills_in_placeholders() {
		let captures = vec!["tenant-a".to_string(), "42".to_string()];
		let out = substitute_captures("http://$1.backend.internal/users/$2", &captures);
		assert_eq!(out, "http://tenant-a.backend.internal/users/42");
	}

	#[test]
	fn status_translation_applies_first_match() {
		let rules = vec![crate::model::StatusTranslation {
			from_pattern: "5xx".to_string(),
			to_code: 502,
		}];
		let translated = translate_status(&rules, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(translated, StatusCode::BAD_GATEWAY);
	}

	#[test]
	fn status_translation_falls_through_on_no_match() {
		let rules = vec![crate::model::StatusTranslation {
			from_pattern: "4xx".to_string(),
			to_code: 400,
		}];
		let translated = translate_status(&rules, StatusCode::OK);
		assert_eq!(translated, StatusCode::OK);
	}

	#[test]
	fn status_pattern_matches_exact_and_class() {
		assert!(status_pattern_matches("404", 404));
		assert!(!status_pattern_matches("404", 403));
		assert!(status_pattern_matches("5xx", 502));
		assert!(status_pattern_matches("5xx", 599));
		assert!(!status_pattern_matches("5xx", 402));
	}
}
