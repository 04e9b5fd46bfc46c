//! Template Engine: §4.6. Jinja2-style templating via `minijinja`, the same
//! templating crate the teacher already depends on for `agent-proxy`'s
//! response rewriting. Parse/render errors are non-fatal: callers fall back
//! to the static body/header value rather than failing the request (§4.6
//! "a broken template degrades to the literal text").
//!
//! §8 Scenario 1 writes its worked example in the Go-template grammar the
//! spec's data model was originally described in — a leading-dot, implicit-
//! root path like `{{.PathParams.id}}` — rather than minijinja's own
//! `{{ request.pathParams.id }}` lookup, and minijinja's parser rejects a
//! bare leading dot outright. Rather than embed a second template engine,
//! [`rewrite_dot_paths`] recognizes that one grammar and rewrites it into
//! the equivalent `request.*` expression before the source reaches
//! minijinja, so a rule body written the way the spec documents it renders
//! the same as one written in minijinja's native syntax. See DESIGN.md's
//! recorded deviations for what this shim does and does not cover.

use std::sync::OnceLock;

use chrono::Utc;
use minijinja::value::Value as MiniValue;
use minijinja::{Environment, Error as MiniError};
use regex::Regex;
use serde_json::Value;

pub fn render(template_src: &str, request: &Value) -> Result<String, MiniError> {
	let rewritten = rewrite_dot_paths(template_src);
	let env = build_env();
	let tmpl = env.template_from_str(&rewritten)?;
	let ctx = MiniValue::from_serialize(request);
	tmpl.render(minijinja::context! { request => ctx })
}

fn dot_path_pattern() -> &'static Regex {
	static PATTERN: OnceLock<Regex> = OnceLock::new();
	PATTERN.get_or_init(|| Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\s*\}\}").expect("valid dot-path regex"))
}

/// Maps a capitalized Go-style root field name to the lowerCamelCase key
/// [`crate::context::RequestContext::to_json`] actually emits. Only the
/// root segment is recased; everything after it is a dynamic key (a path
/// param name, a header name, …) whose case must be preserved verbatim.
fn translate_root(root: &str) -> Option<&'static str> {
	match root {
		"Method" => Some("method"),
		"Path" => Some("path"),
		"PathParams" => Some("pathParams"),
		"QueryParams" => Some("query"),
		"Headers" => Some("headers"),
		"Vars" => Some("vars"),
		"Host" => Some("host"),
		"Scheme" => Some("scheme"),
		"RemoteAddr" => Some("remoteAddr"),
		"HostPort" => Some("hostPort"),
		_ => None,
	}
}

/// Rewrites `{{.Root.rest...}}` into `{{ request.root.rest... }}`, leaving
/// anything that isn't a recognized leading-dot expression untouched so
/// native minijinja syntax keeps working unchanged.
fn rewrite_dot_paths(template_src: &str) -> String {
	dot_path_pattern()
		.replace_all(template_src, |caps: &regex::Captures| {
			let path = &caps[1];
			let (root, rest) = path.split_once('.').unwrap_or((path, ""));
			// `Body.Raw`/`Body.JSON`/`Body.Form` collapse onto the flat
			// `body`/`json`/`form` keys `to_json` exposes at the top level
			// rather than nested under a `body` object.
			let translated = if root == "Body" {
				let (sub, sub_rest) = rest.split_once('.').unwrap_or((rest, ""));
				let base = match sub {
					"Raw" => "body",
					"JSON" => "json",
					"Form" => "form",
					_ => "json",
				};
				Some(if sub_rest.is_empty() { base.to_string() } else { format!("{base}.{sub_rest}") })
			} else {
				translate_root(root).map(|mapped| if rest.is_empty() { mapped.to_string() } else { format!("{mapped}.{rest}") })
			};
			match translated {
				Some(expr) => format!("{{{{ request.{expr} }}}}"),
				None => caps[0].to_string(),
			}
		})
		.into_owned()
}

fn build_env<'a>() -> Environment<'a> {
	let mut env = Environment::new();
	env.add_filter("upper", |s: String| s.to_uppercase());
	env.add_filter("lower", |s: String| s.to_lowercase());
	env.add_filter("trim", |s: String| s.trim().to_string());
	env.add_filter("contains", |s: String, needle: String| s.contains(&needle));
	env.add_filter("replace", |s: String, from: String, to: String| s.replace(&from, &to));
	env.add_filter("split", |s: String, sep: String| -> Vec<String> {
		s.split(&sep as &str).map(str::to_string).collect()
	});
	env.add_filter("join", |items: Vec<String>, sep: String| items.join(&sep));
	env.add_filter("default", |value: MiniValue, fallback: MiniValue| {
		if value.is_undefined() || value.is_none() {
			fallback
		} else {
			value
		}
	});
	env.add_function("json", |value: MiniValue| -> Result<String, MiniError> {
		serde_json::to_string(&value).map_err(|e| MiniError::new(minijinja::ErrorKind::InvalidOperation, e.to_string()))
	});
	env.add_function("jsonPretty", |value: MiniValue| -> Result<String, MiniError> {
		serde_json::to_string_pretty(&value).map_err(|e| MiniError::new(minijinja::ErrorKind::InvalidOperation, e.to_string()))
	});
	env.add_function("now", || Utc::now().to_rfc3339());
	env.add_function("timestamp", || Utc::now().timestamp());
	env.add_function("timestampMs", || Utc::now().timestamp_millis());
	env.add_function("coalesce", |values: Vec<MiniValue>| -> MiniValue {
		values
			.into_iter()
			.find(|v| !v.is_undefined() && !v.is_none())
			.unwrap_or(MiniValue::UNDEFINED)
	});
	env
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_request_field() {
		let req = serde_json::json!({"method": "GET", "path": "/foo"});
		let out = render("Method: {{ request.method }}", &req).unwrap();
		assert_eq!(out, "Method: GET");
	}

	#[test]
	fn upper_filter_applies() {
		let req = serde_json::json!({"method": "get"});
		let out = render("{{ request.method | upper }}", &req).unwrap();
		assert_eq!(out, "GET");
	}

	#[test]
	fn json_function_serializes_value() {
		let req = serde_json::json!({"a": 1});
		let out = render("{{ json(request) }}", &req).unwrap();
		assert_eq!(out, r#"{"a":1}"#);
	}

	#[test]
	fn broken_syntax_is_an_error_not_a_panic() {
		let req = serde_json::json!({});
		let err = render("{{ request.", &req);
		assert!(err.is_err());
	}

	/// §8 Scenario 1, reproduced literally: `path_pattern="/users/{id}"`,
	/// body `{"id":"{{.PathParams.id}}"}`, request `GET /users/42` renders
	/// to `{"id":"42"}`. Written the way the spec's worked example is
	/// written, not translated into minijinja's native grammar.
	#[test]
	fn scenario_1_literal_dot_path_renders() {
		let req = serde_json::json!({"pathParams": {"id": "42"}});
		let out = render(r#"{"id":"{{.PathParams.id}}"}"#, &req).unwrap();
		assert_eq!(out, r#"{"id":"42"}"#);
	}

	#[test]
	fn dot_path_body_json_field_translates() {
		let req = serde_json::json!({"json": {"name": "ana"}});
		let out = render("{{.Body.JSON.name}}", &req).unwrap();
		assert_eq!(out, "ana");
	}

	#[test]
	fn dot_path_query_params_translates_to_query_key() {
		let req = serde_json::json!({"query": {"page": "2"}});
		let out = render("{{.QueryParams.page}}", &req).unwrap();
		assert_eq!(out, "2");
	}

	#[test]
	fn unrecognized_root_is_left_untouched_and_errors_like_before() {
		let req = serde_json::json!({});
		// `.Bogus` isn't a spec root field; the rewrite leaves it alone and
		// minijinja rejects the bare leading dot exactly as it did before
		// this shim existed.
		assert!(render("{{.Bogus}}", &req).is_err());
	}
}
