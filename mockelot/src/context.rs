//! Request-Context Builder. Produces a read-only snapshot of an
//! incoming request (method, path, query, headers, parsed body) that every
//! downstream component (validator, template engine, script engine) reads
//! from rather than re-parsing the raw request.

use std::collections::HashMap;

use bytes::Bytes;
use serde_json::Value;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
	pub method: String,
	pub path: String,
	pub query: HashMap<String, String>,
	pub headers: HashMap<String, String>,
	pub raw_body: Bytes,
	pub json_body: Option<Value>,
	pub form_body: Option<HashMap<String, String>>,
	pub path_params: HashMap<String, String>,
	/// Extra named captures produced during validation (regex groups), kept
	/// separate from `path_params` so template/script expressions can
	/// disambiguate `pathParams.x` from `vars.x`.
	pub vars: HashMap<String, String>,
	/// "http" or "https", set by the listener the connection arrived on.
	pub scheme: String,
	pub remote_addr: String,
	/// Container endpoints only: the host-side port the container is bound
	/// to, exposed to header expressions as `request.hostPort`.
	pub host_port: Option<u16>,
}

impl RequestContext {
	pub fn build(
		method: &http::Method,
		uri: &http::Uri,
		headers: &http::HeaderMap,
		body: Bytes,
	) -> RequestContext {
		let path = uri.path().to_string();
		let query = uri
			.query()
			.map(parse_query)
			.unwrap_or_default();
		let header_map = headers
			.iter()
			.map(|(name, value)| {
				(
					name.as_str().to_string(),
					value.to_str().unwrap_or_default().to_string(),
				)
			})
			.collect();

		let content_type = headers
			.get(http::header::CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();

		let json_body = if content_type.contains("application/json") && !body.is_empty() {
			serde_json::from_slice(&body).ok()
		} else {
			None
		};

		let form_body = if content_type.contains("application/x-www-form-urlencoded") && !body.is_empty() {
			Some(parse_query(std::str::from_utf8(&body).unwrap_or_default()))
		} else {
			None
		};

		RequestContext {
			method: method.as_str().to_string(),
			path,
			query,
			headers: header_map,
			raw_body: body,
			json_body,
			form_body,
			path_params: HashMap::new(),
			vars: HashMap::new(),
			scheme: "http".to_string(),
			remote_addr: String::new(),
			host_port: None,
		}
	}

	/// Fills in the per-connection fields a listener observes before the
	/// request ever reaches the dispatcher: `host`/`scheme`/`remoteAddr`/
	/// `hostPort` globals.
	pub fn with_connection_info(mut self, scheme: &str, remote_addr: &str, host_port: Option<u16>) -> RequestContext {
		self.scheme = scheme.to_string();
		self.remote_addr = remote_addr.to_string();
		self.host_port = host_port;
		self
	}

	pub fn get_query_param(&self, name: &str) -> Option<&str> {
		self.query.get(name).map(String::as_str)
	}

	pub fn get_header(&self, name: &str) -> Option<&str> {
		let lower = name.to_ascii_lowercase();
		self.headers
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(&lower))
			.map(|(_, v)| v.as_str())
	}

	pub fn body_as_str(&self) -> &str {
		std::str::from_utf8(&self.raw_body).unwrap_or_default()
	}

	/// Serializes the context into a JSON object for template/script
	/// globals (`request.*`).
	pub fn to_json(&self) -> Value {
		serde_json::json!({
			"method": self.method,
			"path": self.path,
			"query": self.query,
			"headers": self.headers,
			"body": self.body_as_str(),
			"json": self.json_body,
			"form": self.form_body,
			"pathParams": self.path_params,
			"vars": self.vars,
			"host": self.get_header("host").unwrap_or_default(),
			"scheme": self.scheme,
			"remoteAddr": self.remote_addr,
			"hostPort": self.host_port,
		})
	}
}

fn parse_query(raw: &str) -> HashMap<String, String> {
	url::form_urlencoded::parse(raw.as_bytes())
		.into_owned()
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_query_and_headers() {
		let method = http::Method::GET;
		let uri: http::Uri = "/foo?a=1&b=two".parse().unwrap();
		let mut headers = http::HeaderMap::new();
		headers.insert("X-Test", http::HeaderValue::from_static("yes"));
		let ctx = RequestContext::build(&method, &uri, &headers, Bytes::new());
		assert_eq!(ctx.get_query_param("a"), Some("1"));
		assert_eq!(ctx.get_query_param("b"), Some("two"));
		assert_eq!(ctx.get_header("x-test"), Some("yes"));
	}

	#[test]
	fn parses_json_body_when_content_type_matches() {
		let method = http::Method::POST;
		let uri: http::Uri = "/foo".parse().unwrap();
		let mut headers = http::HeaderMap::new();
		headers.insert(
			http::header::CONTENT_TYPE,
			http::HeaderValue::from_static("application/json"),
		);
		let body = Bytes::from_static(br#"{"x": 1}"#);
		let ctx = RequestContext::build(&method, &uri, &headers, body);
		assert_eq!(ctx.json_body, Some(serde_json::json!({"x": 1})));
	}

	#[test]
	fn parses_form_body() {
		let method = http::Method::POST;
		let uri: http::Uri = "/foo".parse().unwrap();
		let mut headers = http::HeaderMap::new();
		headers.insert(
			http::header::CONTENT_TYPE,
			http::HeaderValue::from_static("application/x-www-form-urlencoded"),
		);
		let body = Bytes::from_static(b"a=1&b=2");
		let ctx = RequestContext::build(&method, &uri, &headers, body);
		let form = ctx.form_body.unwrap();
		assert_eq!(form.get("a"), Some(&"1".to_string()));
		assert_eq!(form.get("b"), Some(&"2".to_string()));
	}
}
