//! Shared header manipulation for the proxy and container handlers. The
//! same manipulator is shared between proxy and container configs rather
//! than duplicated, since `ContainerConfig` embeds a `ProxyConfig` by
//! flattening. Applies an ordered list of drop/replace/expression rules to
//! a header map in place.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::context::RequestContext;
use crate::model::{HeaderManipulation, HeaderManipulationMode};
use crate::script;

pub fn apply(rules: &[HeaderManipulation], headers: &mut HeaderMap, ctx: &RequestContext) {
	for rule in rules {
		let Ok(name) = HeaderName::from_bytes(rule.name.as_bytes()) else {
			continue;
		};
		match rule.mode {
			HeaderManipulationMode::Drop => {
				headers.remove(&name);
			},
			HeaderManipulationMode::Replace => {
				let Some(value) = &rule.value else { continue };
				if let Ok(hv) = HeaderValue::from_str(value) {
					headers.insert(name, hv);
				}
			},
			HeaderManipulationMode::Expression => {
				let Some(expr) = &rule.expression else { continue };
				match script::eval_value(expr, &ctx.to_json(), script::HEADER_EXPR_TIMEOUT) {
					Ok(value) => {
						let rendered = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
						if rendered.is_empty() {
							headers.remove(&name);
						} else if let Ok(hv) = HeaderValue::from_str(&rendered) {
							headers.insert(name, hv);
						}
					},
					Err(e) => {
						tracing::warn!(header = %rule.name, error = %e, "header expression failed, leaving header untouched");
					},
				}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use bytes::Bytes;

	fn ctx() -> RequestContext {
		let method = http::Method::GET;
		let uri: http::Uri = "/".parse().unwrap();
		let headers = HeaderMap::new();
		RequestContext::build(&method, &uri, &headers, Bytes::new())
	}

	#[test]
	fn drop_removes_header() {
		let mut headers = HeaderMap::new();
		headers.insert("x-secret", HeaderValue::from_static("value"));
		let rules = vec![HeaderManipulation {
			name: "x-secret".into(),
			mode: HeaderManipulationMode::Drop,
			value: None,
			expression: None,
		}];
		apply(&rules, &mut headers, &ctx());
		assert!(!headers.contains_key("x-secret"));
	}

	#[test]
	fn replace_sets_literal_value() {
		let mut headers = HeaderMap::new();
		let rules = vec![HeaderManipulation {
			name: "x-forwarded".into(),
			mode: HeaderManipulationMode::Replace,
			value: Some("mockelot".into()),
			expression: None,
		}];
		apply(&rules, &mut headers, &ctx());
		assert_eq!(headers.get("x-forwarded").unwrap(), "mockelot");
	}
}
