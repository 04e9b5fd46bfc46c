//! Validator: §4.5. Checks an incoming request's body and headers against a
//! rule's `RequestValidation` before it is allowed to match, recording
//! regex-group captures into `RequestContext.vars` so later template/script
//! stages can reference them (the Open Question-adjacent namespacing
//! decision recorded in SPEC_FULL.md: `vars.*` for validator captures,
//! `pathParams.*` for route captures, kept separate so neither can shadow
//! the other).

use regex::Regex;

use crate::context::RequestContext;
use crate::model::{HeaderValidation, HeaderValidationMode, MatchType, RequestValidation, ValidationMode};
use crate::script;

#[derive(Debug, Default)]
pub struct ValidationOutcome {
	pub passed: bool,
	pub vars: Vec<(String, String)>,
	pub error: Option<String>,
}

pub fn validate(rule: &RequestValidation, ctx: &RequestContext) -> ValidationOutcome {
	let mut vars = Vec::new();

	let body_ok = match rule.mode {
		ValidationMode::None => true,
		ValidationMode::Static => match &rule.pattern {
			Some(pattern) => static_body_matches(rule.match_type, pattern, ctx.body_as_str()),
			None => true,
		},
		ValidationMode::Regex => match validate_regex_body(rule, ctx, &mut vars) {
			Ok(ok) => ok,
			Err(e) => {
				return ValidationOutcome {
					passed: false,
					vars,
					error: Some(e),
				}
			},
		},
		ValidationMode::Script => match validate_script_body(rule, ctx, &mut vars) {
			Ok(ok) => ok,
			Err(e) => {
				return ValidationOutcome {
					passed: false,
					vars,
					error: Some(e),
				}
			},
		},
	};

	if !body_ok {
		return ValidationOutcome {
			passed: false,
			vars,
			error: None,
		};
	}

	for header_rule in &rule.headers {
		match validate_header(header_rule, ctx, &mut vars) {
			Ok(true) => {},
			Ok(false) => {
				return ValidationOutcome {
					passed: false,
					vars,
					error: None,
				}
			},
			Err(e) => {
				return ValidationOutcome {
					passed: false,
					vars,
					error: Some(e),
				}
			},
		}
	}

	ValidationOutcome {
		passed: true,
		vars,
		error: None,
	}
}

fn validate_regex_body(
	rule: &RequestValidation,
	ctx: &RequestContext,
	vars: &mut Vec<(String, String)>,
) -> Result<bool, String> {
	let Some(pattern) = &rule.pattern else {
		return Ok(true);
	};
	let re = Regex::new(pattern).map_err(|e| format!("invalid validation pattern: {e}"))?;
	match re.captures(ctx.body_as_str()) {
		Some(caps) => {
			for name in re.capture_names().flatten() {
				if let Some(m) = caps.name(name) {
					vars.push((name.to_string(), m.as_str().to_string()));
				}
			}
			// §4.5: "numbered groups are also exposed as $1, $2, …" alongside
			// any named groups above.
			for i in 1..caps.len() {
				if let Some(m) = caps.get(i) {
					vars.push((format!("${i}"), m.as_str().to_string()));
				}
			}
			Ok(true)
		},
		None => Ok(false),
	}
}

fn validate_script_body(
	rule: &RequestValidation,
	ctx: &RequestContext,
	vars: &mut Vec<(String, String)>,
) -> Result<bool, String> {
	let Some(src) = &rule.script else {
		return Ok(true);
	};
	let result = script::eval_validation_script(src, &ctx.to_json())?;
	vars.extend(result.vars);
	Ok(result.valid)
}

fn validate_header(
	rule: &HeaderValidation,
	ctx: &RequestContext,
	vars: &mut Vec<(String, String)>,
) -> Result<bool, String> {
	let value = ctx.get_header(&rule.name);

	match rule.mode {
		HeaderValidationMode::None => Ok(true),
		HeaderValidationMode::Exact | HeaderValidationMode::Contains => {
			let Some(value) = value else {
				return Ok(!rule.required);
			};
			let Some(pattern) = &rule.pattern else {
				return Ok(true);
			};
			let matched = match rule.mode {
				HeaderValidationMode::Exact => value == pattern,
				HeaderValidationMode::Contains => value.contains(pattern.as_str()),
				_ => unreachable!(),
			};
			Ok(matched)
		},
		HeaderValidationMode::Regex => {
			let Some(value) = value else {
				return Ok(!rule.required);
			};
			let Some(pattern) = &rule.pattern else {
				return Ok(true);
			};
			let re = Regex::new(pattern).map_err(|e| format!("invalid header pattern for {}: {e}", rule.name))?;
			match re.captures(value) {
				Some(caps) => {
					// Namespaced `<header>_<group>` so a regex header rule can
					// never shadow a var extracted from the body or another
					// header (§4.5).
					for name in re.capture_names().flatten() {
						if let Some(m) = caps.name(name) {
							vars.push((format!("{}_{}", rule.name, name), m.as_str().to_string()));
						}
					}
					Ok(true)
				},
				None => Ok(false),
			}
		},
		HeaderValidationMode::Script => {
			let Some(value) = value else {
				return Ok(!rule.required);
			};
			let Some(src) = &rule.script else {
				return Ok(true);
			};
			let mut augmented = ctx.to_json();
			if let Some(obj) = augmented.as_object_mut() {
				obj.insert("headerValue".to_string(), serde_json::Value::String(value.to_string()));
			}
			let result = script::eval_validation_script(src, &augmented)?;
			vars.extend(result.vars);
			Ok(result.valid)
		},
	}
}

/// Also exercises the `MatchType` enum used by §4.5's body-match mode
/// distinct from header validation's exact/contains split.
pub fn static_body_matches(match_type: MatchType, expected: &str, actual: &str) -> bool {
	match match_type {
		MatchType::Exact => expected == actual,
		MatchType::Contains => actual.contains(expected),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::HeaderValidation;
	use bytes::Bytes;

	fn ctx_with_body(body: &str) -> RequestContext {
		let method = http::Method::POST;
		let uri: http::Uri = "/x".parse().unwrap();
		let headers = http::HeaderMap::new();
		RequestContext::build(&method, &uri, &headers, Bytes::copy_from_slice(body.as_bytes()))
	}

	#[test]
	fn regex_mode_extracts_vars() {
		let rule = RequestValidation {
			mode: ValidationMode::Regex,
			pattern: Some(r"id=(?P<id>\d+)".to_string()),
			..Default::default()
		};
		let ctx = ctx_with_body("id=42");
		let outcome = validate(&rule, &ctx);
		assert!(outcome.passed);
		// §4.5: a named group's value is exposed both under its name and,
		// alongside it, under its numbered position ($1, $2, …).
		assert_eq!(
			outcome.vars,
			vec![("id".to_string(), "42".to_string()), ("$1".to_string(), "42".to_string())]
		);
	}

	#[test]
	fn regex_mode_rejects_non_match() {
		let rule = RequestValidation {
			mode: ValidationMode::Regex,
			pattern: Some(r"^ok$".to_string()),
			..Default::default()
		};
		let ctx = ctx_with_body("nope");
		assert!(!validate(&rule, &ctx).passed);
	}

	#[test]
	fn required_header_missing_fails() {
		let rule = RequestValidation {
			headers: vec![HeaderValidation {
				name: "X-Api-Key".to_string(),
				mode: HeaderValidationMode::Exact,
				pattern: Some("secret".to_string()),
				script: None,
				required: true,
			}],
			..Default::default()
		};
		let ctx = ctx_with_body("");
		assert!(!validate(&rule, &ctx).passed);
	}

	#[test]
	fn static_match_type_helper() {
		assert!(static_body_matches(MatchType::Contains, "foo", "xfoox"));
		assert!(!static_body_matches(MatchType::Exact, "foo", "xfoox"));
	}
}
