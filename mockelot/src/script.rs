//! Script Engine. Runs small JavaScript snippets (response bodies,
//! validation predicates, CORS decisions, header expressions) with a hard
//! wall-clock timeout via `boa_engine`'s interrupt hook, one fresh `Context`
//! per invocation so a script can never see state left behind by another
//! request.
//!
//! Two execution shapes cover every call site: [`eval_value`] runs a script
//! and returns its completion value (body transforms, header expressions),
//! while [`eval_mutating`] seeds a named global object, runs the script for
//! its side effects, and reads the object back afterwards (validation's
//! `result`, a mock rule's `response`, CORS's `headers`).
//!
//! No compiled-program cache sits in front of these calls: `boa_engine`'s
//! public API compiles as part of `Context::eval`, so caching would require
//! threading `Context::compile` plus a stored `boa_engine::Module`/`CodeBlock`
//! through every call site, which the crate does not expose as a stable path
//! across versions. Re-parsing a short rule body per request is cheap enough
//! in practice; see DESIGN.md's recorded deviations for the tradeoff.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{js_string, Context, JsError, JsNativeError, JsResult, JsValue, Source};
use serde_json::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const CORS_TIMEOUT: Duration = Duration::from_secs(2);
pub const HEADER_EXPR_TIMEOUT: Duration = Duration::from_secs(1);

fn new_context(timeout: Duration) -> Context {
	let mut context = Context::default();
	let deadline = Instant::now() + timeout;
	context.set_interrupt_handler(move |_ctx| {
		if Instant::now() >= deadline {
			return Err(JsError::from_native(
				JsNativeError::error().with_message("script execution timed out"),
			));
		}
		Ok(())
	});
	context
}

fn install_request(context: &mut Context, request: &Value) -> JsResult<()> {
	let request_js = json_to_js(request, context)?;
	context.register_global_property(js_string!("request"), request_js, Attribute::READONLY)?;
	Ok(())
}

fn install_console(context: &mut Context) -> JsResult<()> {
	let console = boa_engine::object::ObjectInitializer::new(context)
		.function(
			FunctionObjectBuilder::new(context.realm().clone(), |_this, args, _ctx| {
				let line: Vec<String> = args.iter().map(|a| a.display().to_string()).collect();
				tracing::info!(target: "mockelot::script", "{}", line.join(" "));
				Ok(JsValue::undefined())
			})
			.build(),
			js_string!("log"),
			0,
		)
		.build();
	context.register_global_property(js_string!("console"), console, Attribute::all())?;
	Ok(())
}

fn json_to_js(value: &Value, context: &mut Context) -> JsResult<JsValue> {
	let text = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
	context.eval(Source::from_bytes(format!("({text})").as_bytes()))
}

fn js_to_json(value: &JsValue, context: &mut Context) -> Result<Value, String> {
	value
		.to_json(context)
		.map_err(|e| format!("failed to serialize script result: {e}"))
}

fn describe_error(err: JsError) -> String {
	err.to_string()
}

/// Runs `script` and returns its completion value as JSON. Used wherever the
/// script's return value becomes the result directly: body transforms and
/// header-manipulation expressions.
pub fn eval_value(script: &str, request: &Value, timeout: Duration) -> Result<Value, String> {
	let mut context = new_context(timeout);
	install_request(&mut context, request).map_err(describe_error)?;
	install_console(&mut context).map_err(describe_error)?;
	match context.eval(Source::from_bytes(script.as_bytes())) {
		Ok(value) => js_to_json(&value, &mut context),
		Err(err) => Err(describe_error(err)),
	}
}

pub fn eval_request_script(script: &str, request: &Value) -> Result<Value, String> {
	eval_value(script, request, DEFAULT_TIMEOUT)
}

/// Body transforms get `request` plus top-level `body` and `contentType`
/// globals (not nested under `request`), since the backend's raw response
/// isn't part of the inbound request.
pub fn eval_body_transform(script: &str, request: &Value, body: &str, content_type: &str) -> Result<Value, String> {
	let mut context = new_context(DEFAULT_TIMEOUT);
	install_request(&mut context, request).map_err(describe_error)?;
	install_console(&mut context).map_err(describe_error)?;
	context
		.register_global_property(js_string!("body"), JsValue::from(js_string!(body)), Attribute::READONLY)
		.map_err(describe_error)?;
	context
		.register_global_property(js_string!("contentType"), JsValue::from(js_string!(content_type)), Attribute::READONLY)
		.map_err(describe_error)?;
	match context.eval(Source::from_bytes(script.as_bytes())) {
		Ok(value) => js_to_json(&value, &mut context),
		Err(err) => Err(describe_error(err)),
	}
}

/// Runs `script` with a mutable global named `global_name` seeded from
/// `seed`, then reads that global back as JSON once the script finishes.
/// This shape covers every "script mutates an object, fields are read back"
/// component: validation's `result`, a mock rule's `response`, and CORS's
/// `headers`.
fn eval_mutating(
	script: &str,
	request: &Value,
	global_name: &str,
	seed: &Value,
	timeout: Duration,
	install_extra: impl FnOnce(&mut Context) -> JsResult<()>,
) -> Result<Value, String> {
	let mut context = new_context(timeout);
	install_request(&mut context, request).map_err(describe_error)?;
	install_console(&mut context).map_err(describe_error)?;

	let seed_js = json_to_js(seed, &mut context).map_err(describe_error)?;
	context
		.register_global_property(js_string!(global_name.to_string()), seed_js, Attribute::all())
		.map_err(describe_error)?;
	install_extra(&mut context).map_err(describe_error)?;

	if let Err(err) = context.eval(Source::from_bytes(script.as_bytes())) {
		return Err(describe_error(err));
	}

	let current = context
		.global_object()
		.get(js_string!(global_name.to_string()), &mut context)
		.map_err(describe_error)?;
	js_to_json(&current, &mut context)
}

#[derive(Debug, Default, Clone)]
pub struct ValidationScriptResult {
	pub valid: bool,
	pub vars: Vec<(String, String)>,
	pub error: Option<String>,
}

/// Seeds `result = {valid: true, vars: {}, error: ""}`, mutated by the
/// script and read back.
pub fn eval_validation_script(script: &str, request: &Value) -> Result<ValidationScriptResult, String> {
	let seed = serde_json::json!({"valid": true, "vars": {}, "error": ""});
	let result = eval_mutating(script, request, "result", &seed, DEFAULT_TIMEOUT, |_ctx| Ok(()))?;
	Ok(ValidationScriptResult {
		valid: result.get("valid").and_then(Value::as_bool).unwrap_or(false),
		vars: result
			.get("vars")
			.and_then(Value::as_object)
			.map(|obj| {
				obj.iter()
					.filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
					.collect()
			})
			.unwrap_or_default(),
		error: result.get("error").and_then(Value::as_str).map(str::to_string),
	})
}

#[derive(Debug, Clone)]
pub struct ResponseSeed {
	pub status: u16,
	pub status_text: Option<String>,
	pub headers: HashMap<String, String>,
	pub body: String,
	pub delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ResponseScriptResult {
	pub status: u16,
	pub status_text: Option<String>,
	pub headers: HashMap<String, String>,
	pub body: String,
	pub delay_ms: u64,
}

/// Seeds `response` with the rule's defaults, mutated by the script, read
/// back to form the outbound response.
pub fn eval_response_script(script: &str, request: &Value, seed: &ResponseSeed) -> Result<ResponseScriptResult, String> {
	let seed_json = serde_json::json!({
		"status": seed.status,
		"statusText": seed.status_text,
		"headers": seed.headers,
		"body": seed.body,
		"delay": seed.delay_ms,
	});
	let result = eval_mutating(script, request, "response", &seed_json, DEFAULT_TIMEOUT, |_ctx| Ok(()))?;
	Ok(ResponseScriptResult {
		status: result
			.get("status")
			.and_then(Value::as_u64)
			.map(|v| v as u16)
			.unwrap_or(seed.status),
		status_text: result
			.get("statusText")
			.and_then(Value::as_str)
			.map(str::to_string)
			.or_else(|| seed.status_text.clone()),
		headers: result
			.get("headers")
			.and_then(Value::as_object)
			.map(|obj| {
				obj.iter()
					.filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
					.collect()
			})
			.unwrap_or_else(|| seed.headers.clone()),
		body: result
			.get("body")
			.and_then(Value::as_str)
			.map(str::to_string)
			.unwrap_or_else(|| seed.body.clone()),
		delay_ms: result.get("delay").and_then(Value::as_u64).unwrap_or(seed.delay_ms),
	})
}

/// CORS `script` mode mutates a `headers` object and gets
/// `request.{method,path,origin,headers}` plus `matchOrigin`/`allowOrigins`/
/// `getOrigin`/`getHeader` helpers.
pub fn eval_cors_script(script: &str, request: &Value, origin: &str, headers: &HashMap<String, String>) -> Result<HashMap<String, String>, String> {
	let seed = serde_json::json!({});
	let origin_owned = origin.to_string();
	let headers_owned = headers.clone();
	let result = eval_mutating(script, request, "headers", &seed, CORS_TIMEOUT, move |context| {
		install_cors_helpers(context, origin_owned, headers_owned)
	})?;
	Ok(result
		.as_object()
		.map(|obj| {
			obj.iter()
				.filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
				.collect()
		})
		.unwrap_or_default())
}

fn install_cors_helpers(context: &mut Context, origin: String, headers: HashMap<String, String>) -> JsResult<()> {
	let origin_for_get = origin.clone();
	let get_origin = FunctionObjectBuilder::new(context.realm().clone(), move |_this, _args, _ctx| {
		Ok(JsValue::from(js_string!(origin_for_get.as_str())))
	})
	.build();
	context.register_global_property(js_string!("getOrigin"), get_origin, Attribute::all())?;

	let headers_for_get = headers.clone();
	let get_header = FunctionObjectBuilder::new(context.realm().clone(), move |_this, args, ctx| {
		let name = arg_to_string(args.first(), ctx);
		match headers_for_get.iter().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
			Some((_, v)) => Ok(JsValue::from(js_string!(v.as_str()))),
			None => Ok(JsValue::undefined()),
		}
	})
	.build();
	context.register_global_property(js_string!("getHeader"), get_header, Attribute::all())?;

	let origin_for_match = origin.clone();
	let match_origin = FunctionObjectBuilder::new(context.realm().clone(), move |_this, args, ctx| {
		let pattern = arg_to_string(args.first(), ctx);
		Ok(JsValue::from(wildcard_match(&pattern, &origin_for_match)))
	})
	.build();
	context.register_global_property(js_string!("matchOrigin"), match_origin, Attribute::all())?;

	let origin_for_allow = origin;
	let allow_origins = FunctionObjectBuilder::new(context.realm().clone(), move |_this, args, ctx| {
		let matched = args.iter().any(|a| wildcard_match(&arg_to_string(Some(a), ctx), &origin_for_allow));
		Ok(JsValue::from(matched))
	})
	.build();
	context.register_global_property(js_string!("allowOrigins"), allow_origins, Attribute::all())?;

	Ok(())
}

fn arg_to_string(arg: Option<&JsValue>, ctx: &mut Context) -> String {
	arg.and_then(|v| v.to_string(ctx).ok())
		.map(|s| s.to_std_string_escaped())
		.unwrap_or_default()
}

/// One `*` wildcard, matching the literal prefix/suffix around it.
fn wildcard_match(pattern: &str, value: &str) -> bool {
	match pattern.find('*') {
		None => pattern == value,
		Some(idx) => {
			let (prefix, suffix) = (&pattern[..idx], &pattern[idx + 1..]);
			value.len() >= prefix.len() + suffix.len() && value.starts_with(prefix) && value.ends_with(suffix)
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn evaluates_simple_expression() {
		let result = eval_request_script("1 + 1", &Value::Null);
		assert!(result.is_ok());
	}

	#[test]
	fn reports_syntax_errors() {
		let result = eval_request_script("this is not js {{{", &Value::Null);
		assert!(result.is_err());
	}

	#[test]
	fn exposes_request_json() {
		let req = serde_json::json!({"method": "GET"});
		let result = eval_request_script("request.method", &req).unwrap();
		assert_eq!(result, Value::String("GET".to_string()));
	}

	#[test]
	fn validation_script_extracts_vars() {
		let result = eval_validation_script("result.vars.a = request.method; result.valid = true;", &serde_json::json!({"method": "POST"})).unwrap();
		assert!(result.valid);
		assert_eq!(result.vars, vec![("a".to_string(), "POST".to_string())]);
	}

	#[test]
	fn validation_script_can_fail() {
		let result = eval_validation_script("result.valid = false; result.error = 'nope';", &Value::Null).unwrap();
		assert!(!result.valid);
		assert_eq!(result.error.as_deref(), Some("nope"));
	}

	#[test]
	fn response_script_overrides_body_and_status() {
		let seed = ResponseSeed {
			status: 200,
			status_text: None,
			headers: HashMap::new(),
			body: "default".to_string(),
			delay_ms: 0,
		};
		let result = eval_response_script("response.body = request.vars.a; response.status = 201;", &serde_json::json!({"vars": {"a": "hi"}}), &seed).unwrap();
		assert_eq!(result.body, "hi");
		assert_eq!(result.status, 201);
	}

	#[test]
	fn cors_script_sets_header_via_match_origin() {
		let headers = HashMap::new();
		let result = eval_cors_script(
			"if (matchOrigin('https://*.example.test')) { headers['Access-Control-Allow-Origin'] = getOrigin(); }",
			&Value::Null,
			"https://api.example.test",
			&headers,
		)
		.unwrap();
		assert_eq!(result.get("Access-Control-Allow-Origin"), Some(&"https://api.example.test".to_string()));
	}

	#[test]
	fn cors_script_allow_origins_rejects_mismatch() {
		let headers = HashMap::new();
		let result = eval_cors_script(
			"if (allowOrigins('https://a.test', 'https://b.test')) { headers.x = '1'; }",
			&Value::Null,
			"https://c.test",
			&headers,
		)
		.unwrap();
		assert!(result.is_empty());
	}

	#[test]
	fn script_timeout_is_enforced() {
		let result = eval_value("while (true) {}", &Value::Null, Duration::from_millis(50));
		assert!(result.is_err());
	}
}
