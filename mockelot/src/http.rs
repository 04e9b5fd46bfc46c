//! Thin type aliases over `http`/`http_body_util`. Every response body in
//! this system is fully buffered — bodies that may need script/template
//! transformation can't be streamed — so `Body` is simply `Full<Bytes>`
//! rather than a boxed trait object.

use bytes::Bytes;
use http_body_util::Full;

pub type Body = Full<Bytes>;
pub type Response = http::Response<Body>;

pub fn empty() -> Body {
	Full::new(Bytes::new())
}

pub fn full(b: impl Into<Bytes>) -> Body {
	Full::new(b.into())
}

pub fn empty_response(code: http::StatusCode) -> Response {
	http::Response::builder().status(code).body(empty()).unwrap()
}

pub fn plaintext_response(code: http::StatusCode, body: impl Into<String>) -> Response {
	http::Response::builder()
		.status(code)
		.header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
		.body(full(body.into()))
		.unwrap()
}

pub fn json_response(code: http::StatusCode, body: &impl serde::Serialize) -> Response {
	let bytes = serde_json::to_vec(body).unwrap_or_default();
	http::Response::builder()
		.status(code)
		.header(http::header::CONTENT_TYPE, "application/json")
		.body(full(bytes))
		.unwrap()
}
