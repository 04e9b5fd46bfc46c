//! End-to-end dispatcher tests: builds a real `Dispatcher` (no subprocess,
//! no mocked internals) against `wiremock` backends and walks the concrete
//! scenarios from the specification's worked examples — a static mock
//! response, a proxied request with path translation, and the process
//! liveness endpoint.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mockelot::client::OutboundClient;
use mockelot::dispatcher::Dispatcher;
use mockelot::logger::RequestLogger;
use mockelot::model::{
	AppConfig, Endpoint, EndpointType, MethodResponse, ProxyConfig, ResponseItem, ResponseMode, TranslationMode, TriState,
};

fn dispatcher_for(config: AppConfig) -> Dispatcher {
	Dispatcher {
		config: Arc::new(config),
		client: OutboundClient::new().expect("building outbound client"),
		public_base_fallback: "http://localhost:8080".to_string(),
		https_port: None,
		logger: Arc::new(RequestLogger::new(100)),
		container_ports: HashMap::new(),
	}
}

fn mock_rule(path_pattern: &str, body: &str) -> MethodResponse {
	MethodResponse {
		id: "r1".into(),
		enabled: true,
		path_pattern: path_pattern.into(),
		methods: ["GET".to_string()].into_iter().collect(),
		status_code: 200,
		status_text: None,
		headers: Default::default(),
		body: body.into(),
		response_delay_ms: 0,
		response_mode: ResponseMode::Static,
		script_body: None,
		request_validation: None,
		use_global_cors: TriState::Inherit,
	}
}

#[tokio::test]
async fn healthz_answers_regardless_of_endpoints() {
	let dispatcher = dispatcher_for(AppConfig::default());
	let resp = dispatcher
		.dispatch(Method::GET, "/healthz".parse().unwrap(), HeaderMap::new(), Bytes::new(), "http", "127.0.0.1:1")
		.await;
	assert_eq!(resp.status(), http::StatusCode::OK);
}

#[tokio::test]
async fn mock_endpoint_returns_configured_static_body() {
	let endpoint = Endpoint {
		id: "ep1".into(),
		name: "greeter".into(),
		path_prefix: "/hello".into(),
		translation_mode: TranslationMode::None,
		translate_pattern: None,
		translate_replace: None,
		kind: EndpointType::Mock,
		enabled: true,
		responses: vec![ResponseItem::Response {
			response: mock_rule("/hello", "hi there"),
		}],
		proxy: None,
		container: None,
	};
	let config = AppConfig {
		endpoints: vec![endpoint],
		..Default::default()
	};
	let dispatcher = dispatcher_for(config);

	let resp = dispatcher
		.dispatch(Method::GET, "/hello".parse().unwrap(), HeaderMap::new(), Bytes::new(), "http", "127.0.0.1:1")
		.await;
	assert_eq!(resp.status(), http::StatusCode::OK);
	let body = http_body_util::BodyExt::collect(resp.into_body()).await.unwrap().to_bytes();
	assert_eq!(&body[..], b"hi there");
}

#[tokio::test]
async fn unmatched_path_falls_through_to_404() {
	let dispatcher = dispatcher_for(AppConfig::default());
	let resp = dispatcher
		.dispatch(Method::GET, "/nope".parse().unwrap(), HeaderMap::new(), Bytes::new(), "http", "127.0.0.1:1")
		.await;
	assert_eq!(resp.status(), http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_endpoint_forwards_to_backend_with_translated_path() {
	let backend = MockServer::start().await;
	Mock::given(method("GET"))
		.and(path("/items/42"))
		.respond_with(ResponseTemplate::new(200).set_body_string("item-42"))
		.mount(&backend)
		.await;

	let endpoint = Endpoint {
		id: "ep1".into(),
		name: "items".into(),
		path_prefix: "/api".into(),
		translation_mode: TranslationMode::Strip,
		translate_pattern: None,
		translate_replace: None,
		kind: EndpointType::Proxy,
		enabled: true,
		responses: vec![],
		proxy: Some(ProxyConfig {
			backend_url: backend.uri(),
			timeout_s: 30,
			..Default::default()
		}),
		container: None,
	};
	let config = AppConfig {
		endpoints: vec![endpoint],
		..Default::default()
	};
	let dispatcher = dispatcher_for(config);

	let resp = dispatcher
		.dispatch(
			Method::GET,
			"/api/items/42".parse().unwrap(),
			HeaderMap::new(),
			Bytes::new(),
			"http",
			"127.0.0.1:1",
		)
		.await;
	assert_eq!(resp.status(), http::StatusCode::OK);
	let body = http_body_util::BodyExt::collect(resp.into_body()).await.unwrap().to_bytes();
	assert_eq!(&body[..], b"item-42");
}
