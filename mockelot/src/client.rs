//! Outbound HTTP client: a thin `reqwest` wrapper shared by the proxy
//! handler's backend calls and its health-check poller, mirroring the
//! teacher's pattern of building one pooled client per process rather than
//! a fresh connector per request.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;

#[derive(Clone)]
pub struct OutboundClient {
	inner: reqwest::Client,
}

impl OutboundClient {
	pub fn new() -> Result<OutboundClient> {
		let inner = reqwest::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.context("building outbound http client")?;
		Ok(OutboundClient { inner })
	}

	pub async fn send(
		&self,
		method: http::Method,
		url: &str,
		headers: http::HeaderMap,
		body: Bytes,
		timeout: Duration,
	) -> Result<(http::StatusCode, http::HeaderMap, Bytes)> {
		let mut req = self.inner.request(method, url).timeout(timeout).headers(headers);
		if !body.is_empty() {
			req = req.body(body);
		}
		let resp = req.send().await.context("sending proxied request")?;
		let status = resp.status();
		let headers = resp.headers().clone();
		let bytes = resp.bytes().await.context("reading backend response body")?;
		Ok((status, headers, bytes))
	}

	/// §4.9.6: 2xx through 4xx count as healthy ("the backend is up and
	/// talking HTTP, even if it's rejecting this particular probe"); 5xx,
	/// transport errors, and timeouts are unhealthy.
	pub async fn health_check(&self, url: &str, timeout: Duration) -> bool {
		match self.inner.get(url).timeout(timeout).send().await {
			Ok(resp) => resp.status().as_u16() < 500,
			Err(_) => false,
		}
	}
}

impl Default for OutboundClient {
	fn default() -> OutboundClient {
		OutboundClient::new().expect("default reqwest client configuration is always valid")
	}
}
