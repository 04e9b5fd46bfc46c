//! Dual HTTP/HTTPS/h2c listener. Plaintext connections are served
//! with protocol auto-detection (HTTP/1.1 or h2c) via `hyper-util`'s auto
//! builder; TLS connections additionally negotiate ALPN (`h2`/`http/1.1`)
//! and resolve a per-SNI certificate from the [`crate::certs::CertCache`],
//! minting one on first contact.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;

use mockelot_core::drain::DrainWatcher;

use crate::certs::CertCache;
use crate::dispatcher::Dispatcher;
use crate::http::{empty_response, full, Response};
use crate::proxy::websocket;

pub async fn serve_http(addr: SocketAddr, dispatcher: Arc<Dispatcher>, drain: DrainWatcher) -> anyhow::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	tracing::info!(%addr, "http listener established");
	let mut stream = TcpListenerStream::new(listener).take_until(Box::pin(drain.clone().wait_for_drain()));

	while let Some(Ok(socket)) = stream.next().await {
		let _ = socket.set_nodelay(true);
		let remote_addr = socket.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
		let dispatcher = dispatcher.clone();
		let drain = drain.clone();
		tokio::spawn(async move {
			let io = TokioIo::new(socket);
			let builder = auto::Builder::new(TokioExecutor::new());
			let remote_addr = remote_addr.clone();
			let serve = builder.serve_connection(
				io,
				hyper::service::service_fn(move |req| handle(dispatcher.clone(), req, "http", remote_addr.clone())),
			);
			match futures_util::future::select(Box::pin(drain.wait_for_drain()), serve).await {
				futures_util::future::Either::Left((_, _serve)) => {},
				futures_util::future::Either::Right((result, _)) => {
					if let Err(e) = result {
						tracing::debug!(error = %e, "http connection ended with error");
					}
				},
			}
		});
	}
	Ok(())
}

pub async fn serve_https(addr: SocketAddr, dispatcher: Arc<Dispatcher>, certs: Arc<CertCache>, drain: DrainWatcher) -> anyhow::Result<()> {
	let listener = TcpListener::bind(addr).await?;
	tracing::info!(%addr, "https listener established");

	let mut server_config = ServerConfig::builder()
		.with_no_client_auth()
		.with_cert_resolver(Arc::new(SniCertResolver { certs }));
	server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
	let tls_acceptor = tokio_rustls::TlsAcceptor::from(Arc::new(server_config));

	let mut stream = TcpListenerStream::new(listener).take_until(Box::pin(drain.clone().wait_for_drain()));

	while let Some(Ok(socket)) = stream.next().await {
		let _ = socket.set_nodelay(true);
		let remote_addr = socket.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
		let dispatcher = dispatcher.clone();
		let drain = drain.clone();
		let tls_acceptor = tls_acceptor.clone();
		tokio::spawn(async move {
			let tls_stream = match tls_acceptor.accept(socket).await {
				Ok(s) => s,
				Err(e) => {
					tracing::debug!(error = %e, "tls handshake failed");
					return;
				},
			};
			let io = TokioIo::new(tls_stream);
			let builder = auto::Builder::new(TokioExecutor::new());
			let remote_addr = remote_addr.clone();
			let serve = builder.serve_connection(
				io,
				hyper::service::service_fn(move |req| handle(dispatcher.clone(), req, "https", remote_addr.clone())),
			);
			match futures_util::future::select(Box::pin(drain.wait_for_drain()), serve).await {
				futures_util::future::Either::Left((_, _serve)) => {},
				futures_util::future::Either::Right((result, _)) => {
					if let Err(e) = result {
						tracing::debug!(error = %e, "https connection ended with error");
					}
				},
			}
		});
	}
	Ok(())
}

async fn handle(
	dispatcher: Arc<Dispatcher>,
	req: hyper::Request<hyper::body::Incoming>,
	scheme: &'static str,
	remote_addr: String,
) -> Result<Response, Infallible> {
	// An upgrade request is routed to the backend's websocket endpoint
	// ahead of the normal proxy flow, before the (empty, for a GET upgrade)
	// request body is buffered.
	if hyper_tungstenite::is_upgrade_request(&req) {
		let backend_url = dispatcher.resolve_ws_backend(req.uri());
		return Ok(match backend_url {
			Some(backend_url) => upgrade(req, backend_url),
			None => empty_response(http::StatusCode::NOT_FOUND),
		});
	}

	let (parts, body) = req.into_parts();
	let body = match http_body_util::BodyExt::collect(body).await {
		Ok(collected) => collected.to_bytes(),
		Err(_) => {
			return Ok(empty_response(http::StatusCode::BAD_REQUEST));
		},
	};
	Ok(dispatcher
		.dispatch(parts.method, parts.uri, parts.headers, body, scheme, &remote_addr)
		.await)
}

fn upgrade(req: hyper::Request<hyper::body::Incoming>, backend_url: String) -> Response {
	match hyper_tungstenite::upgrade(req, None) {
		Ok((response, websocket)) => {
			tokio::spawn(async move {
				if let Err(e) = websocket::bridge(websocket, backend_url).await {
					tracing::debug!(error = %e, "websocket bridge ended with error");
				}
			});
			let (parts, _empty_body) = response.into_parts();
			http::Response::from_parts(parts, full(Bytes::new()))
		},
		Err(e) => {
			tracing::debug!(error = %e, "websocket upgrade failed");
			empty_response(http::StatusCode::BAD_REQUEST)
		},
	}
}

struct SniCertResolver {
	certs: Arc<CertCache>,
}

impl ResolvesServerCert for SniCertResolver {
	fn resolve(&self, client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
		let sni = client_hello.server_name().unwrap_or("localhost").to_string();
		let entry = self.certs.get_or_create(&sni).ok()?;

		let mut cert_reader = std::io::BufReader::new(entry.cert_pem.as_bytes());
		let chain: Vec<_> = rustls_pemfile::certs(&mut cert_reader).filter_map(Result::ok).collect();

		let mut key_reader = std::io::BufReader::new(entry.key_pem.as_bytes());
		let key = rustls_pemfile::private_key(&mut key_reader).ok()??;

		let signing_key = rustls::crypto::ring::sign::any_supported_type(&key).ok()?;
		Some(Arc::new(CertifiedKey::new(chain, signing_key)))
	}
}
