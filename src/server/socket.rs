//! WebSocket framing for [`Connection`]
//!
//! Outbound payloads go out as text frames (binary if not UTF-8); inbound
//! text and binary frames become payloads. Control frames are handled by the
//! WebSocket layer and never reach the ingress queue.

use std::future;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::{SinkExt, StreamExt, TryStreamExt};

use crate::connection::{Connection, ConnectionConfig};

/// Wrap an upgraded WebSocket in a [`Connection`]
pub fn open(client_id: u64, socket: WebSocket, config: &ConnectionConfig) -> Arc<Connection> {
    let (sink, stream) = socket.split();

    let writer = sink.with(|payload: Bytes| future::ready(Ok::<_, axum::Error>(outbound(payload))));
    let reader = stream.try_filter_map(|message| future::ready(Ok(inbound(message))));

    Connection::from_parts(client_id, writer, reader, config)
}

fn outbound(payload: Bytes) -> Message {
    match std::str::from_utf8(&payload) {
        Ok(text) => Message::Text(text.to_owned().into()),
        Err(_) => Message::Binary(payload),
    }
}

fn inbound(message: Message) -> Option<Bytes> {
    match message {
        Message::Text(text) => Some(Bytes::copy_from_slice(text.as_str().as_bytes())),
        Message::Binary(data) => Some(data),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}
