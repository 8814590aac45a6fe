//! The `/live` WebSocket endpoint.
//!
//! Each accepted socket gets its own upstream link and orchestrator; the
//! socket halves are adapted to the session layer's channel traits so the
//! orchestrator never sees axum types.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use tracing::info;

use livebridge_core::ClientEvent;
use livebridge_link::UpstreamLink;
use livebridge_session::{ChannelError, ClientReceiver, ClientSender, SessionOrchestrator};

use crate::AppState;
use crate::metrics::{
    SESSION_DURATION_SECONDS, SESSIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Upgrade handler for `GET /live`.
pub async fn live_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| relay_socket(state, socket))
}

async fn relay_socket(state: AppState, socket: WebSocket) {
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(SESSIONS_ACTIVE).increment(1.0);
    let started = Instant::now();
    info!("client connected");

    let link = Arc::new(UpstreamLink::new(
        state.settings.upstream.clone(),
        Arc::clone(&state.tokens),
    ));
    let (sink, stream) = socket.split();
    SessionOrchestrator::new(link)
        .run(SocketReceiver(stream), SocketSender(sink))
        .await;

    histogram!(SESSION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    gauge!(SESSIONS_ACTIVE).decrement(1.0);
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(duration_s = started.elapsed().as_secs(), "client disconnected");
}

struct SocketReceiver(SplitStream<WebSocket>);

#[async_trait]
impl ClientReceiver for SocketReceiver {
    async fn next_message(&mut self) -> Result<Option<String>, ChannelError> {
        loop {
            match self.0.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(ChannelError::Transport(e.to_string())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.to_string())),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                // Ping/pong are handled by axum.
                Some(Ok(_)) => {}
            }
        }
    }
}

struct SocketSender(SplitSink<WebSocket, Message>);

#[async_trait]
impl ClientSender for SocketSender {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ChannelError> {
        let payload = event.to_json().to_string();
        self.0
            .send(Message::Text(payload.into()))
            .await
            .map_err(|_| ChannelError::Closed)
    }
}
