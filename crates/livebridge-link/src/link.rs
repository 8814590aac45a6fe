//! The upstream connection and its lifecycle.
//!
//! One [`UpstreamLink`] exists per client session. The connection is held as
//! split sink/stream halves behind separate async mutexes: the writer mutex
//! serializes sends *and* serves as the single consistent "connected or not"
//! read, so renewal's detach-then-replace is atomic from a sender's point of
//! view. The reader half is only ever touched by the session's upstream
//! pump, so its mutex is uncontended in practice.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, CONTENT_TYPE};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use livebridge_core::config::{Modality, SessionConfig, UpstreamSettings};
use livebridge_core::constants::{MAX_CONNECT_ATTEMPTS, RENEWAL_GRACE, SESSION_TIMEOUT};
use livebridge_core::wire;

use crate::auth::TokenProvider;
use crate::error::{AuthError, LinkError};

type WsConnection = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsConnection, Message>;
type WsSource = SplitStream<WsConnection>;

/// One payload to forward upstream.
#[derive(Clone, Debug)]
pub enum UpstreamPayload {
    /// A complete user text turn.
    Text(String),
    /// A realtime-input envelope, forwarded verbatim.
    Realtime(Value),
    /// Bare end-of-turn signal.
    EndOfTurn,
}

/// A single logical connection to the upstream streaming service.
pub struct UpstreamLink {
    settings: UpstreamSettings,
    tokens: Arc<dyn TokenProvider>,
    config: RwLock<SessionConfig>,
    writer: AsyncMutex<Option<WsSink>>,
    reader: AsyncMutex<Option<WsSource>>,
    session_started: Mutex<Option<Instant>>,
}

impl UpstreamLink {
    /// A link with an empty default configuration. Call [`configure`] with
    /// the client's setup before [`connect`].
    ///
    /// [`configure`]: Self::configure
    /// [`connect`]: Self::connect
    pub fn new(settings: UpstreamSettings, tokens: Arc<dyn TokenProvider>) -> Self {
        let config = settings.session_config("", Modality::Text);
        Self {
            settings,
            tokens,
            config: RwLock::new(config),
            writer: AsyncMutex::new(None),
            reader: AsyncMutex::new(None),
            session_started: Mutex::new(None),
        }
    }

    /// Replace the session configuration.
    ///
    /// Configuration binds to a connection at connect time, so any open
    /// connection is proactively closed; the caller reconnects afterwards.
    pub async fn configure(&self, system_instruction: &str, modality: Modality) {
        *self.config.write() = self.settings.session_config(system_instruction, modality);
        self.close().await;
    }

    /// Update the instruction and modality in place, without closing.
    ///
    /// Used for mid-stream setup messages: the live connection keeps its
    /// current session, and the next renewal or reconnect picks the staged
    /// configuration up.
    pub fn stage_config(&self, system_instruction: &str, modality: Modality) {
        let mut config = self.config.write();
        config.system_instruction = system_instruction.to_string();
        config.modality = modality;
    }

    /// Snapshot of the current configuration.
    pub fn current_config(&self) -> SessionConfig {
        self.config.read().clone()
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.session_started.lock().is_some()
    }

    /// Establish a connection under the current configuration.
    ///
    /// Connection-level failures are retried with `2^attempt`-second backoff
    /// up to [`MAX_CONNECT_ATTEMPTS`]; any other failure (bad credentials,
    /// rejected handshake) returns immediately.
    pub async fn connect(&self) -> Result<(), LinkError> {
        let mut attempt: u32 = 0;
        loop {
            match self.try_connect().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "upstream connect succeeded after retries");
                    }
                    return Ok(());
                }
                Err(e) if is_retryable(&e) => {
                    attempt += 1;
                    if attempt >= MAX_CONNECT_ATTEMPTS {
                        return Err(LinkError::RetriesExhausted { attempts: attempt });
                    }
                    let delay = Duration::from_secs(1u64 << (attempt - 1));
                    warn!(
                        attempt,
                        delay_s = delay.as_secs(),
                        error = %e,
                        "upstream connect failed; backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_connect(&self) -> Result<(), LinkError> {
        let token = self.tokens.bearer_token().await?;
        let url = self.settings.endpoint();

        let mut request = url.as_str().into_client_request()?;
        let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AuthError::Malformed("token contains invalid header characters".into()))?;
        let _ = request.headers_mut().insert(AUTHORIZATION, auth_value);
        let _ = request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let (connection, _response) = connect_async(request).await?;
        let (mut sink, mut stream) = connection.split();

        let setup = wire::setup_frame(&self.current_config());
        sink.send(Message::text(setup.to_string())).await?;

        // Exactly one message is expected as the setup acknowledgment.
        // Anything unparseable is logged and tolerated; only a dropped
        // connection aborts.
        match stream.next().await {
            Some(Ok(message)) => match message.to_text() {
                Ok(text) => match serde_json::from_str::<Value>(text) {
                    Ok(ack) => debug!(ack = %ack, "setup acknowledged"),
                    Err(e) => debug!(error = %e, "unparseable setup acknowledgment; continuing"),
                },
                Err(_) => debug!("non-text setup acknowledgment; continuing"),
            },
            Some(Err(e)) => return Err(e.into()),
            None => return Err(LinkError::Closed),
        }

        *self.writer.lock().await = Some(sink);
        *self.reader.lock().await = Some(stream);
        *self.session_started.lock() = Some(Instant::now());
        info!(model = %self.current_config().model, "connected to upstream");
        Ok(())
    }

    /// Forward one payload upstream.
    ///
    /// Sends are serialized by the writer lock. With no open connection the
    /// payload is dropped with a warning; that is not an error to callers.
    pub async fn send(&self, payload: UpstreamPayload) -> Result<(), LinkError> {
        let frame = match &payload {
            UpstreamPayload::Text(text) => wire::text_turn_frame(text),
            UpstreamPayload::Realtime(envelope) => envelope.clone(),
            UpstreamPayload::EndOfTurn => wire::end_of_turn_frame(),
        };
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            warn!("dropping outbound payload; upstream link is not connected");
            return Ok(());
        };
        sink.send(Message::text(frame.to_string())).await?;
        Ok(())
    }

    /// Block until the next upstream message arrives.
    ///
    /// The Live API delivers JSON in both text and binary frames; both are
    /// surfaced as strings. Fails with [`LinkError::NotConnected`] when no
    /// connection is open (callers check liveness first) and
    /// [`LinkError::Closed`] when the peer hangs up.
    pub async fn receive(&self) -> Result<String, LinkError> {
        let mut reader = self.reader.lock().await;
        let Some(stream) = reader.as_mut() else {
            return Err(LinkError::NotConnected);
        };
        loop {
            match stream.next().await {
                None => return Err(LinkError::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => {
                    return Ok(String::from_utf8_lossy(&bytes).into_owned());
                }
                Some(Ok(Message::Close(_))) => return Err(LinkError::Closed),
                // Ping/pong are answered by the transport layer.
                Some(Ok(_)) => {}
            }
        }
    }

    /// Whether the session is close enough to its enforced lifetime that a
    /// renewal should start. Always false while disconnected.
    pub fn should_renew(&self) -> bool {
        self.session_started
            .lock()
            .is_some_and(|started| started.elapsed() >= SESSION_TIMEOUT - RENEWAL_GRACE)
    }

    /// Replace the connection under the same configuration.
    ///
    /// The old handles are detached first — concurrent senders observe "not
    /// connected" for the duration — then a replacement is established, and
    /// only then is the old connection closed. Failure to close the old
    /// handle is logged, not propagated.
    pub async fn renew(&self) -> Result<(), LinkError> {
        info!("renewing upstream session");
        let old_writer = self.writer.lock().await.take();
        let old_reader = self.reader.lock().await.take();
        *self.session_started.lock() = None;

        self.connect().await?;

        if let Some(mut sink) = old_writer {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "error closing previous upstream connection");
            }
        }
        drop(old_reader);
        info!("upstream session renewal complete");
        Ok(())
    }

    /// Close and clear the connection. Idempotent.
    pub async fn close(&self) {
        *self.session_started.lock() = None;
        let writer = self.writer.lock().await.take();
        let _ = self.reader.lock().await.take();
        if let Some(mut sink) = writer {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "error closing upstream connection");
            }
            info!("upstream link closed");
        }
    }
}

/// Connection-level failures worth retrying with backoff. Everything else
/// (rejected handshakes, TLS problems, bad URLs) is fed back to the caller.
fn is_retryable(error: &LinkError) -> bool {
    match error {
        LinkError::Closed => true,
        LinkError::Ws(e) => matches!(
            e,
            WsError::Io(_) | WsError::ConnectionClosed | WsError::AlreadyClosed | WsError::Protocol(_)
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenProvider;

    fn test_link() -> UpstreamLink {
        let settings = UpstreamSettings {
            project_id: "proj".into(),
            location: "us-central1".into(),
            model_id: "gemini-live".into(),
            endpoint_override: Some("ws://127.0.0.1:1/unreachable".into()),
        };
        UpstreamLink::new(settings, Arc::new(StaticTokenProvider::new("tok")))
    }

    #[tokio::test]
    async fn send_without_connection_is_a_noop() {
        let link = test_link();
        link.send(UpstreamPayload::Text("hi".into())).await.unwrap();
        link.send(UpstreamPayload::EndOfTurn).await.unwrap();
    }

    #[tokio::test]
    async fn receive_without_connection_fails() {
        let link = test_link();
        let err = link.receive().await.unwrap_err();
        assert!(matches!(err, LinkError::NotConnected));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let link = test_link();
        link.close().await;
        link.close().await;
        assert!(!link.is_connected());
    }

    #[tokio::test]
    async fn should_renew_false_while_disconnected() {
        let link = test_link();
        assert!(!link.should_renew());
    }

    #[tokio::test(start_paused = true)]
    async fn should_renew_crosses_threshold_at_grace_boundary() {
        let link = test_link();
        *link.session_started.lock() = Some(Instant::now());

        assert!(!link.should_renew());
        tokio::time::advance(SESSION_TIMEOUT - RENEWAL_GRACE - Duration::from_millis(1)).await;
        assert!(!link.should_renew());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(link.should_renew());
    }

    #[tokio::test(start_paused = true)]
    async fn should_renew_false_again_after_close() {
        let link = test_link();
        *link.session_started.lock() = Some(Instant::now());
        tokio::time::advance(SESSION_TIMEOUT).await;
        assert!(link.should_renew());
        link.close().await;
        assert!(!link.should_renew());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_gives_up_after_bounded_attempts() {
        // Nothing listens on port 1; every attempt is refused and the
        // paused clock folds the backoff sleeps away.
        let link = test_link();
        let err = link.connect().await.unwrap_err();
        assert!(matches!(
            err,
            LinkError::RetriesExhausted { attempts } if attempts == MAX_CONNECT_ATTEMPTS
        ));
        assert!(!link.is_connected());
    }

    #[test]
    fn staged_config_updates_instruction_and_modality_in_place() {
        let link = test_link();
        assert_eq!(link.current_config().modality, Modality::Text);
        link.stage_config("speak up", Modality::Audio);
        assert_eq!(link.current_config().modality, Modality::Audio);
        assert_eq!(link.current_config().system_instruction, "speak up");
    }

    #[test]
    fn retryable_classification() {
        assert!(is_retryable(&LinkError::Closed));
        assert!(is_retryable(&LinkError::Ws(WsError::ConnectionClosed)));
        assert!(!is_retryable(&LinkError::NotConnected));
        assert!(!is_retryable(&LinkError::Auth(AuthError::Malformed("x".into()))));
    }
}
