//! Session lifecycle and the relay loop.
//!
//! A session moves through three phases: awaiting the client's setup message,
//! relaying traffic in both directions, and closed. During relay one loop
//! multiplexes the two directions with `select!`, bounds the upstream read
//! with an idle timeout so the renewal clock is checked regularly, and
//! replaces the upstream session in place when its enforced lifetime nears.

use std::sync::Arc;

use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use livebridge_core::constants::UPSTREAM_IDLE_RETRY;
use livebridge_core::{ChunkEvent, ClientEvent, ClientMessage, Modality};
use livebridge_link::{LinkError, UpstreamLink, UpstreamPayload};

use crate::aggregator::ResponseAggregator;
use crate::channel::{ClientReceiver, ClientSender};

/// Why one relay cycle ended.
enum PumpExit {
    /// The upstream session ended; a fresh one should be started.
    UpstreamClosed,
    /// The client went away; the session is over.
    ClientGone,
    /// Unrecoverable failure; the session is over.
    Fault,
}

/// Drives one client session end to end.
pub struct SessionOrchestrator {
    link: Arc<UpstreamLink>,
    aggregator: ResponseAggregator,
}

impl SessionOrchestrator {
    /// An orchestrator over a not-yet-connected link.
    pub fn new(link: Arc<UpstreamLink>) -> Self {
        Self { link, aggregator: ResponseAggregator::new() }
    }

    /// Run the session to completion. The upstream link is always closed on
    /// the way out, whatever ended the session.
    pub async fn run<R, S>(mut self, mut receiver: R, mut sender: S)
    where
        R: ClientReceiver,
        S: ClientSender,
    {
        let Some((instruction, modality)) = await_setup(&mut receiver).await else {
            info!("client left before completing setup");
            return;
        };
        info!(modality = modality.as_str(), "session setup received");

        self.link.configure(&instruction, modality).await;
        if let Err(e) = self.link.connect().await {
            error!(error = %e, "could not establish upstream session");
            let _ = sender.send(&connect_failed_event()).await;
            return;
        }

        loop {
            match self.relay(&mut receiver, &mut sender).await {
                PumpExit::UpstreamClosed => {
                    info!("upstream session ended; starting a new one");
                    self.aggregator.reset();
                    if let Err(e) = self.link.connect().await {
                        error!(error = %e, "could not re-establish upstream session");
                        let _ = sender.send(&connect_failed_event()).await;
                        break;
                    }
                }
                PumpExit::ClientGone => break,
                PumpExit::Fault => break,
            }
        }

        self.link.close().await;
        info!("session closed");
    }

    /// One relay cycle over a connected upstream session. Returns when
    /// either side ends or a fault occurs; renewals happen transparently
    /// inside the cycle.
    async fn relay<R, S>(&mut self, receiver: &mut R, sender: &mut S) -> PumpExit
    where
        R: ClientReceiver,
        S: ClientSender,
    {
        let link = Arc::clone(&self.link);
        loop {
            tokio::select! {
                inbound = receiver.next_message() => match inbound {
                    Ok(Some(raw)) => {
                        if let Some(exit) = self.handle_client_message(&raw).await {
                            return exit;
                        }
                    }
                    Ok(None) => {
                        info!("client disconnected");
                        return PumpExit::ClientGone;
                    }
                    Err(e) => {
                        warn!(error = %e, "client receive failed");
                        return PumpExit::ClientGone;
                    }
                },
                // Bounded so the loop wakes regularly for the renewal check
                // even when the upstream is quiet.
                upstream = timeout(UPSTREAM_IDLE_RETRY, link.receive()) => match upstream {
                    Err(_elapsed) => {}
                    Ok(Ok(raw)) => {
                        if let Some(exit) = self.handle_chunk(&raw, sender).await {
                            return exit;
                        }
                    }
                    Ok(Err(LinkError::Closed)) => {
                        info!("upstream closed the session");
                        return PumpExit::UpstreamClosed;
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "upstream receive failed");
                        return PumpExit::UpstreamClosed;
                    }
                },
            }

            if link.should_renew() {
                self.aggregator.reset();
                if let Err(e) = self.link.renew().await {
                    error!(error = %e, "upstream session renewal failed");
                    let _ = sender.send(&connect_failed_event()).await;
                    return PumpExit::Fault;
                }
            }
        }
    }

    /// Forward one client message upstream. A mid-stream setup stages the
    /// new configuration for the next connection; the live one is
    /// unaffected.
    async fn handle_client_message(&mut self, raw: &str) -> Option<PumpExit> {
        let message = match ClientMessage::parse(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "ignoring unrecognized client message");
                return None;
            }
        };

        let payload = match message {
            ClientMessage::Setup { system_instruction, response_modality } => {
                debug!(modality = response_modality.as_str(), "mid-stream setup staged");
                self.link.stage_config(&system_instruction, response_modality);
                return None;
            }
            ClientMessage::Text(text) => UpstreamPayload::Text(text),
            ClientMessage::Realtime(envelope) => UpstreamPayload::Realtime(envelope),
            ClientMessage::EndOfTurn => UpstreamPayload::EndOfTurn,
        };

        if let Err(e) = self.link.send(payload).await {
            warn!(error = %e, "upstream send failed");
            return Some(PumpExit::UpstreamClosed);
        }
        None
    }

    /// Fold one upstream frame into the aggregator and deliver whatever
    /// completed. Unparseable frames are logged and skipped.
    async fn handle_chunk<S: ClientSender>(
        &mut self,
        raw: &str,
        sender: &mut S,
    ) -> Option<PumpExit> {
        let chunk = match ChunkEvent::parse(raw) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "skipping unparseable upstream frame");
                return None;
            }
        };
        for event in self.aggregator.feed(chunk) {
            if let Err(e) = sender.send(&event).await {
                warn!(error = %e, "client send failed");
                return Some(PumpExit::ClientGone);
            }
        }
        None
    }
}

/// Wait for the client's setup message, discarding anything sent before it.
async fn await_setup<R: ClientReceiver>(receiver: &mut R) -> Option<(String, Modality)> {
    loop {
        let raw = match receiver.next_message().await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "client receive failed while awaiting setup");
                return None;
            }
        };
        match ClientMessage::parse(&raw) {
            Ok(ClientMessage::Setup { system_instruction, response_modality }) => {
                return Some((system_instruction, response_modality));
            }
            Ok(_) => warn!("discarding client message sent before setup"),
            Err(e) => warn!(error = %e, "ignoring unrecognized client message before setup"),
        }
    }
}

/// The definitive signal that the upstream session could not be established.
fn connect_failed_event() -> ClientEvent {
    ClientEvent::UpstreamError(json!({
        "error": {"message": "failed to connect to upstream service"}
    }))
}
