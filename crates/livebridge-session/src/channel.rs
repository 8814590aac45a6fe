//! The client-side transport boundary.
//!
//! The orchestrator never touches a socket type directly; it drives a pair of
//! traits so the server layer can plug in its WebSocket and tests can plug in
//! channels.

use async_trait::async_trait;
use thiserror::Error;

use livebridge_core::ClientEvent;

/// Failure on the client transport.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The client connection is gone.
    #[error("client channel closed")]
    Closed,
    /// Any other transport-level failure.
    #[error("client transport error: {0}")]
    Transport(String),
}

/// Inbound half of the client connection.
#[async_trait]
pub trait ClientReceiver: Send {
    /// The next text message from the client, `Ok(None)` on orderly close.
    async fn next_message(&mut self) -> Result<Option<String>, ChannelError>;
}

/// Outbound half of the client connection.
#[async_trait]
pub trait ClientSender: Send {
    /// Deliver one event to the client.
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ChannelError>;
}

#[async_trait]
impl<T: ClientReceiver + ?Sized> ClientReceiver for &mut T {
    async fn next_message(&mut self) -> Result<Option<String>, ChannelError> {
        (**self).next_message().await
    }
}

#[async_trait]
impl<T: ClientSender + ?Sized> ClientSender for &mut T {
    async fn send(&mut self, event: &ClientEvent) -> Result<(), ChannelError> {
        (**self).send(event).await
    }
}
