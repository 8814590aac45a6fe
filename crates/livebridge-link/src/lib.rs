//! # livebridge-link
//!
//! Ownership of one logical connection to the Gemini Live
//! (`BidiGenerateContent`) streaming endpoint:
//!
//! - **[`auth::TokenProvider`]**: bearer token acquisition behind a trait,
//!   with static and GCE-metadata-server implementations
//! - **[`UpstreamLink`]**: connect with bounded exponential backoff, the
//!   setup handshake, serialized sends, receives, the renewal clock, and
//!   idempotent teardown
//!
//! The link never surfaces transient connectivity loss to its callers as a
//! hard failure: sends while disconnected are dropped with a warning, and
//! renewal replaces the socket in place without the client noticing.

#![deny(unsafe_code)]

pub mod auth;
pub mod error;
pub mod link;

pub use auth::{MetadataTokenProvider, StaticTokenProvider, TokenProvider};
pub use error::{AuthError, LinkError};
pub use link::{UpstreamLink, UpstreamPayload};
