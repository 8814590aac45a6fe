//! # livebridge-core
//!
//! Shared vocabulary for the livebridge relay. No I/O lives here.
//!
//! - **Client protocol**: [`client::ClientMessage`] (inbound) and
//!   [`client::ClientEvent`] (outbound) with their JSON shapes
//! - **Upstream wire**: [`wire::ChunkEvent`] parsed from Gemini Live server
//!   frames, plus the outbound setup/turn frame builders
//! - **Configuration**: [`config::SessionConfig`], [`config::Modality`],
//!   [`config::UpstreamSettings`]
//! - **Errors**: [`errors::ProtocolError`]
//! - **Constants**: session renewal timing and retry policy
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other livebridge crates.

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod constants;
pub mod errors;
pub mod wire;

pub use client::{ClientEvent, ClientMessage};
pub use config::{Modality, SessionConfig, UpstreamSettings};
pub use errors::ProtocolError;
pub use wire::{ChunkEvent, ChunkPart};
