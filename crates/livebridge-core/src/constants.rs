//! Timing and retry policy constants.
//!
//! These are relay policy, not protocol constants: the upstream service
//! enforces its own session lifetime, and the values here only have to be
//! conservative with respect to it.

use std::time::Duration;

/// Enforced lifetime of one upstream session.
///
/// The Live API drops bidirectional connections after roughly a minute;
/// renewal must complete before this elapses.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(60);

/// How long before [`SESSION_TIMEOUT`] renewal starts.
pub const RENEWAL_GRACE: Duration = Duration::from_secs(2);

/// Sleep between upstream-receive attempts while no connection is open.
pub const UPSTREAM_IDLE_RETRY: Duration = Duration::from_secs(5);

/// Maximum connect attempts before `connect()` gives up.
///
/// Backoff is `2^attempt` seconds, so six attempts spread over ~63s total.
pub const MAX_CONNECT_ATTEMPTS: u32 = 6;

/// Prebuilt voice used for `AUDIO` sessions unless configured otherwise.
pub const DEFAULT_VOICE: &str = "puck";
