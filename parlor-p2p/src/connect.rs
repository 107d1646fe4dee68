//! Connect retry policy.
//!
//! Each attempt gets a 5 second deadline (enforced inside the transport's
//! signalling wait); only errors classified recoverable are retried, and
//! reconnects get a longer leash than first connects.

use crate::infrastructure::connection::MatchboxConnection;
use crate::infrastructure::error::{TransportError, TransportResult};
use parlor_core::LobbyCode;

/// Attempt budget for a first connect.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Attempt budget when resuming a seat after a disconnect.
pub const RECONNECT_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn connect() -> Self {
        Self {
            attempts: CONNECT_ATTEMPTS,
        }
    }

    pub fn reconnect() -> Self {
        Self {
            attempts: RECONNECT_ATTEMPTS,
        }
    }
}

/// Signalling room for a lobby: everyone who knows the code meets here.
pub fn room_url(signalling_base: &str, code: &LobbyCode) -> String {
    format!("{}/parlor_{}", signalling_base.trim_end_matches('/'), code)
}

/// Dial the signalling room until it works or the policy is spent.
pub async fn connect_with_retry(
    signalling_base: &str,
    code: &LobbyCode,
    policy: RetryPolicy,
) -> TransportResult<MatchboxConnection> {
    let url = room_url(signalling_base, code);
    let mut last_error = TransportError::SignallingTimeout;

    for attempt in 1..=policy.attempts {
        match MatchboxConnection::connect(&url).await {
            Ok(connection) => return Ok(connection),
            Err(err) if err.is_recoverable() && attempt < policy.attempts => {
                tracing::warn!(attempt, %err, "connect attempt failed, retrying");
                last_error = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error)
}
