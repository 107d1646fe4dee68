//! Inbound message police.
//!
//! Every datagram passes four gates before any handler sees it: structural
//! decode, the authority table, sender binding and freshness, then the
//! per-peer rate limiter. A violation drops that one message with a warning;
//! the connection stays open. Token mismatches are the lobby's business, not
//! the guard's.

use crate::consensus::INNER_APPROVE_MOVE;
use crate::peer::PeerId;
use parlor_core::message::{Envelope, MessageKind};
use parlor_core::PlayerId;
use std::collections::{HashMap, VecDeque};

/// Maximum tolerated clock skew between sender and receiver.
pub const FRESHNESS_WINDOW_MS: u64 = 30_000;

/// Sliding rate-limit window.
pub const RATE_LIMIT_WINDOW_MS: u64 = 1_000;

/// Messages allowed per peer per window.
pub const RATE_LIMIT_MAX_MESSAGES: usize = 30;

/// Which end of the star is receiving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Host,
    Guest,
}

/// What the receiver knows about the sending connection.
#[derive(Debug, Clone, Copy)]
pub struct PeerContext {
    pub role: RoleKind,
    /// Host side: logical id currently mapped to this transport address.
    pub mapped: Option<PlayerId>,
    /// Host side: the mapped id belongs to an admitted player.
    pub admitted: bool,
    /// Guest side: the message arrived over the host connection.
    pub from_host: bool,
}

/// Why a message was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("sender lacks authority for {0}")]
    Authority(&'static str),

    #[error("sender id does not match the connection")]
    SenderMismatch,

    #[error("stale timestamp, skew {skew_ms}ms")]
    Stale { skew_ms: u64 },

    #[error("rate limit exceeded")]
    RateLimited,
}

/// Per-connection message police. One instance per session.
#[derive(Debug, Default)]
pub struct InboundGuard {
    windows: HashMap<PeerId, VecDeque<u64>>,
}

impl InboundGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every gate on a raw datagram. `Ok` means handlers may trust the
    /// envelope's sender and shape.
    pub fn check(
        &mut self,
        peer: PeerId,
        bytes: &[u8],
        ctx: &PeerContext,
        now_ms: u64,
    ) -> Result<Envelope, Violation> {
        let envelope =
            Envelope::decode(bytes).map_err(|err| Violation::Malformed(err.to_string()))?;

        authorize(ctx, &envelope)?;
        bind_sender(ctx, &envelope)?;

        let skew = now_ms.abs_diff(envelope.timestamp);
        if skew > FRESHNESS_WINDOW_MS {
            return Err(Violation::Stale { skew_ms: skew });
        }

        self.rate_limit(peer, &envelope.kind, now_ms)?;

        Ok(envelope)
    }

    /// Drop rate-limit bookkeeping for a closed connection.
    pub fn forget(&mut self, peer: PeerId) {
        self.windows.remove(&peer);
    }

    fn rate_limit(
        &mut self,
        peer: PeerId,
        kind: &MessageKind,
        now_ms: u64,
    ) -> Result<(), Violation> {
        if is_rate_limit_exempt(kind) {
            return Ok(());
        }

        let window = self.windows.entry(peer).or_default();
        while let Some(&oldest) = window.front() {
            if now_ms.saturating_sub(oldest) >= RATE_LIMIT_WINDOW_MS {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= RATE_LIMIT_MAX_MESSAGES {
            return Err(Violation::RateLimited);
        }
        window.push_back(now_ms);
        Ok(())
    }
}

/// A dropped approval would stall an otherwise-unanimous round, so approvals
/// bypass the limiter.
fn is_rate_limit_exempt(kind: &MessageKind) -> bool {
    matches!(kind, MessageKind::GameMessage(gm) if gm.inner_type == INNER_APPROVE_MOVE)
}

/// The authority table: which message kinds each end accepts, and from whom.
fn authorize(ctx: &PeerContext, envelope: &Envelope) -> Result<(), Violation> {
    let kind = &envelope.kind;
    let tag = kind.tag();

    match ctx.role {
        RoleKind::Host => match kind {
            MessageKind::JoinRequest(_) => Ok(()),
            MessageKind::Ping(_) | MessageKind::Pong(_) => Ok(()),
            MessageKind::PlayerReady(ready) => {
                if ready.logical_id == envelope.sender_id {
                    Ok(())
                } else {
                    Err(Violation::Authority(tag))
                }
            }
            MessageKind::PlayerLeft(left) => {
                if left.logical_id == envelope.sender_id {
                    Ok(())
                } else {
                    Err(Violation::Authority(tag))
                }
            }
            MessageKind::GameMessage(_) => {
                if ctx.admitted {
                    Ok(())
                } else {
                    Err(Violation::Authority(tag))
                }
            }
            // Everything the host itself originates is never accepted back.
            _ => Err(Violation::Authority(tag)),
        },
        RoleKind::Guest => match kind {
            MessageKind::Ping(_) | MessageKind::Pong(_) => Ok(()),
            MessageKind::JoinRequest(_) => Err(Violation::Authority(tag)),
            _ => {
                if ctx.from_host {
                    Ok(())
                } else {
                    Err(Violation::Authority(tag))
                }
            }
        },
    }
}

/// Host side: any non-`join-request` traffic must come from the logical id
/// mapped to its connection.
fn bind_sender(ctx: &PeerContext, envelope: &Envelope) -> Result<(), Violation> {
    if ctx.role != RoleKind::Host {
        return Ok(());
    }
    if matches!(envelope.kind, MessageKind::JoinRequest(_)) {
        return Ok(());
    }
    match ctx.mapped {
        Some(id) if id == envelope.sender_id => Ok(()),
        _ => Err(Violation::SenderMismatch),
    }
}
