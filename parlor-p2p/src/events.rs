//! Events surfaced to the UI collaborator.
//!
//! The session never throws across its public surface: everything the
//! embedding layer needs to know, including terminal failures, arrives
//! through [`SessionEvent`]s drained after each poll.

use parlor_core::{GameOutcome, LobbySettings, Player, PlayerId, RejectReason};
use serde_json::Value;
use uuid::Uuid;

/// Where a guest's join attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// Waiting for the transport to reach the host.
    Connecting,
    /// `join-request` sent, no verdict yet.
    Requested,
    /// Waiting in the host's approval queue.
    Pending,
    Joined,
    Rejected(RejectReason),
    Denied,
    Kicked,
    Left,
    HostLost,
}

impl JoinStatus {
    /// Terminal states survive later transport noise.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JoinStatus::Rejected(_)
                | JoinStatus::Denied
                | JoinStatus::Kicked
                | JoinStatus::Left
                | JoinStatus::HostLost
        )
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    LeftLobby,
    HostLeft,
    HostDisconnected,
    Kicked,
    Denied,
    Rejected(RejectReason),
    NotEnoughPlayers,
    Transport(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    JoinStatus(JoinStatus),
    /// Bulk view change (initial accepted view, settings import).
    LobbyUpdated,
    PlayerJoined { player: Player },
    PlayerConnection { logical_id: PlayerId, is_connected: bool },
    PlayerLeft { logical_id: PlayerId },
    PlayerKicked { logical_id: PlayerId },
    PlayerReady { logical_id: PlayerId, is_ready: bool },
    /// Host UI: a joiner is waiting for approval.
    JoinRequested { logical_id: PlayerId, display_name: String },
    /// Host UI: a pending request was turned away.
    RequestDenied { logical_id: PlayerId },
    SettingsChanged { settings: LobbySettings },
    GameSelected { game_id: String },
    GameStarted { game_id: String },
    /// The one-shot initial state sync landed.
    StateSynced,
    MoveApplied { state: Value },
    /// A finalize arrived for a move this peer never approved.
    FinalizeRefused { move_id: Uuid },
    GameEnded { outcome: GameOutcome },
    /// Game traffic the engine does not interpret.
    GameMessage {
        inner_type: String,
        data: Value,
        sender: Option<PlayerId>,
    },
    Closed { reason: CloseReason },
}
