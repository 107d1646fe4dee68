//! Wire envelope and the complete message set.
//!
//! Every datagram is one JSON envelope `{type, payload, sender_id, timestamp}`.
//! Decoding is strict: an unknown tag, a missing field or an extra field in a
//! payload rejects the whole message. Senders never crash receivers; a bad
//! buffer is an `Err`, not a panic.

use crate::domain::{LobbySettings, Player, PlayerId, SessionToken};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors produced by the codec.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The wire envelope. `kind` flattens into `type` + `payload` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub kind: MessageKind,
    pub sender_id: PlayerId,
    /// Milliseconds since the Unix epoch, sender's clock.
    pub timestamp: u64,
}

impl Envelope {
    pub fn new(kind: MessageKind, sender_id: PlayerId, timestamp: u64) -> Self {
        Self {
            kind,
            sender_id,
            timestamp,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Every message the protocol speaks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum MessageKind {
    JoinRequest(JoinRequest),
    JoinAccepted(JoinAccepted),
    JoinRejected(JoinRejected),
    JoinPending(Empty),
    JoinApproved(Empty),
    JoinDenied(Empty),
    PlayerJoined(PlayerJoined),
    PlayerLeft(PlayerLeft),
    PlayerReady(PlayerReady),
    PlayerKicked(PlayerKicked),
    HostLeft(Empty),
    LobbySettings(SettingsUpdate),
    GameSelected(GameSelected),
    GameStart(GameStart),
    GameMessage(GameMessage),
    Ping(Value),
    Pong(Value),
}

impl MessageKind {
    /// Wire tag, for logs and rate-limit bookkeeping.
    pub fn tag(&self) -> &'static str {
        match self {
            MessageKind::JoinRequest(_) => "join-request",
            MessageKind::JoinAccepted(_) => "join-accepted",
            MessageKind::JoinRejected(_) => "join-rejected",
            MessageKind::JoinPending(_) => "join-pending",
            MessageKind::JoinApproved(_) => "join-approved",
            MessageKind::JoinDenied(_) => "join-denied",
            MessageKind::PlayerJoined(_) => "player-joined",
            MessageKind::PlayerLeft(_) => "player-left",
            MessageKind::PlayerReady(_) => "player-ready",
            MessageKind::PlayerKicked(_) => "player-kicked",
            MessageKind::HostLeft(_) => "host-left",
            MessageKind::LobbySettings(_) => "lobby-settings",
            MessageKind::GameSelected(_) => "game-selected",
            MessageKind::GameStart(_) => "game-start",
            MessageKind::GameMessage(_) => "game-message",
            MessageKind::Ping(_) => "ping",
            MessageKind::Pong(_) => "pong",
        }
    }
}

/// Explicit empty payload, so `payload: {}` round-trips strictly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Empty {}

/// Why a join attempt was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    NotFound,
    CapacityReached,
    InGame,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRequest {
    pub display_name: String,
    pub logical_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<SessionToken>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinAccepted {
    pub players: Vec<Player>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_game: Option<String>,
    pub settings: LobbySettings,
    #[serde(default)]
    pub is_game_started: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<SessionToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinRejected {
    pub reason: RejectReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerJoined {
    pub player: Player,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerLeft {
    pub logical_id: PlayerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerReady {
    pub logical_id: PlayerId,
    pub is_ready: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlayerKicked {
    pub logical_id: PlayerId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsUpdate {
    pub settings: LobbySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameSelected {
    pub game_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameStart {
    pub game_id: String,
    pub players: Vec<Player>,
}

/// Consensus and game traffic. `inner_type` selects the engine handler;
/// anything the engine does not reserve passes through to the game layer.
/// `sender_id` carries the original author across a host relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameMessage {
    pub inner_type: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PlayerId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(kind: MessageKind) {
        let envelope = Envelope::new(kind, PlayerId::random(), 1_700_000_000_000);
        let bytes = envelope.encode().unwrap();
        let back = Envelope::decode(&bytes).unwrap();
        assert_eq!(envelope, back);
    }

    #[test]
    fn test_join_request_wire_shape() {
        let id = PlayerId::random();
        let envelope = Envelope::new(
            MessageKind::JoinRequest(JoinRequest {
                display_name: "G".to_string(),
                logical_id: id,
                session_token: None,
            }),
            id,
            42,
        );

        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], json!("join-request"));
        assert_eq!(value["payload"]["display_name"], json!("G"));
        assert_eq!(value["timestamp"], json!(42));
        assert!(value["payload"].get("session_token").is_none());
    }

    #[test]
    fn test_empty_payload_variants() {
        roundtrip(MessageKind::JoinPending(Empty {}));
        roundtrip(MessageKind::JoinApproved(Empty {}));
        roundtrip(MessageKind::JoinDenied(Empty {}));
        roundtrip(MessageKind::HostLeft(Empty {}));
    }

    #[test]
    fn test_reject_reason_tags() {
        let rejected = MessageKind::JoinRejected(JoinRejected {
            reason: RejectReason::CapacityReached,
        });
        let value = serde_json::to_value(&rejected).unwrap();
        assert_eq!(value["payload"]["reason"], json!("capacity-reached"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let raw = json!({
            "type": "teleport",
            "payload": {},
            "sender_id": PlayerId::random(),
            "timestamp": 1,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn test_extra_payload_field_is_rejected() {
        let raw = json!({
            "type": "player-left",
            "payload": {"logical_id": PlayerId::random(), "extra": true},
            "sender_id": PlayerId::random(),
            "timestamp": 1,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn test_missing_payload_field_is_rejected() {
        let raw = json!({
            "type": "player-ready",
            "payload": {"logical_id": PlayerId::random()},
            "sender_id": PlayerId::random(),
            "timestamp": 1,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn test_missing_envelope_field_is_rejected() {
        let raw = json!({
            "type": "ping",
            "payload": {},
            "timestamp": 1,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(Envelope::decode(&bytes).is_err());
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        assert!(Envelope::decode(b"not json at all").is_err());
        assert!(Envelope::decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_game_message_passthrough_roundtrip() {
        roundtrip(MessageKind::GameMessage(GameMessage {
            inner_type: "forfeit".to_string(),
            data: json!({"who": 1}),
            sender_id: Some(PlayerId::random()),
        }));
    }

    #[test]
    fn test_join_accepted_roundtrip() {
        roundtrip(MessageKind::JoinAccepted(JoinAccepted {
            players: vec![
                Player::new_host(PlayerId::random(), "H".to_string()).unwrap(),
                Player::new_guest(PlayerId::random(), "G".to_string()).unwrap(),
            ],
            selected_game: Some("tictactoe".to_string()),
            settings: LobbySettings::default(),
            is_game_started: false,
            session_token: Some(SessionToken::generate()),
        }));
    }

    #[test]
    fn test_ping_carries_opaque_payload() {
        roundtrip(MessageKind::Ping(json!({"nonce": 7})));
        roundtrip(MessageKind::Pong(json!(null)));
    }
}
