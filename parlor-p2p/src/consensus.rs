//! Turn consensus engine.
//!
//! Each discrete move runs a propose → validate → unanimous-approve →
//! finalize cycle above the lobby. Only the host collects approvals; every
//! peer validates independently, and a finalize only applies where the local
//! peer approved the same move itself. A host that fabricates a finalize for
//! a move an honest peer never validated gets refused by that peer.

use crate::error::SessionError;
use crate::events::SessionEvent;
use parlor_core::game::{Game, GameError, GameSettings};
use parlor_core::message::GameMessage;
use parlor_core::PlayerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::rc::Rc;
use uuid::Uuid;

/// Inner types the engine reserves; everything else passes through.
pub const INNER_PROPOSE_MOVE: &str = "propose-move";
pub const INNER_APPROVE_MOVE: &str = "approve-move";
pub const INNER_FINALIZE_MOVE: &str = "finalize-move";
pub const INNER_REQUEST_STATE: &str = "request-state";
pub const INNER_SYNC_STATE: &str = "sync-state";

/// Consensus traffic the engine asks the session to put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GameEffect {
    ToHost(GameMessage),
    ToPlayer(PlayerId, GameMessage),
    /// Host only: send to every guest except the named player.
    BroadcastExcept(Option<PlayerId>, GameMessage),
    Event(SessionEvent),
}

/// A proposed move awaiting unanimous approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMove {
    pub move_id: Uuid,
    pub mv: Value,
    pub proposer: PlayerId,
    pub approvals: HashSet<PlayerId>,
    pub locally_approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveRef {
    move_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncState {
    game_state: Value,
}

/// One engine instance per game session, host and guest alike.
pub struct ConsensusEngine {
    game: Rc<dyn Game>,
    is_host: bool,
    local: PlayerId,
    /// Turn order from the `game-start` roster; stable for the whole match.
    turn_order: Vec<PlayerId>,
    /// Players whose approval a round still requires (host view).
    connected: HashSet<PlayerId>,
    state: Value,
    pending: Option<PendingMove>,
    last_finalized: Option<Uuid>,
    has_received_initial_sync: bool,
    effects: Vec<GameEffect>,
}

impl ConsensusEngine {
    pub fn new_host(
        game: Rc<dyn Game>,
        local: PlayerId,
        turn_order: Vec<PlayerId>,
        settings: &GameSettings,
    ) -> Result<Self, GameError> {
        let state = game.initial_state(turn_order.len(), settings)?;
        Ok(Self {
            game,
            is_host: true,
            local,
            connected: turn_order.iter().copied().collect(),
            turn_order,
            state,
            pending: None,
            last_finalized: None,
            // Hosts own the state of record and never accept a sync.
            has_received_initial_sync: true,
            effects: Vec::new(),
        })
    }

    pub fn new_guest(
        game: Rc<dyn Game>,
        local: PlayerId,
        turn_order: Vec<PlayerId>,
        settings: &GameSettings,
    ) -> Result<Self, GameError> {
        let state = game.initial_state(turn_order.len(), settings)?;
        Ok(Self {
            game,
            is_host: false,
            local,
            connected: turn_order.iter().copied().collect(),
            turn_order,
            state,
            pending: None,
            last_finalized: None,
            has_received_initial_sync: false,
            effects: Vec::new(),
        })
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn pending_move(&self) -> Option<&PendingMove> {
        self.pending.as_ref()
    }

    pub fn has_received_initial_sync(&self) -> bool {
        self.has_received_initial_sync
    }

    pub(crate) fn take_effects(&mut self) -> Vec<GameEffect> {
        std::mem::take(&mut self.effects)
    }

    /// Guest startup: ask the host for the current state of record.
    pub fn request_initial_state(&mut self) {
        if self.is_host || self.has_received_initial_sync {
            return;
        }
        self.effects.push(GameEffect::ToHost(GameMessage {
            inner_type: INNER_REQUEST_STATE.to_string(),
            data: Value::Object(Default::default()),
            sender_id: Some(self.local),
        }));
    }

    /// Originate a move. Refused while another move is pending.
    pub fn propose(&mut self, mv: Value) -> Result<Uuid, SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::MovePending);
        }
        let Some(index) = self.index_of(self.local) else {
            return Err(SessionError::UnknownPlayer(self.local));
        };
        if !mv.is_object() || !self.game.validate_move(&self.state, &mv, index) {
            return Err(SessionError::InvalidMove);
        }

        let move_id = Uuid::new_v4();
        let mut approvals = HashSet::new();
        approvals.insert(self.local);
        self.pending = Some(PendingMove {
            move_id,
            mv: mv.clone(),
            proposer: self.local,
            approvals,
            locally_approved: true,
        });

        let message = propose_payload(move_id, &mv, self.local);
        if self.is_host {
            self.effects
                .push(GameEffect::BroadcastExcept(Some(self.local), message));
            self.check_completeness();
        } else {
            self.effects.push(GameEffect::ToHost(message));
        }
        Ok(move_id)
    }

    /// Consensus or pass-through traffic, post-guard. `from` is the envelope
    /// sender; the payload's own `sender_id` survives host relays.
    pub fn handle_message(&mut self, from: PlayerId, message: &GameMessage) {
        match message.inner_type.as_str() {
            INNER_PROPOSE_MOVE => self.handle_propose(from, message),
            INNER_APPROVE_MOVE => self.handle_approve(from, message),
            INNER_FINALIZE_MOVE => self.handle_finalize(from, message),
            INNER_REQUEST_STATE => self.handle_request_state(from),
            INNER_SYNC_STATE => self.handle_sync_state(message),
            _ => self.handle_passthrough(from, message),
        }
    }

    /// Presence change from the lobby layer. On the host a disconnect can
    /// complete an otherwise-stalled round.
    pub fn set_connected(&mut self, id: PlayerId, connected: bool) {
        if connected {
            self.connected.insert(id);
        } else {
            self.connected.remove(&id);
        }
        if self.is_host {
            self.check_completeness();
        }
    }

    fn handle_propose(&mut self, from: PlayerId, message: &GameMessage) {
        let proposer = message.sender_id.unwrap_or(from);
        if proposer == self.local {
            return;
        }
        let Some((move_id, mv)) = parse_propose(&message.data) else {
            tracing::warn!(inner = INNER_PROPOSE_MOVE, "malformed proposal dropped");
            return;
        };
        let Some(index) = self.index_of(proposer) else {
            tracing::warn!(player = %proposer, "proposal from unknown player dropped");
            return;
        };

        if !self.game.validate_move(&self.state, &mv, index) {
            // Invalid proposals starve: no pending entry, no approval.
            tracing::debug!(player = %proposer, "invalid proposal discarded");
            return;
        }

        match &mut self.pending {
            Some(pending) if pending.move_id == move_id => {
                pending.approvals.insert(proposer);
                pending.approvals.insert(self.local);
                pending.locally_approved = true;
            }
            _ => {
                let mut approvals = HashSet::new();
                approvals.insert(proposer);
                approvals.insert(self.local);
                self.pending = Some(PendingMove {
                    move_id,
                    mv: mv.clone(),
                    proposer,
                    approvals,
                    locally_approved: true,
                });
            }
        }

        if self.is_host {
            self.effects.push(GameEffect::BroadcastExcept(
                Some(proposer),
                propose_payload(move_id, &mv, proposer),
            ));
            self.check_completeness();
        } else {
            self.effects.push(GameEffect::ToHost(GameMessage {
                inner_type: INNER_APPROVE_MOVE.to_string(),
                data: move_ref(move_id),
                sender_id: Some(self.local),
            }));
        }
    }

    fn handle_approve(&mut self, from: PlayerId, message: &GameMessage) {
        if !self.is_host {
            tracing::warn!(player = %from, "approval received by non-host, dropped");
            return;
        }
        let Ok(MoveRef { move_id }) = serde_json::from_value(message.data.clone()) else {
            tracing::warn!(inner = INNER_APPROVE_MOVE, "malformed approval dropped");
            return;
        };
        match &mut self.pending {
            Some(pending) if pending.move_id == move_id => {
                pending.approvals.insert(from);
                self.check_completeness();
            }
            _ => {
                tracing::debug!(player = %from, %move_id, "approval for unknown move ignored");
            }
        }
    }

    fn handle_finalize(&mut self, from: PlayerId, message: &GameMessage) {
        if self.is_host {
            tracing::warn!(player = %from, "finalize received by host, dropped");
            return;
        }
        let Ok(MoveRef { move_id }) = serde_json::from_value(message.data.clone()) else {
            tracing::warn!(inner = INNER_FINALIZE_MOVE, "malformed finalize dropped");
            return;
        };
        self.finalize_move(move_id);
    }

    fn handle_request_state(&mut self, from: PlayerId) {
        if !self.is_host {
            tracing::warn!(player = %from, "state request received by non-host, dropped");
            return;
        }
        let data = match serde_json::to_value(SyncState {
            game_state: self.state.clone(),
        }) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(%err, "state snapshot serialization failed");
                return;
            }
        };
        self.effects.push(GameEffect::ToPlayer(
            from,
            GameMessage {
                inner_type: INNER_SYNC_STATE.to_string(),
                data,
                sender_id: Some(self.local),
            },
        ));
    }

    fn handle_sync_state(&mut self, message: &GameMessage) {
        if self.is_host {
            tracing::warn!("sync-state received by host, dropped");
            return;
        }
        if self.has_received_initial_sync {
            tracing::warn!("repeat sync-state refused");
            return;
        }
        let Ok(SyncState { game_state }) = serde_json::from_value(message.data.clone()) else {
            tracing::warn!(inner = INNER_SYNC_STATE, "malformed sync-state dropped");
            return;
        };
        self.state = game_state;
        self.has_received_initial_sync = true;
        self.effects.push(GameEffect::Event(SessionEvent::StateSynced));
    }

    fn handle_passthrough(&mut self, from: PlayerId, message: &GameMessage) {
        let sender = message.sender_id.or(Some(from));
        if self.is_host && sender != Some(self.local) {
            let mut relay = message.clone();
            relay.sender_id = sender;
            self.effects.push(GameEffect::BroadcastExcept(sender, relay));
        }
        self.effects.push(GameEffect::Event(SessionEvent::GameMessage {
            inner_type: message.inner_type.clone(),
            data: message.data.clone(),
            sender,
        }));
    }

    /// Host only: finalize once every connected player has approved.
    fn check_completeness(&mut self) {
        if !self.is_host {
            return;
        }
        let Some(pending) = &self.pending else {
            return;
        };
        let unanimous = self
            .turn_order
            .iter()
            .filter(|id| self.connected.contains(id))
            .all(|id| pending.approvals.contains(id));
        if !unanimous {
            return;
        }

        let move_id = pending.move_id;
        self.effects.push(GameEffect::BroadcastExcept(
            None,
            GameMessage {
                inner_type: INNER_FINALIZE_MOVE.to_string(),
                data: move_ref(move_id),
                sender_id: Some(self.local),
            },
        ));
        self.finalize_move(move_id);
    }

    /// Dual-approval gate: a finalize applies only where this peer approved
    /// the same move itself.
    fn finalize_move(&mut self, move_id: Uuid) {
        if self.last_finalized == Some(move_id) {
            // Re-delivery of an already-finalized move.
            return;
        }

        let locally_approved = self
            .pending
            .as_ref()
            .is_some_and(|p| p.move_id == move_id && p.locally_approved);
        if !locally_approved {
            tracing::warn!(
                %move_id,
                "refusing finalize for a move this peer never approved"
            );
            self.pending = None;
            self.effects
                .push(GameEffect::Event(SessionEvent::FinalizeRefused { move_id }));
            return;
        }

        let Some(pending) = self.pending.take() else {
            return;
        };
        match self.game.apply_move(&self.state, &pending.mv) {
            Ok(next) => {
                self.state = next;
                self.last_finalized = Some(move_id);
                self.effects.push(GameEffect::Event(SessionEvent::MoveApplied {
                    state: self.state.clone(),
                }));
                if let Some(outcome) = self.game.outcome(&self.state) {
                    self.effects
                        .push(GameEffect::Event(SessionEvent::GameEnded { outcome }));
                }
            }
            Err(err) => {
                tracing::error!(%move_id, %err, "approved move failed to apply");
            }
        }
    }

    fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.turn_order.iter().position(|p| *p == id)
    }
}

fn move_ref(move_id: Uuid) -> Value {
    // MoveRef always serializes; a uuid in a map cannot fail.
    serde_json::to_value(MoveRef { move_id }).unwrap_or(Value::Null)
}

/// `propose-move` carries the move fields inline next to `move_id`.
fn propose_payload(move_id: Uuid, mv: &Value, proposer: PlayerId) -> GameMessage {
    let mut data = match mv {
        Value::Object(map) => map.clone(),
        _ => Default::default(),
    };
    data.insert("move_id".to_string(), Value::String(move_id.to_string()));
    GameMessage {
        inner_type: INNER_PROPOSE_MOVE.to_string(),
        data: Value::Object(data),
        sender_id: Some(proposer),
    }
}

fn parse_propose(data: &Value) -> Option<(Uuid, Value)> {
    let Value::Object(map) = data else {
        return None;
    };
    let mut map = map.clone();
    let id_value = map.remove("move_id")?;
    let move_id = Uuid::parse_str(id_value.as_str()?).ok()?;
    Some((move_id, Value::Object(map)))
}
