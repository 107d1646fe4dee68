//! Host lobby state machine.
//!
//! The host owns the lobby's state of record: the ordered roster, the
//! pending join queue, the token ledger and the transport-address map. It
//! consumes guarded envelopes and user actions, and queues effects for the
//! session facade to execute. No transport calls happen here.

use crate::effect::Effect;
use crate::error::SessionError;
use crate::events::{CloseReason, SessionEvent};
use crate::guard::{PeerContext, RoleKind};
use crate::peer::PeerId;
use crate::peer_map::PeerMap;
use crate::timer::TimerQueue;
use parlor_core::message::{
    Empty, GameSelected, GameStart, JoinAccepted, JoinRejected, JoinRequest, MessageKind,
    PlayerJoined, PlayerKicked, PlayerLeft, PlayerReady, RejectReason, SettingsUpdate,
};
use parlor_core::{
    GameInfo, LobbyCode, LobbySettings, Player, PlayerId, Roster, SessionToken,
};
use std::collections::HashMap;

/// How long a disconnected guest may take to come back.
pub const RECONNECT_WINDOW_MS: u64 = 5_000;

/// Delay between a terminal message and the socket teardown, so the peer
/// still receives the verdict.
pub const GRACE_CLOSE_MS: u64 = 500;

/// Lobby capacity while no game is selected.
pub const DEFAULT_MAX_PLAYERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostTimer {
    ReconnectWindow(PlayerId),
    GraceClose(PeerId),
}

/// A joiner waiting for the host's verdict.
#[derive(Debug, Clone)]
pub struct PendingJoinRequest {
    pub logical_id: PlayerId,
    pub display_name: String,
    pub submitted_at: u64,
    pub(crate) peer: PeerId,
}

pub struct HostLobby {
    code: LobbyCode,
    local: PlayerId,
    selected_game: Option<GameInfo>,
    settings: LobbySettings,
    players: Roster,
    pending: Vec<PendingJoinRequest>,
    /// Append-only token ledger; a logical id keeps its first token for the
    /// whole lobby lifetime.
    tokens: HashMap<PlayerId, SessionToken>,
    peers: PeerMap,
    game_started: bool,
    timers: TimerQueue<HostTimer>,
    effects: Vec<Effect>,
    closed: bool,
}

impl HostLobby {
    pub fn new(
        code: LobbyCode,
        local: PlayerId,
        display_name: String,
        settings: LobbySettings,
    ) -> Result<Self, SessionError> {
        let mut players = Roster::new();
        let host = Player::new_host(local, display_name)?;
        // A fresh roster cannot already contain the host.
        let _ = players.add(host);

        Ok(Self {
            code,
            local,
            selected_game: None,
            settings,
            players,
            pending: Vec::new(),
            tokens: HashMap::new(),
            peers: PeerMap::new(),
            game_started: false,
            timers: TimerQueue::new(),
            effects: Vec::new(),
            closed: false,
        })
    }

    // View accessors

    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    pub fn local_id(&self) -> PlayerId {
        self.local
    }

    pub fn players(&self) -> &Roster {
        &self.players
    }

    pub fn pending_requests(&self) -> &[PendingJoinRequest] {
        &self.pending
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn selected_game(&self) -> Option<&GameInfo> {
        self.selected_game.as_ref()
    }

    pub fn is_game_started(&self) -> bool {
        self.game_started
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn peer_for(&self, player: PlayerId) -> Option<PeerId> {
        self.peers.peer_for(player)
    }

    #[cfg(test)]
    fn token_for(&self, player: PlayerId) -> Option<&SessionToken> {
        self.tokens.get(&player)
    }

    /// Guard context for an inbound datagram on this connection.
    pub(crate) fn peer_context(&self, peer: PeerId) -> PeerContext {
        let mapped = self.peers.player_for(peer);
        PeerContext {
            role: RoleKind::Host,
            mapped,
            admitted: mapped.is_some_and(|id| self.players.contains(id)),
            from_host: false,
        }
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    fn capacity(&self) -> usize {
        self.selected_game
            .as_ref()
            .map(|game| game.max_players)
            .unwrap_or(DEFAULT_MAX_PLAYERS)
    }

    // Inbound messages (already guarded)

    pub fn handle_message(&mut self, peer: PeerId, kind: &MessageKind, now_ms: u64) {
        if self.closed {
            return;
        }
        match kind {
            MessageKind::JoinRequest(request) => self.handle_join_request(peer, request, now_ms),
            MessageKind::PlayerReady(ready) => self.handle_player_ready(ready),
            MessageKind::PlayerLeft(left) => self.handle_player_left(peer, left),
            MessageKind::Ping(payload) => self.send(peer, MessageKind::Pong(payload.clone())),
            MessageKind::Pong(_) => {}
            other => {
                tracing::debug!(tag = other.tag(), "message ignored by host lobby");
            }
        }
    }

    fn handle_join_request(&mut self, peer: PeerId, request: &JoinRequest, now_ms: u64) {
        let id = request.logical_id;

        if self.players.contains(id) {
            self.handle_reconnect(peer, request, now_ms);
            return;
        }

        if self.game_started {
            self.reject_and_close(peer, RejectReason::InGame, now_ms);
            return;
        }
        if self.players.len() >= self.capacity() {
            self.reject_and_close(peer, RejectReason::CapacityReached, now_ms);
            return;
        }

        if self.settings.requires_request {
            if self.pending.iter().any(|p| p.logical_id == id) {
                tracing::debug!(player = %id, "duplicate join request while pending");
                return;
            }
            self.pending.push(PendingJoinRequest {
                logical_id: id,
                display_name: request.display_name.clone(),
                submitted_at: now_ms,
                peer,
            });
            self.peers.register(peer, id);
            self.send(peer, MessageKind::JoinPending(Empty {}));
            self.emit(SessionEvent::JoinRequested {
                logical_id: id,
                display_name: request.display_name.clone(),
            });
            return;
        }

        self.admit(peer, id, request.display_name.clone());
    }

    /// A known logical id coming back. The token is the sole defense against
    /// impersonation of a departed player.
    fn handle_reconnect(&mut self, peer: PeerId, request: &JoinRequest, now_ms: u64) {
        let id = request.logical_id;
        if id == self.local {
            tracing::warn!(peer = %peer, "join request claiming the host identity refused");
            self.reject_and_close(peer, RejectReason::Denied, now_ms);
            return;
        }
        let expected = self.tokens.get(&id);

        let presented = request.session_token.as_ref();
        if expected.is_some() && presented != expected {
            tracing::warn!(player = %id, "reconnect with bad session token refused");
            self.reject_and_close(peer, RejectReason::Denied, now_ms);
            return;
        }

        self.timers.cancel(&HostTimer::ReconnectWindow(id));

        // At most one current connection per logical id.
        if let Some(old_peer) = self.peers.peer_for(id) {
            if old_peer != peer {
                self.grace_close(old_peer, now_ms);
            }
        }
        self.peers.register(peer, id);

        if let Some(player) = self.players.get_mut(id) {
            player.set_connected(true);
        }

        let token = self.tokens.get(&id).cloned();
        let view = self.accepted_view(token);
        self.send(peer, MessageKind::JoinAccepted(view));

        if let Some(player) = self.players.get(id).cloned() {
            self.broadcast_except(MessageKind::PlayerJoined(PlayerJoined { player }), Some(id));
        }
        self.emit(SessionEvent::PlayerConnection {
            logical_id: id,
            is_connected: true,
        });
        tracing::info!(player = %id, "player reconnected");
    }

    fn admit(&mut self, peer: PeerId, id: PlayerId, display_name: String) {
        let player = match Player::new_guest(id, display_name) {
            Ok(player) => player,
            Err(err) => {
                tracing::warn!(player = %id, %err, "join request with bad display name dropped");
                return;
            }
        };

        let token = self
            .tokens
            .entry(id)
            .or_insert_with(SessionToken::generate)
            .clone();

        if self.players.add(player.clone()).is_err() {
            return;
        }
        self.peers.register(peer, id);

        let view = self.accepted_view(Some(token));
        self.send(peer, MessageKind::JoinAccepted(view));
        self.broadcast_except(MessageKind::PlayerJoined(PlayerJoined { player: player.clone() }), Some(id));
        self.emit(SessionEvent::PlayerJoined { player });
        tracing::info!(player = %id, "player admitted");
    }

    fn handle_player_ready(&mut self, ready: &PlayerReady) {
        let Some(player) = self.players.get_mut(ready.logical_id) else {
            tracing::debug!(player = %ready.logical_id, "ready for unknown player ignored");
            return;
        };
        player.set_ready(ready.is_ready);

        // Re-broadcast so every guest converges on the same ready view.
        self.broadcast_except(
            MessageKind::PlayerReady(*ready),
            Some(ready.logical_id),
        );
        self.emit(SessionEvent::PlayerReady {
            logical_id: ready.logical_id,
            is_ready: ready.is_ready,
        });
    }

    fn handle_player_left(&mut self, peer: PeerId, left: &PlayerLeft) {
        let id = left.logical_id;
        if self.players.remove(id).is_err() {
            return;
        }
        self.peers.remove_by_player(id);
        self.timers.cancel(&HostTimer::ReconnectWindow(id));
        self.broadcast_except(MessageKind::PlayerLeft(*left), Some(id));
        self.effects.push(Effect::Close { peer });
        self.emit(SessionEvent::PlayerLeft { logical_id: id });
        tracing::info!(player = %id, "player left");
    }

    // Presence

    /// Transport close for a host-side connection.
    pub fn peer_closed(&mut self, peer: PeerId, now_ms: u64) {
        if self.closed {
            return;
        }
        // A close for a connection that is not the current one for any
        // logical id is stale; presence is untouched.
        let Some(id) = self.peers.remove_by_peer(peer) else {
            tracing::debug!(peer = %peer, "close for unmapped connection ignored");
            return;
        };

        if let Some(index) = self.pending.iter().position(|p| p.logical_id == id) {
            self.pending.remove(index);
            tracing::debug!(player = %id, "pending joiner disconnected");
            return;
        }

        let Some(player) = self.players.get_mut(id) else {
            return;
        };
        player.set_connected(false);
        let announcement = player.clone();

        // Re-announce the player so everyone learns the connection state.
        self.broadcast_except(
            MessageKind::PlayerJoined(PlayerJoined {
                player: announcement,
            }),
            Some(id),
        );
        self.emit(SessionEvent::PlayerConnection {
            logical_id: id,
            is_connected: false,
        });
        self.timers
            .schedule(HostTimer::ReconnectWindow(id), now_ms + RECONNECT_WINDOW_MS);
        tracing::info!(player = %id, "player disconnected, reconnect window open");
    }

    /// Drive deadlines. Call once per poll.
    pub fn tick(&mut self, now_ms: u64) {
        if self.closed {
            return;
        }
        for timer in self.timers.expire(now_ms) {
            match timer {
                HostTimer::GraceClose(peer) => {
                    self.effects.push(Effect::Close { peer });
                }
                HostTimer::ReconnectWindow(id) => self.reconnect_window_expired(id),
            }
        }
    }

    fn reconnect_window_expired(&mut self, id: PlayerId) {
        let still_disconnected = self
            .players
            .get(id)
            .map(|p| !p.is_connected())
            .unwrap_or(false);
        if !still_disconnected {
            return;
        }

        let _ = self.players.remove(id);
        self.peers.remove_by_player(id);
        self.broadcast_except(MessageKind::PlayerLeft(PlayerLeft { logical_id: id }), Some(id));
        self.emit(SessionEvent::PlayerLeft { logical_id: id });
        tracing::info!(player = %id, "reconnect window expired, player removed");

        if self.game_started && self.players.connected_count() <= 1 {
            self.teardown(CloseReason::NotEnoughPlayers);
        }
    }

    // Host user actions

    pub fn approve(&mut self, id: PlayerId, now_ms: u64) -> Result<(), SessionError> {
        self.ensure_open()?;
        let index = self
            .pending
            .iter()
            .position(|p| p.logical_id == id)
            .ok_or(SessionError::UnknownPendingRequest(id))?;
        let request = self.pending.remove(index);

        // The lobby may have filled while this request waited.
        if self.players.len() >= self.capacity() {
            self.turn_away_pending(&request, now_ms);
            return Ok(());
        }

        self.send(request.peer, MessageKind::JoinApproved(Empty {}));
        self.admit(request.peer, request.logical_id, request.display_name);

        if self.players.len() >= self.capacity() {
            // Admitting filled the lobby; everyone still waiting is denied
            // in the same batch.
            let waiting = std::mem::take(&mut self.pending);
            for request in waiting {
                self.turn_away_pending(&request, now_ms);
            }
        }
        Ok(())
    }

    pub fn deny(&mut self, id: PlayerId, now_ms: u64) -> Result<(), SessionError> {
        self.ensure_open()?;
        let index = self
            .pending
            .iter()
            .position(|p| p.logical_id == id)
            .ok_or(SessionError::UnknownPendingRequest(id))?;
        let request = self.pending.remove(index);

        self.send(request.peer, MessageKind::JoinDenied(Empty {}));
        self.peers.remove_by_peer(request.peer);
        self.grace_close(request.peer, now_ms);
        self.emit(SessionEvent::RequestDenied {
            logical_id: request.logical_id,
        });
        Ok(())
    }

    fn turn_away_pending(&mut self, request: &PendingJoinRequest, now_ms: u64) {
        self.send(
            request.peer,
            MessageKind::JoinRejected(JoinRejected {
                reason: RejectReason::CapacityReached,
            }),
        );
        self.peers.remove_by_peer(request.peer);
        self.grace_close(request.peer, now_ms);
        self.emit(SessionEvent::RequestDenied {
            logical_id: request.logical_id,
        });
    }

    pub fn kick(&mut self, id: PlayerId, now_ms: u64) -> Result<(), SessionError> {
        self.ensure_open()?;
        if id == self.local {
            return Err(SessionError::UnknownPlayer(id));
        }
        if self.players.remove(id).is_err() {
            return Err(SessionError::UnknownPlayer(id));
        }

        let kicked = MessageKind::PlayerKicked(PlayerKicked { logical_id: id });
        if let Some(peer) = self.peers.remove_by_player(id) {
            self.send(peer, kicked.clone());
            self.grace_close(peer, now_ms);
        }
        self.timers.cancel(&HostTimer::ReconnectWindow(id));
        self.broadcast_except(kicked, Some(id));
        self.emit(SessionEvent::PlayerKicked { logical_id: id });
        tracing::info!(player = %id, "player kicked");
        Ok(())
    }

    pub fn set_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        self.ensure_open()?;
        if let Some(player) = self.players.get_mut(self.local) {
            player.set_ready(ready);
        }
        self.broadcast_except(
            MessageKind::PlayerReady(PlayerReady {
                logical_id: self.local,
                is_ready: ready,
            }),
            None,
        );
        self.emit(SessionEvent::PlayerReady {
            logical_id: self.local,
            is_ready: ready,
        });
        Ok(())
    }

    pub fn update_settings(&mut self, settings: LobbySettings) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.settings = settings.clone();
        self.broadcast_except(
            MessageKind::LobbySettings(SettingsUpdate {
                settings: settings.clone(),
            }),
            None,
        );
        self.emit(SessionEvent::SettingsChanged { settings });
        Ok(())
    }

    pub fn select_game(&mut self, game: GameInfo) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.game_started {
            return Err(SessionError::GameAlreadyStarted);
        }
        let game_id = game.id.clone();
        self.selected_game = Some(game);
        self.broadcast_except(
            MessageKind::GameSelected(GameSelected {
                game_id: game_id.clone(),
            }),
            None,
        );
        self.emit(SessionEvent::GameSelected { game_id });
        Ok(())
    }

    /// Start the selected game. `is_game_started` flips exactly once.
    pub fn start_game(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.game_started {
            return Err(SessionError::GameAlreadyStarted);
        }
        let game = self
            .selected_game
            .as_ref()
            .ok_or(SessionError::NoGameSelected)?;
        if self.players.len() < game.min_players || self.players.len() > game.max_players {
            return Err(SessionError::NotEnoughPlayers);
        }

        self.game_started = true;
        let game_id = game.id.clone();
        self.broadcast_except(
            MessageKind::GameStart(GameStart {
                game_id: game_id.clone(),
                players: self.players.to_vec(),
            }),
            None,
        );
        self.emit(SessionEvent::GameStarted { game_id });
        tracing::info!("game started");
        Ok(())
    }

    /// Host departure kills the lobby; there is no failover.
    pub fn leave(&mut self) {
        if self.closed {
            return;
        }
        self.broadcast_except(MessageKind::HostLeft(Empty {}), None);
        self.teardown(CloseReason::LeftLobby);
    }

    // Plumbing

    /// Target for a consensus broadcast: all connected admitted players.
    pub(crate) fn connected_guest_peers(&self, except: Option<PlayerId>) -> Vec<PeerId> {
        self.players
            .iter()
            .filter(|p| p.is_connected() && p.id() != self.local && Some(p.id()) != except)
            .filter_map(|p| self.peers.peer_for(p.id()))
            .collect()
    }

    fn accepted_view(&self, session_token: Option<SessionToken>) -> JoinAccepted {
        JoinAccepted {
            players: self.players.to_vec(),
            selected_game: self.selected_game.as_ref().map(|g| g.id.clone()),
            settings: self.settings.clone(),
            is_game_started: self.game_started,
            session_token,
        }
    }

    fn reject_and_close(&mut self, peer: PeerId, reason: RejectReason, now_ms: u64) {
        self.send(peer, MessageKind::JoinRejected(JoinRejected { reason }));
        self.grace_close(peer, now_ms);
    }

    fn grace_close(&mut self, peer: PeerId, now_ms: u64) {
        self.timers
            .schedule(HostTimer::GraceClose(peer), now_ms + GRACE_CLOSE_MS);
    }

    fn send(&mut self, to: PeerId, kind: MessageKind) {
        self.effects.push(Effect::Send { to, kind });
    }

    fn broadcast_except(&mut self, kind: MessageKind, except: Option<PlayerId>) {
        for peer in self.connected_guest_peers(except) {
            self.effects.push(Effect::Send {
                to: peer,
                kind: kind.clone(),
            });
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.effects.push(Effect::Event(event));
    }

    fn teardown(&mut self, reason: CloseReason) {
        self.closed = true;
        self.timers.clear();
        self.peers.clear();
        self.effects.push(Effect::Teardown(reason));
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}
