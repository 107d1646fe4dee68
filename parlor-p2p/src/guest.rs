//! Guest lobby state machine.
//!
//! A guest holds exactly one connection, to the host, and mirrors the lobby
//! view the host broadcasts. Identity (logical id, display name, session
//! token) lives in the injected session store so a reloaded tab can resume
//! its seat inside the reconnection window.

use crate::effect::Effect;
use crate::error::SessionError;
use crate::events::{CloseReason, JoinStatus, SessionEvent};
use crate::guard::{PeerContext, RoleKind};
use crate::peer::PeerId;
use parlor_core::message::{
    GameStart, JoinAccepted, JoinRequest, MessageKind, PlayerJoined, PlayerLeft, PlayerReady,
};
use parlor_core::storage::keys;
use parlor_core::{LobbyCode, LobbySettings, PlayerId, Roster, SessionStore, SessionToken};

pub struct GuestLobby {
    code: LobbyCode,
    local: PlayerId,
    display_name: String,
    status: JoinStatus,
    host_peer: Option<PeerId>,
    players: Roster,
    selected_game: Option<String>,
    settings: LobbySettings,
    game_started: bool,
    token: Option<SessionToken>,
    /// True once this lobby session accepted us; the token never changes
    /// after that.
    accepted_once: bool,
    store: Box<dyn SessionStore>,
    effects: Vec<Effect>,
    closed: bool,
}

impl GuestLobby {
    /// Restores identity from the store, minting a fresh logical id on first
    /// use of this browser session.
    pub fn new(code: LobbyCode, display_name: String, mut store: Box<dyn SessionStore>) -> Self {
        let local = store
            .get(keys::PLAYER_ID)
            .and_then(|raw| PlayerId::parse(&raw).ok())
            .unwrap_or_else(|| {
                let id = PlayerId::random();
                store.set(keys::PLAYER_ID, &id.to_string());
                id
            });
        store.set(keys::DISPLAY_NAME, &display_name);
        let token = store.get(keys::SESSION_TOKEN).map(SessionToken::from_string);

        Self {
            code,
            local,
            display_name,
            status: JoinStatus::Connecting,
            host_peer: None,
            players: Roster::new(),
            selected_game: None,
            settings: LobbySettings::default(),
            game_started: false,
            token,
            accepted_once: false,
            store,
            effects: Vec::new(),
            closed: false,
        }
    }

    // View accessors

    pub fn code(&self) -> &LobbyCode {
        &self.code
    }

    pub fn local_id(&self) -> PlayerId {
        self.local
    }

    pub fn status(&self) -> JoinStatus {
        self.status
    }

    pub fn players(&self) -> &Roster {
        &self.players
    }

    pub fn settings(&self) -> &LobbySettings {
        &self.settings
    }

    pub fn selected_game(&self) -> Option<&str> {
        self.selected_game.as_deref()
    }

    pub fn is_game_started(&self) -> bool {
        self.game_started
    }

    pub fn session_token(&self) -> Option<&SessionToken> {
        self.token.as_ref()
    }

    pub fn host_peer(&self) -> Option<PeerId> {
        self.host_peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn peer_context(&self, peer: PeerId) -> PeerContext {
        PeerContext {
            role: RoleKind::Guest,
            mapped: None,
            admitted: false,
            from_host: self.host_peer == Some(peer),
        }
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    // Transport callbacks

    /// The first peer the mesh surfaces is the lobby's host.
    pub fn host_connected(&mut self, peer: PeerId) {
        if self.closed || self.host_peer.is_some() {
            return;
        }
        self.host_peer = Some(peer);
        self.send_to_host(MessageKind::JoinRequest(JoinRequest {
            display_name: self.display_name.clone(),
            logical_id: self.local,
            session_token: self.token.clone(),
        }));
        self.set_status(JoinStatus::Requested);
        tracing::info!(peer = %peer, "join request sent to host");
    }

    /// The host connection died underneath us.
    pub fn host_closed(&mut self) {
        if self.closed {
            return;
        }
        // A terminal verdict that already arrived wins over transport noise.
        if self.status.is_terminal() {
            self.teardown_quietly();
            return;
        }
        self.set_status(JoinStatus::HostLost);
        self.teardown(CloseReason::HostDisconnected);
        tracing::warn!("host connection lost");
    }

    // Inbound messages (already guarded)

    pub fn handle_message(&mut self, kind: &MessageKind) {
        if self.closed {
            return;
        }
        match kind {
            MessageKind::JoinAccepted(accepted) => self.handle_accepted(accepted),
            MessageKind::JoinPending(_) => self.set_status(JoinStatus::Pending),
            MessageKind::JoinApproved(_) => {
                tracing::debug!("join approved, waiting for the accepted view");
            }
            MessageKind::JoinRejected(rejected) => {
                self.set_status(JoinStatus::Rejected(rejected.reason));
                self.teardown(CloseReason::Rejected(rejected.reason));
            }
            MessageKind::JoinDenied(_) => {
                self.set_status(JoinStatus::Denied);
                self.teardown(CloseReason::Denied);
            }
            MessageKind::PlayerJoined(joined) => self.handle_player_joined(joined),
            MessageKind::PlayerLeft(left) => self.handle_player_left(left),
            MessageKind::PlayerReady(ready) => self.handle_player_ready(ready),
            MessageKind::PlayerKicked(kicked) => self.handle_player_kicked(kicked.logical_id),
            MessageKind::HostLeft(_) => {
                self.set_status(JoinStatus::HostLost);
                self.teardown(CloseReason::HostLeft);
            }
            MessageKind::LobbySettings(update) => {
                self.settings = update.settings.clone();
                self.emit(SessionEvent::SettingsChanged {
                    settings: update.settings.clone(),
                });
            }
            MessageKind::GameSelected(selected) => {
                self.selected_game = Some(selected.game_id.clone());
                self.emit(SessionEvent::GameSelected {
                    game_id: selected.game_id.clone(),
                });
            }
            MessageKind::GameStart(start) => self.handle_game_start(start),
            MessageKind::Ping(payload) => {
                self.send_to_host(MessageKind::Pong(payload.clone()));
            }
            MessageKind::Pong(_) => {}
            other => {
                tracing::debug!(tag = other.tag(), "message ignored by guest lobby");
            }
        }
    }

    fn handle_accepted(&mut self, accepted: &JoinAccepted) {
        if let Some(token) = &accepted.session_token {
            if !self.accepted_once {
                if self.token.as_ref() != Some(token) {
                    self.token = Some(token.clone());
                    self.store.set(keys::SESSION_TOKEN, token.as_str());
                }
            } else if self.token.as_ref() != Some(token) {
                tracing::warn!("host tried to replace an established session token, keeping ours");
            }
        }
        self.accepted_once = true;

        self.players = Roster::from_players(accepted.players.clone());
        self.selected_game = accepted.selected_game.clone();
        self.settings = accepted.settings.clone();
        self.game_started = accepted.is_game_started;
        self.set_status(JoinStatus::Joined);
        self.emit(SessionEvent::LobbyUpdated);

        // Rejoining a running match: the engine restarts and pulls the
        // current state of record through the one-shot sync.
        if accepted.is_game_started {
            if let Some(game_id) = self.selected_game.clone() {
                self.emit(SessionEvent::GameStarted { game_id });
            }
        }
        tracing::info!("joined lobby");
    }

    /// Also the host's way of announcing presence changes: a re-announced
    /// player carries an updated `is_connected`.
    fn handle_player_joined(&mut self, joined: &PlayerJoined) {
        let player = &joined.player;
        let known = self.players.get(player.id()).cloned();
        self.players.upsert(player.clone());

        match known {
            Some(previous) if previous.is_connected() != player.is_connected() => {
                self.emit(SessionEvent::PlayerConnection {
                    logical_id: player.id(),
                    is_connected: player.is_connected(),
                });
            }
            Some(_) => {}
            None => {
                self.emit(SessionEvent::PlayerJoined {
                    player: player.clone(),
                });
            }
        }
    }

    fn handle_player_left(&mut self, left: &PlayerLeft) {
        if self.players.remove(left.logical_id).is_ok() {
            self.emit(SessionEvent::PlayerLeft {
                logical_id: left.logical_id,
            });
        }
    }

    fn handle_player_ready(&mut self, ready: &PlayerReady) {
        if let Some(player) = self.players.get_mut(ready.logical_id) {
            player.set_ready(ready.is_ready);
            self.emit(SessionEvent::PlayerReady {
                logical_id: ready.logical_id,
                is_ready: ready.is_ready,
            });
        }
    }

    fn handle_player_kicked(&mut self, id: PlayerId) {
        if id == self.local {
            self.set_status(JoinStatus::Kicked);
            self.teardown(CloseReason::Kicked);
            return;
        }
        if self.players.remove(id).is_ok() {
            self.emit(SessionEvent::PlayerKicked { logical_id: id });
        }
    }

    fn handle_game_start(&mut self, start: &GameStart) {
        if self.game_started {
            tracing::warn!("repeat game-start ignored");
            return;
        }
        self.game_started = true;
        self.players = Roster::from_players(start.players.clone());
        self.emit(SessionEvent::GameStarted {
            game_id: start.game_id.clone(),
        });
    }

    // Guest user actions

    pub fn set_ready(&mut self, ready: bool) -> Result<(), SessionError> {
        self.ensure_joined()?;
        if let Some(player) = self.players.get_mut(self.local) {
            player.set_ready(ready);
        }
        self.send_to_host(MessageKind::PlayerReady(PlayerReady {
            logical_id: self.local,
            is_ready: ready,
        }));
        self.emit(SessionEvent::PlayerReady {
            logical_id: self.local,
            is_ready: ready,
        });
        Ok(())
    }

    pub fn leave(&mut self) {
        if self.closed {
            return;
        }
        if self.host_peer.is_some() {
            self.send_to_host(MessageKind::PlayerLeft(PlayerLeft {
                logical_id: self.local,
            }));
        }
        self.set_status(JoinStatus::Left);
        self.teardown(CloseReason::LeftLobby);
    }

    // Plumbing

    fn send_to_host(&mut self, kind: MessageKind) {
        if let Some(peer) = self.host_peer {
            self.effects.push(Effect::Send { to: peer, kind });
        }
    }

    fn set_status(&mut self, status: JoinStatus) {
        if self.status != status {
            self.status = status;
            self.emit(SessionEvent::JoinStatus(status));
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        self.effects.push(Effect::Event(event));
    }

    fn teardown(&mut self, reason: CloseReason) {
        self.closed = true;
        self.effects.push(Effect::Teardown(reason));
    }

    fn teardown_quietly(&mut self) {
        self.closed = true;
        let reason = match self.status {
            JoinStatus::Kicked => CloseReason::Kicked,
            JoinStatus::Denied => CloseReason::Denied,
            JoinStatus::Rejected(reason) => CloseReason::Rejected(reason),
            JoinStatus::Left => CloseReason::LeftLobby,
            _ => CloseReason::HostDisconnected,
        };
        self.effects.push(Effect::Teardown(reason));
    }

    fn ensure_joined(&self) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        if self.status != JoinStatus::Joined {
            return Err(SessionError::NotGuest);
        }
        Ok(())
    }
}
