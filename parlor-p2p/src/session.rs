//! Session facade.
//!
//! One `LobbySession` per participant. It owns the transport, the inbound
//! guard, the role state machine and (once a game starts) the consensus
//! engine, and pumps them from a single `poll` loop: connection events in,
//! effects out, UI events drained by the embedder. Handlers never block and
//! nothing here spawns tasks; timing comes from the injected clock.

use crate::consensus::ConsensusEngine;
use crate::effect::Effect;
use crate::error::{Result, SessionError};
use crate::events::{CloseReason, JoinStatus, SessionEvent};
use crate::guard::InboundGuard;
use crate::guest::GuestLobby;
use crate::host::{HostLobby, PendingJoinRequest};
use crate::infrastructure::connection_trait::{Connection, ConnectionEvent};
use crate::peer::PeerId;
use parlor_core::game::Game;
use parlor_core::message::{Envelope, GameMessage, MessageKind};
use parlor_core::storage::keys;
use parlor_core::{
    Clock, GameInfo, LobbyCode, LobbySettings, PlayerId, Roster, SessionStore,
};
use serde_json::Value;
use std::collections::HashMap;
use std::rc::Rc;
use uuid::Uuid;

/// The games this session can host or play, keyed by game id.
#[derive(Default)]
pub struct GameRegistry {
    games: HashMap<String, Rc<dyn Game>>,
}

impl GameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, game: Rc<dyn Game>) {
        self.games.insert(game.info().id.clone(), game);
    }

    pub fn with(mut self, game: Rc<dyn Game>) -> Self {
        self.register(game);
        self
    }

    pub fn get(&self, game_id: &str) -> Option<Rc<dyn Game>> {
        self.games.get(game_id).cloned()
    }

    pub fn info(&self, game_id: &str) -> Option<GameInfo> {
        self.games.get(game_id).map(|game| game.info())
    }
}

enum Role {
    Host(HostLobby),
    Guest(GuestLobby),
}

pub struct LobbySession<C: Connection> {
    connection: C,
    clock: Box<dyn Clock>,
    games: GameRegistry,
    guard: InboundGuard,
    role: Role,
    engine: Option<ConsensusEngine>,
    events: Vec<SessionEvent>,
    closed: Option<CloseReason>,
}

impl<C: Connection> LobbySession<C> {
    /// Open a lobby as its host.
    pub fn host(
        connection: C,
        code: LobbyCode,
        display_name: String,
        settings: LobbySettings,
        games: GameRegistry,
        mut store: Box<dyn SessionStore>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let local = resolve_identity(store.as_mut(), &display_name);
        let host = HostLobby::new(code, local, display_name, settings)?;
        Ok(Self {
            connection,
            clock,
            games,
            guard: InboundGuard::new(),
            role: Role::Host(host),
            engine: None,
            events: Vec::new(),
            closed: None,
        })
    }

    /// Join an existing lobby as a guest.
    pub fn join(
        connection: C,
        code: LobbyCode,
        display_name: String,
        games: GameRegistry,
        store: Box<dyn SessionStore>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let guest = GuestLobby::new(code, display_name, store);
        Self {
            connection,
            clock,
            games,
            guard: InboundGuard::new(),
            role: Role::Guest(guest),
            engine: None,
            events: Vec::new(),
            closed: None,
        }
    }

    // Views

    pub fn is_host(&self) -> bool {
        matches!(self.role, Role::Host(_))
    }

    pub fn local_id(&self) -> PlayerId {
        match &self.role {
            Role::Host(host) => host.local_id(),
            Role::Guest(guest) => guest.local_id(),
        }
    }

    pub fn code(&self) -> &LobbyCode {
        match &self.role {
            Role::Host(host) => host.code(),
            Role::Guest(guest) => guest.code(),
        }
    }

    pub fn players(&self) -> &Roster {
        match &self.role {
            Role::Host(host) => host.players(),
            Role::Guest(guest) => guest.players(),
        }
    }

    pub fn settings(&self) -> &LobbySettings {
        match &self.role {
            Role::Host(host) => host.settings(),
            Role::Guest(guest) => guest.settings(),
        }
    }

    pub fn is_game_started(&self) -> bool {
        match &self.role {
            Role::Host(host) => host.is_game_started(),
            Role::Guest(guest) => guest.is_game_started(),
        }
    }

    /// Guest only: where the join attempt stands.
    pub fn join_status(&self) -> Option<JoinStatus> {
        match &self.role {
            Role::Host(_) => None,
            Role::Guest(guest) => Some(guest.status()),
        }
    }

    /// Host only: joiners awaiting a verdict.
    pub fn pending_requests(&self) -> &[PendingJoinRequest] {
        match &self.role {
            Role::Host(host) => host.pending_requests(),
            Role::Guest(_) => &[],
        }
    }

    pub fn game_state(&self) -> Option<&Value> {
        self.engine.as_ref().map(|engine| engine.state())
    }

    pub fn pending_move(&self) -> Option<&crate::consensus::PendingMove> {
        self.engine.as_ref().and_then(|engine| engine.pending_move())
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.closed.as_ref()
    }

    /// Everything that happened since the last drain, in order.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    // Event loop

    /// Pump the transport and every deadline. Call regularly (every frame or
    /// on a short interval timer).
    pub fn poll(&mut self) {
        if self.closed.is_some() {
            return;
        }
        let now = self.clock.now_millis();

        for event in self.connection.poll_events() {
            if self.closed.is_some() {
                break;
            }
            match event {
                ConnectionEvent::PeerConnected(peer) => self.on_peer_connected(peer),
                ConnectionEvent::PeerDisconnected(peer) => self.on_peer_disconnected(peer, now),
                ConnectionEvent::MessageReceived { from, data } => {
                    self.on_message(from, &data, now)
                }
            }
        }

        if self.closed.is_none() {
            if let Role::Host(host) = &mut self.role {
                host.tick(now);
            }
            self.pump_effects(now);
        }
    }

    fn on_peer_connected(&mut self, peer: PeerId) {
        match &mut self.role {
            // The host waits for a join-request before the connection means
            // anything.
            Role::Host(_) => {}
            Role::Guest(guest) => guest.host_connected(peer),
        }
        self.pump_effects(self.clock.now_millis());
    }

    fn on_peer_disconnected(&mut self, peer: PeerId, now: u64) {
        self.guard.forget(peer);
        match &mut self.role {
            Role::Host(host) => host.peer_closed(peer, now),
            Role::Guest(guest) => {
                if guest.host_peer() == Some(peer) {
                    guest.host_closed();
                }
            }
        }
        self.pump_effects(now);
    }

    fn on_message(&mut self, from: PeerId, data: &[u8], now: u64) {
        let ctx = match &self.role {
            Role::Host(host) => host.peer_context(from),
            Role::Guest(guest) => guest.peer_context(from),
        };

        let envelope = match self.guard.check(from, data, &ctx, now) {
            Ok(envelope) => envelope,
            Err(violation) => {
                tracing::warn!(peer = %from, %violation, "message dropped");
                return;
            }
        };

        self.dispatch(from, envelope, now);
        self.pump_effects(now);
    }

    fn dispatch(&mut self, from: PeerId, envelope: Envelope, now: u64) {
        if let MessageKind::GameMessage(message) = &envelope.kind {
            match &mut self.engine {
                Some(engine) => engine.handle_message(envelope.sender_id, message),
                None => {
                    tracing::debug!(
                        inner = message.inner_type,
                        "game message before game start dropped"
                    );
                }
            }
            return;
        }

        match &mut self.role {
            Role::Host(host) => host.handle_message(from, &envelope.kind, now),
            Role::Guest(guest) => guest.handle_message(&envelope.kind),
        }
    }

    // User actions

    pub fn set_ready(&mut self, ready: bool) -> Result<()> {
        self.ensure_open()?;
        match &mut self.role {
            Role::Host(host) => host.set_ready(ready)?,
            Role::Guest(guest) => guest.set_ready(ready)?,
        }
        self.pump_effects(self.clock.now_millis());
        Ok(())
    }

    pub fn update_settings(&mut self, settings: LobbySettings) -> Result<()> {
        self.ensure_open()?;
        self.as_host_mut()?.update_settings(settings)?;
        self.pump_effects(self.clock.now_millis());
        Ok(())
    }

    pub fn select_game(&mut self, game_id: &str) -> Result<()> {
        self.ensure_open()?;
        let info = self
            .games
            .info(game_id)
            .ok_or_else(|| SessionError::UnknownGame(game_id.to_string()))?;
        self.as_host_mut()?.select_game(info)?;
        self.pump_effects(self.clock.now_millis());
        Ok(())
    }

    pub fn start_game(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.as_host_mut()?.start_game()?;
        self.pump_effects(self.clock.now_millis());
        Ok(())
    }

    pub fn approve(&mut self, id: PlayerId) -> Result<()> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        self.as_host_mut()?.approve(id, now)?;
        self.pump_effects(now);
        Ok(())
    }

    pub fn deny(&mut self, id: PlayerId) -> Result<()> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        self.as_host_mut()?.deny(id, now)?;
        self.pump_effects(now);
        Ok(())
    }

    pub fn kick(&mut self, id: PlayerId) -> Result<()> {
        self.ensure_open()?;
        let now = self.clock.now_millis();
        self.as_host_mut()?.kick(id, now)?;
        self.pump_effects(now);
        Ok(())
    }

    /// Originate a move for the running game.
    pub fn propose_move(&mut self, mv: Value) -> Result<Uuid> {
        self.ensure_open()?;
        let engine = self.engine.as_mut().ok_or(SessionError::GameNotStarted)?;
        let move_id = engine.propose(mv)?;
        self.pump_effects(self.clock.now_millis());
        Ok(move_id)
    }

    /// Send game traffic the engine does not interpret (announcements,
    /// forfeits). Guests route through the host, which relays.
    pub fn send_game_message(&mut self, inner_type: &str, data: Value) -> Result<()> {
        self.ensure_open()?;
        let message = GameMessage {
            inner_type: inner_type.to_string(),
            data,
            sender_id: Some(self.local_id()),
        };
        let now = self.clock.now_millis();
        let targets: Vec<PeerId> = match &self.role {
            Role::Host(host) => host.connected_guest_peers(None),
            Role::Guest(guest) => guest.host_peer().into_iter().collect(),
        };
        for peer in targets {
            self.send(peer, MessageKind::GameMessage(message.clone()), now);
        }
        Ok(())
    }

    /// Leave the lobby. For the host this ends the lobby for everyone.
    pub fn leave(&mut self) {
        if self.closed.is_some() {
            return;
        }
        match &mut self.role {
            Role::Host(host) => host.leave(),
            Role::Guest(guest) => guest.leave(),
        }
        self.pump_effects(self.clock.now_millis());
    }

    // Effect plumbing

    fn pump_effects(&mut self, now: u64) {
        loop {
            let mut effects = match &mut self.role {
                Role::Host(host) => host.take_effects(),
                Role::Guest(guest) => guest.take_effects(),
            };

            let game_effects = match &mut self.engine {
                Some(engine) => engine.take_effects(),
                None => Vec::new(),
            };
            if !game_effects.is_empty() {
                let converted = self.convert_game_effects(game_effects);
                effects.extend(converted);
            }

            if effects.is_empty() {
                break;
            }
            for effect in effects {
                if self.closed.is_some() {
                    break;
                }
                self.apply_effect(effect, now);
            }
            if self.closed.is_some() {
                break;
            }
        }
    }

    fn convert_game_effects(
        &self,
        game_effects: Vec<crate::consensus::GameEffect>,
    ) -> Vec<Effect> {
        use crate::consensus::GameEffect;

        let mut effects = Vec::new();
        for game_effect in game_effects {
            match game_effect {
                GameEffect::Event(event) => effects.push(Effect::Event(event)),
                GameEffect::ToHost(message) => {
                    if let Role::Guest(guest) = &self.role {
                        if let Some(peer) = guest.host_peer() {
                            effects.push(Effect::Send {
                                to: peer,
                                kind: MessageKind::GameMessage(message),
                            });
                        }
                    }
                }
                GameEffect::ToPlayer(player, message) => {
                    if let Role::Host(host) = &self.role {
                        if let Some(peer) = host.peer_for(player) {
                            effects.push(Effect::Send {
                                to: peer,
                                kind: MessageKind::GameMessage(message),
                            });
                        }
                    }
                }
                GameEffect::BroadcastExcept(except, message) => {
                    if let Role::Host(host) = &self.role {
                        for peer in host.connected_guest_peers(except) {
                            effects.push(Effect::Send {
                                to: peer,
                                kind: MessageKind::GameMessage(message.clone()),
                            });
                        }
                    }
                }
            }
        }
        effects
    }

    fn apply_effect(&mut self, effect: Effect, now: u64) {
        match effect {
            Effect::Send { to, kind } => self.send(to, kind, now),
            Effect::Close { peer } => {
                self.guard.forget(peer);
                self.connection.disconnect(peer);
            }
            Effect::Event(event) => self.handle_event(event),
            Effect::Teardown(reason) => self.teardown(reason),
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match &event {
            SessionEvent::GameStarted { game_id } => self.build_engine(game_id.clone()),
            SessionEvent::PlayerConnection {
                logical_id,
                is_connected,
            } => {
                if let Some(engine) = &mut self.engine {
                    engine.set_connected(*logical_id, *is_connected);
                }
            }
            SessionEvent::PlayerLeft { logical_id }
            | SessionEvent::PlayerKicked { logical_id } => {
                if let Some(engine) = &mut self.engine {
                    engine.set_connected(*logical_id, false);
                }
            }
            _ => {}
        }
        self.events.push(event);
    }

    fn build_engine(&mut self, game_id: String) {
        if self.engine.is_some() {
            return;
        }
        let Some(game) = self.games.get(&game_id) else {
            tracing::error!(game = game_id, "game-start for a game this build lacks");
            return;
        };

        let turn_order: Vec<PlayerId> = self.players().ids().collect();
        let game_settings = self
            .settings()
            .for_game(&game_id)
            .cloned()
            .unwrap_or_default();
        let local = self.local_id();

        let engine = match &self.role {
            Role::Host(_) => ConsensusEngine::new_host(game, local, turn_order, &game_settings),
            Role::Guest(_) => ConsensusEngine::new_guest(game, local, turn_order, &game_settings),
        };
        match engine {
            Ok(mut engine) => {
                for player in self.players().iter().filter(|p| !p.is_connected()) {
                    engine.set_connected(player.id(), false);
                }
                if !self.is_host() {
                    engine.request_initial_state();
                }
                self.engine = Some(engine);
            }
            Err(err) => {
                tracing::error!(game = game_id, %err, "initial state construction failed");
            }
        }
    }

    fn send(&mut self, to: PeerId, kind: MessageKind, now: u64) {
        let envelope = Envelope::new(kind, self.local_id(), now);
        let bytes = match envelope.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(%err, "outbound message failed to encode");
                return;
            }
        };
        if let Err(err) = self.connection.send_to(to, bytes) {
            tracing::warn!(peer = %to, %err, "send failed");
        }
    }

    /// Idempotent: releases connections, timers and maps, then reports once.
    fn teardown(&mut self, reason: CloseReason) {
        if self.closed.is_some() {
            return;
        }
        for peer in self.connection.connected_peers() {
            self.connection.disconnect(peer);
        }
        self.engine = None;
        self.closed = Some(reason.clone());
        self.events.push(SessionEvent::Closed { reason });
        tracing::info!("session closed");
    }

    fn as_host_mut(&mut self) -> Result<&mut HostLobby> {
        match &mut self.role {
            Role::Host(host) => Ok(host),
            Role::Guest(_) => Err(SessionError::NotHost),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.is_some() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }
}

/// Load the persisted logical id, minting and storing one the first time.
fn resolve_identity(store: &mut dyn SessionStore, display_name: &str) -> PlayerId {
    let local = store
        .get(keys::PLAYER_ID)
        .and_then(|raw| PlayerId::parse(&raw).ok())
        .unwrap_or_else(|| {
            let id = PlayerId::random();
            store.set(keys::PLAYER_ID, &id.to_string());
            id
        });
    store.set(keys::DISPLAY_NAME, display_name);
    local
}
