use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable logical identity of a participant.
///
/// Survives transport reconnects within a browser session; distinct from the
/// transport-layer peer address, which may change on every reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generate a fresh logical id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id previously persisted in the session store.
    pub fn parse(input: &str) -> Result<Self, PlayerError> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|_| PlayerError::InvalidId(input.to_string()))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors produced when constructing players.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PlayerError {
    #[error("display name cannot be empty")]
    EmptyName,

    #[error("display name must be at most 50 characters")]
    NameTooLong,

    #[error("not a valid player id: {0}")]
    InvalidId(String),
}

/// A participant as seen by the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    logical_id: PlayerId,
    display_name: String,
    is_host: bool,
    is_ready: bool,
    is_connected: bool,
}

impl Player {
    /// Create a host entry. Hosts are connected and ready from the start.
    pub fn new_host(logical_id: PlayerId, display_name: String) -> Result<Self, PlayerError> {
        Self::validate_name(&display_name)?;
        Ok(Player {
            logical_id,
            display_name,
            is_host: true,
            is_ready: true,
            is_connected: true,
        })
    }

    /// Create a freshly admitted guest entry.
    pub fn new_guest(logical_id: PlayerId, display_name: String) -> Result<Self, PlayerError> {
        Self::validate_name(&display_name)?;
        Ok(Player {
            logical_id,
            display_name,
            is_host: false,
            is_ready: false,
            is_connected: true,
        })
    }

    fn validate_name(name: &str) -> Result<(), PlayerError> {
        if name.is_empty() {
            return Err(PlayerError::EmptyName);
        }
        if name.chars().count() > 50 {
            return Err(PlayerError::NameTooLong);
        }
        Ok(())
    }

    pub fn id(&self) -> PlayerId {
        self.logical_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.is_ready = ready;
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.is_connected = connected;
    }
}

/// Errors produced by roster mutations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RosterError {
    #[error("player already present: {0}")]
    Duplicate(PlayerId),

    #[error("player not found: {0}")]
    NotFound(PlayerId),
}

/// Ordered collection of players.
///
/// Insertion order is the turn order; it never changes while a player stays
/// in the roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roster {
    players: Vec<Player>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from an already-ordered list, e.g. a `game-start` payload.
    pub fn from_players(players: Vec<Player>) -> Self {
        Self { players }
    }

    /// Append a player, preserving insertion order.
    pub fn add(&mut self, player: Player) -> Result<(), RosterError> {
        if self.contains(player.id()) {
            return Err(RosterError::Duplicate(player.id()));
        }
        self.players.push(player);
        Ok(())
    }

    /// Insert or replace the entry with the same id, keeping its position.
    pub fn upsert(&mut self, player: Player) {
        match self.players.iter_mut().find(|p| p.id() == player.id()) {
            Some(slot) => *slot = player,
            None => self.players.push(player),
        }
    }

    pub fn remove(&mut self, id: PlayerId) -> Result<Player, RosterError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id() == id)
            .ok_or(RosterError::NotFound(id))?;
        Ok(self.players.remove(index))
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id() == id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id() == id)
    }

    /// Turn-order index of a player.
    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id() == id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id() == id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.players.iter().map(|p| p.id())
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_connected()).count()
    }

    pub fn to_vec(&self) -> Vec<Player> {
        self.players.clone()
    }
}
