//! Contract between the consensus core and a concrete game.
//!
//! The core never inspects game state: it carries it as an opaque JSON value,
//! asks the adapter whether a proposed move is legal, and applies approved
//! moves through the adapter. Both hooks must be pure and deterministic so
//! that every honest peer computes byte-identical state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Opaque per-game settings as carried in [`crate::domain::LobbySettings`].
pub type GameSettings = HashMap<String, Value>;

/// Static description of a game, used for capacity checks and UI listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
    pub min_players: usize,
    pub max_players: usize,
}

/// Terminal result of a finished match. Player positions are turn-order
/// indexes into the `game-start` roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GameOutcome {
    Win { winner: usize },
    Draw,
}

/// Errors surfaced by the erased game layer.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("malformed game state: {0}")]
    MalformedState(serde_json::Error),

    #[error("malformed move: {0}")]
    MalformedMove(serde_json::Error),

    #[error("state serialization failed: {0}")]
    Serialize(serde_json::Error),
}

/// Typed game contract implemented once per game.
///
/// `validate_move` and `apply_move` must be pure and deterministic;
/// `apply_move` is only ever called on a pair `validate_move` accepted.
pub trait GameAdapter {
    type State: Serialize + DeserializeOwned + Clone + PartialEq;
    type Move: Serialize + DeserializeOwned + Clone;

    fn info(&self) -> GameInfo;

    fn initial_state(&self, player_count: usize, settings: &GameSettings) -> Self::State;

    fn validate_move(&self, state: &Self::State, mv: &Self::Move, proposer: usize) -> bool;

    fn apply_move(&self, state: &Self::State, mv: &Self::Move) -> Self::State;

    /// Terminal result for a state, if the match is over.
    fn outcome(&self, state: &Self::State) -> Option<GameOutcome>;
}

/// Object-safe, JSON-erased view of a game, consumed by the consensus
/// engine. Every [`GameAdapter`] gets this for free via the blanket impl.
pub trait Game {
    fn info(&self) -> GameInfo;

    fn initial_state(&self, player_count: usize, settings: &GameSettings) -> Result<Value, GameError>;

    /// False for illegal moves and for payloads that do not decode.
    fn validate_move(&self, state: &Value, mv: &Value, proposer: usize) -> bool;

    fn apply_move(&self, state: &Value, mv: &Value) -> Result<Value, GameError>;

    fn outcome(&self, state: &Value) -> Option<GameOutcome>;
}

impl<A: GameAdapter> Game for A {
    fn info(&self) -> GameInfo {
        GameAdapter::info(self)
    }

    fn initial_state(&self, player_count: usize, settings: &GameSettings) -> Result<Value, GameError> {
        serde_json::to_value(GameAdapter::initial_state(self, player_count, settings))
            .map_err(GameError::Serialize)
    }

    fn validate_move(&self, state: &Value, mv: &Value, proposer: usize) -> bool {
        let Ok(state) = serde_json::from_value::<A::State>(state.clone()) else {
            return false;
        };
        let Ok(mv) = serde_json::from_value::<A::Move>(mv.clone()) else {
            return false;
        };
        GameAdapter::validate_move(self, &state, &mv, proposer)
    }

    fn apply_move(&self, state: &Value, mv: &Value) -> Result<Value, GameError> {
        let state = serde_json::from_value::<A::State>(state.clone())
            .map_err(GameError::MalformedState)?;
        let mv =
            serde_json::from_value::<A::Move>(mv.clone()).map_err(GameError::MalformedMove)?;
        serde_json::to_value(GameAdapter::apply_move(self, &state, &mv))
            .map_err(GameError::Serialize)
    }

    fn outcome(&self, state: &Value) -> Option<GameOutcome> {
        let state = serde_json::from_value::<A::State>(state.clone()).ok()?;
        GameAdapter::outcome(self, &state)
    }
}
