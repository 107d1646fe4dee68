use crate::infrastructure::error::TransportError;
use parlor_core::{GameError, MessageError, PlayerError, PlayerId};

/// Failures of user-initiated session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Player(#[from] PlayerError),

    #[error("only the host may do that")]
    NotHost,

    #[error("only a guest may do that")]
    NotGuest,

    #[error("no pending join request for {0}")]
    UnknownPendingRequest(PlayerId),

    #[error("unknown player: {0}")]
    UnknownPlayer(PlayerId),

    #[error("unknown game: {0}")]
    UnknownGame(String),

    #[error("no game selected")]
    NoGameSelected,

    #[error("the game has already started")]
    GameAlreadyStarted,

    #[error("the game has not started")]
    GameNotStarted,

    #[error("not enough players")]
    NotEnoughPlayers,

    #[error("a move is already awaiting approval")]
    MovePending,

    #[error("move is not valid in the current state")]
    InvalidMove,

    #[error("the session is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, SessionError>;
