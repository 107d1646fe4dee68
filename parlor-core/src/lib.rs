//! Domain layer for parlor: browser-resident peer-to-peer turn-based matches.
//!
//! This crate is networking-free. It holds the data model (players, lobby
//! codes, settings, session tokens), the wire message set, the game adapter
//! contract consumed by the consensus engine, and the small capabilities
//! (session store, clock) that the protocol crates accept at construction.

pub mod domain;
pub mod game;
pub mod games;
pub mod message;
pub mod storage;
pub mod time;

pub use domain::{
    extract_code, normalize_code, CodeError, LobbyCode, LobbySettings, Player, PlayerError,
    PlayerId, Roster, RosterError, SessionToken,
};
pub use game::{Game, GameAdapter, GameError, GameInfo, GameOutcome, GameSettings};
pub use message::{Envelope, MessageError, MessageKind, RejectReason};
pub use storage::{MemoryStore, SessionStore};
pub use time::{Clock, ManualClock, SystemClock};
