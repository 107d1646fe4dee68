//! Peer-to-peer lobby and turn consensus for parlor matches.
//!
//! Two tightly-coupled state machines over a reliable datachannel mesh:
//!
//! - the **lobby session manager** keeps a host-centered star of
//!   connections, admits and readmits players under an explicit policy,
//!   issues reconnection tokens and polices every inbound message;
//! - the **turn consensus engine** runs each move through a propose →
//!   validate → unanimous-approve → finalize cycle, with a dual-approval
//!   rule that stops a compromised host from pushing through a move an
//!   honest peer never validated.
//!
//! Everything runs on one logical event loop: construct a
//! [`session::LobbySession`], call `poll` regularly and drain its events.

#[cfg(any(target_arch = "wasm32", feature = "native"))]
pub mod connect;
pub mod consensus;
pub mod error;
pub mod events;
pub mod guard;
pub mod guest;
pub mod host;
pub mod infrastructure;
pub mod peer;
pub mod peer_map;
pub mod session;
pub mod timer;

mod effect;

pub use consensus::{ConsensusEngine, PendingMove};
pub use error::{Result, SessionError};
pub use events::{CloseReason, JoinStatus, SessionEvent};
pub use guard::{InboundGuard, PeerContext, RoleKind, Violation};
pub use guest::GuestLobby;
pub use host::{HostLobby, PendingJoinRequest};
pub use infrastructure::{Connection, ConnectionEvent, TransportError};
pub use peer::PeerId;
pub use session::{GameRegistry, LobbySession};
