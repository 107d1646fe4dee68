use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Re-export the underlying matchbox type
pub use matchbox_socket::PeerId as MatchboxPeerId;

/// Transport-layer address of a peer.
///
/// Changes on every reconnect; never identity. The lobby keeps the explicit
/// mapping from this to the stable logical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub MatchboxPeerId);

impl PeerId {
    pub fn new(id: MatchboxPeerId) -> Self {
        Self(id)
    }

    /// Fresh synthetic address, used by mock transports in tests.
    pub fn random() -> Self {
        Self(MatchboxPeerId(Uuid::new_v4()))
    }

    pub fn inner(&self) -> MatchboxPeerId {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MatchboxPeerId> for PeerId {
    fn from(id: MatchboxPeerId) -> Self {
        Self(id)
    }
}
