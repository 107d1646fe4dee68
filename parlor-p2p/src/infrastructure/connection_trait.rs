use crate::infrastructure::error::TransportResult;
use crate::peer::PeerId;

/// Raw events surfaced by a connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    MessageReceived { from: PeerId, data: Vec<u8> },
}

/// A reliable, ordered, message-framed channel set (allows mocking in tests).
///
/// Ordering is guaranteed per peer pair only; the protocol above tolerates
/// arbitrary interleaving across pairs.
pub trait Connection {
    fn local_peer_id(&self) -> Option<PeerId>;
    fn connected_peers(&self) -> Vec<PeerId>;
    fn send_to(&mut self, peer: PeerId, data: Vec<u8>) -> TransportResult<()>;
    /// Stop exchanging data with one peer; the rest of the mesh stays up.
    fn disconnect(&mut self, peer: PeerId);
    fn poll_events(&mut self) -> Vec<ConnectionEvent>;
}
