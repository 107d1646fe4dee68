use crate::peer::PeerId;
use parlor_core::PlayerId;
use std::collections::HashMap;

/// 1:1 mapping between transport addresses and logical ids.
///
/// Owner-of-record for identity on the host side: a connection with no entry
/// here is anonymous, and a logical id is bound to at most one current
/// connection. Registering either side again replaces the old binding.
#[derive(Debug, Default, Clone)]
pub struct PeerMap {
    peer_to_player: HashMap<PeerId, PlayerId>,
    player_to_peer: HashMap<PlayerId, PeerId>,
}

impl PeerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, peer: PeerId, player: PlayerId) {
        if let Some(old_player) = self.peer_to_player.get(&peer) {
            self.player_to_peer.remove(old_player);
        }
        if let Some(old_peer) = self.player_to_peer.get(&player) {
            self.peer_to_player.remove(old_peer);
        }
        self.peer_to_player.insert(peer, player);
        self.player_to_peer.insert(player, peer);
    }

    pub fn remove_by_peer(&mut self, peer: PeerId) -> Option<PlayerId> {
        let player = self.peer_to_player.remove(&peer)?;
        self.player_to_peer.remove(&player);
        Some(player)
    }

    pub fn remove_by_player(&mut self, player: PlayerId) -> Option<PeerId> {
        let peer = self.player_to_peer.remove(&player)?;
        self.peer_to_player.remove(&peer);
        Some(peer)
    }

    pub fn player_for(&self, peer: PeerId) -> Option<PlayerId> {
        self.peer_to_player.get(&peer).copied()
    }

    pub fn peer_for(&self, player: PlayerId) -> Option<PeerId> {
        self.player_to_peer.get(&player).copied()
    }

    pub fn contains_peer(&self, peer: PeerId) -> bool {
        self.peer_to_player.contains_key(&peer)
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.peer_to_player.len(), self.player_to_peer.len());
        self.peer_to_player.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peer_to_player.is_empty()
    }

    pub fn clear(&mut self) {
        self.peer_to_player.clear();
        self.player_to_peer.clear();
    }
}
