use parlor_p2p::infrastructure::error::{TransportError, TransportResult};
use parlor_p2p::{Connection, ConnectionEvent, PeerId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

type Inbox = Arc<Mutex<VecDeque<(PeerId, Vec<u8>)>>>;

/// Shared in-memory bus standing in for the signalling server and the
/// datachannel mesh.
pub struct MockNetwork {
    /// Registration order doubles as room-join order: the first peer in the
    /// room is the host.
    order: Vec<PeerId>,
    inboxes: HashMap<PeerId, Inbox>,
    events: VecDeque<(PeerId, ConnectionEvent)>,
    /// Pairs that tore their channel down.
    severed: HashSet<(PeerId, PeerId)>,
}

impl MockNetwork {
    fn pair(a: PeerId, b: PeerId) -> (PeerId, PeerId) {
        if a.0 .0 <= b.0 .0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn is_severed(&self, a: PeerId, b: PeerId) -> bool {
        self.severed.contains(&Self::pair(a, b))
    }
}

pub fn create_mock_network() -> Arc<Mutex<MockNetwork>> {
    Arc::new(Mutex::new(MockNetwork {
        order: Vec::new(),
        inboxes: HashMap::new(),
        events: VecDeque::new(),
        severed: HashSet::new(),
    }))
}

/// One simulated transport endpoint. Clones share the endpoint, so a test
/// can keep a handle to a connection it moved into a session.
#[derive(Clone)]
pub struct MockConnection {
    local: PeerId,
    network: Arc<Mutex<MockNetwork>>,
    inbox: Inbox,
}

impl MockConnection {
    pub fn new(network: Arc<Mutex<MockNetwork>>) -> Self {
        let local = PeerId::random();
        let inbox: Inbox = Arc::new(Mutex::new(VecDeque::new()));

        let mut net = network.lock().unwrap();
        let existing = net.order.clone();
        net.order.push(local);
        net.inboxes.insert(local, inbox.clone());
        for peer in existing {
            net.events
                .push_back((local, ConnectionEvent::PeerConnected(peer)));
            net.events
                .push_back((peer, ConnectionEvent::PeerConnected(local)));
        }
        drop(net);

        Self {
            local,
            network,
            inbox,
        }
    }

    /// Simulate this endpoint vanishing (tab closed, network died).
    pub fn shutdown(&mut self) {
        let mut net = self.network.lock().unwrap();
        let others: Vec<PeerId> = net
            .order
            .iter()
            .copied()
            .filter(|p| *p != self.local)
            .collect();
        for peer in others {
            if !net.is_severed(self.local, peer) {
                let pair = MockNetwork::pair(self.local, peer);
                net.severed.insert(pair);
                net.events
                    .push_back((peer, ConnectionEvent::PeerDisconnected(self.local)));
            }
        }
    }
}

impl Connection for MockConnection {
    fn local_peer_id(&self) -> Option<PeerId> {
        Some(self.local)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let net = self.network.lock().unwrap();
        net.order
            .iter()
            .copied()
            .filter(|p| *p != self.local && !net.is_severed(self.local, *p))
            .collect()
    }

    fn send_to(&mut self, peer: PeerId, data: Vec<u8>) -> TransportResult<()> {
        let net = self.network.lock().unwrap();
        if net.is_severed(self.local, peer) {
            return Err(TransportError::PeerUnavailable(peer.to_string()));
        }
        match net.inboxes.get(&peer) {
            Some(inbox) => {
                inbox.lock().unwrap().push_back((self.local, data));
                Ok(())
            }
            None => Err(TransportError::PeerUnavailable(peer.to_string())),
        }
    }

    fn disconnect(&mut self, peer: PeerId) {
        let mut net = self.network.lock().unwrap();
        if net.is_severed(self.local, peer) {
            return;
        }
        let pair = MockNetwork::pair(self.local, peer);
        net.severed.insert(pair);
        // Both ends observe the close.
        net.events
            .push_back((peer, ConnectionEvent::PeerDisconnected(self.local)));
        net.events
            .push_back((self.local, ConnectionEvent::PeerDisconnected(peer)));
    }

    fn poll_events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();

        let mut net = self.network.lock().unwrap();
        let mut remaining = VecDeque::new();
        for (target, event) in net.events.drain(..) {
            if target == self.local {
                events.push(event);
            } else {
                remaining.push_back((target, event));
            }
        }
        net.events = remaining;
        let severed_with: Vec<PeerId> = net
            .order
            .iter()
            .copied()
            .filter(|p| *p != self.local && net.is_severed(self.local, *p))
            .collect();
        drop(net);

        let mut inbox = self.inbox.lock().unwrap();
        while let Some((from, data)) = inbox.pop_front() {
            if severed_with.contains(&from) {
                continue;
            }
            events.push(ConnectionEvent::MessageReceived { from, data });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_delivery() {
        let network = create_mock_network();
        let mut a = MockConnection::new(network.clone());
        let mut b = MockConnection::new(network.clone());

        a.send_to(b.local_peer_id().unwrap(), b"hello".to_vec())
            .unwrap();
        let events = b.poll_events();

        assert!(events
            .iter()
            .any(|e| matches!(e, ConnectionEvent::PeerConnected(_))));
        assert!(events.iter().any(|e| matches!(
            e,
            ConnectionEvent::MessageReceived { data, .. } if data == b"hello"
        )));
    }

    #[test]
    fn test_disconnect_severs_both_ways() {
        let network = create_mock_network();
        let mut a = MockConnection::new(network.clone());
        let mut b = MockConnection::new(network.clone());
        let b_id = b.local_peer_id().unwrap();

        a.poll_events();
        b.poll_events();

        a.disconnect(b_id);
        assert!(a.send_to(b_id, b"x".to_vec()).is_err());
        assert!(b
            .poll_events()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::PeerDisconnected(_))));
        assert!(!a.connected_peers().contains(&b_id));
    }

    #[test]
    fn test_shutdown_notifies_everyone() {
        let network = create_mock_network();
        let mut a = MockConnection::new(network.clone());
        let mut b = MockConnection::new(network.clone());
        let mut c = MockConnection::new(network.clone());
        a.poll_events();
        b.poll_events();
        c.poll_events();

        a.shutdown();
        assert!(b
            .poll_events()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::PeerDisconnected(_))));
        assert!(c
            .poll_events()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::PeerDisconnected(_))));
    }
}
