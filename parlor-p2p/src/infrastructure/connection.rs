use crate::infrastructure::connection_trait::{Connection, ConnectionEvent};
use crate::infrastructure::error::{TransportError, TransportResult};
use crate::peer::PeerId;
use matchbox_socket::{RtcIceServerConfig, WebRtcSocket, WebRtcSocketBuilder};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const PEER_ID_WAIT_MS: u64 = 5_000;

/// WebRTC channel set negotiated through a Matchbox signalling room.
///
/// One reliable ordered datachannel per peer pair. The signalling room is
/// derived from the lobby code, so everyone who knows the code lands in the
/// same mesh; the lobby layer above keeps the star shape by muting peers it
/// does not speak to.
pub struct MatchboxConnection {
    socket: Arc<Mutex<WebRtcSocket>>,
    local_peer_id: Option<PeerId>,
    /// Peers we dropped on purpose; their traffic is discarded.
    muted: HashSet<PeerId>,
}

impl MatchboxConnection {
    /// Connect to a signalling room with default STUN configuration.
    pub async fn connect(room_url: &str) -> TransportResult<Self> {
        Self::connect_with_ice(room_url, RtcIceServerConfig::default()).await
    }

    /// Connect to a signalling room with explicit ICE servers.
    pub async fn connect_with_ice(
        room_url: &str,
        ice: RtcIceServerConfig,
    ) -> TransportResult<Self> {
        if room_url.trim().is_empty() {
            return Err(TransportError::InvalidRoom(room_url.to_string()));
        }

        tracing::info!(room = room_url, "connecting to signalling room");

        let (mut socket, loop_fut) = WebRtcSocketBuilder::new(room_url)
            .ice_server(ice)
            .add_channel(matchbox_socket::ChannelConfig::reliable())
            .build();

        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(async move {
            let _ = loop_fut.await;
        });

        #[cfg(not(target_arch = "wasm32"))]
        tokio::spawn(async move {
            let _ = loop_fut.await;
        });

        let peer_id = wait_for_peer_id(&mut socket).await?;
        tracing::info!(peer = %peer_id, "transport address assigned");

        Ok(MatchboxConnection {
            socket: Arc::new(Mutex::new(socket)),
            local_peer_id: Some(peer_id),
            muted: HashSet::new(),
        })
    }
}

impl Connection for MatchboxConnection {
    fn local_peer_id(&self) -> Option<PeerId> {
        self.local_peer_id
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        let socket = self.socket.lock().unwrap();
        socket
            .connected_peers()
            .map(PeerId::new)
            .filter(|peer| !self.muted.contains(peer))
            .collect()
    }

    fn send_to(&mut self, peer: PeerId, data: Vec<u8>) -> TransportResult<()> {
        if self.muted.contains(&peer) {
            return Err(TransportError::PeerUnavailable(peer.to_string()));
        }

        let mut socket = self.socket.lock().unwrap();
        let channel = socket.channel_mut(0);
        channel.send(data.into_boxed_slice(), peer.inner());
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerId) {
        tracing::debug!(peer = %peer, "muting peer");
        self.muted.insert(peer);
    }

    fn poll_events(&mut self) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        let mut socket = self.socket.lock().unwrap();

        for (peer_id, state) in socket.update_peers() {
            let peer = PeerId::new(peer_id);
            match state {
                matchbox_socket::PeerState::Connected => {
                    if !self.muted.contains(&peer) {
                        tracing::info!(peer = %peer, "peer connected");
                        events.push(ConnectionEvent::PeerConnected(peer));
                    }
                }
                matchbox_socket::PeerState::Disconnected => {
                    self.muted.remove(&peer);
                    tracing::info!(peer = %peer, "peer disconnected");
                    events.push(ConnectionEvent::PeerDisconnected(peer));
                }
            }
        }

        let channel = socket.channel_mut(0);
        for (peer_id, packet) in channel.receive() {
            let peer = PeerId::new(peer_id);
            if self.muted.contains(&peer) {
                continue;
            }
            events.push(ConnectionEvent::MessageReceived {
                from: peer,
                data: packet.to_vec(),
            });
        }

        events
    }
}

/// Wait for the signalling server to hand us a transport address.
async fn wait_for_peer_id(socket: &mut WebRtcSocket) -> TransportResult<PeerId> {
    use instant::Duration;

    let start = instant::Instant::now();
    let deadline = Duration::from_millis(PEER_ID_WAIT_MS);

    loop {
        socket.update_peers();

        if let Some(id) = socket.id() {
            return Ok(PeerId::new(id));
        }

        if start.elapsed() > deadline {
            return Err(TransportError::SignallingTimeout);
        }

        platform_sleep(10).await;
    }
}

#[cfg(target_arch = "wasm32")]
async fn platform_sleep(millis: u32) {
    use gloo_timers::future::TimeoutFuture;
    TimeoutFuture::new(millis).await;
}

#[cfg(not(target_arch = "wasm32"))]
async fn platform_sleep(millis: u32) {
    use instant::Duration;
    tokio::time::sleep(Duration::from_millis(millis as u64)).await;
}
