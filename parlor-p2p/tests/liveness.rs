//! Reconnection windows and liveness teardown over the mock transport.

mod support;

use parlor_core::games::TicTacToe;
use parlor_core::{Game, LobbyCode, LobbySettings, ManualClock};
use parlor_p2p::host::RECONNECT_WINDOW_MS;
use parlor_p2p::{CloseReason, GameRegistry, LobbySession, SessionEvent};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use support::mock_connection::{create_mock_network, MockConnection, MockNetwork};
use support::SharedStore;

const NOW: u64 = 1_700_000_000_000;

type Net = Arc<Mutex<MockNetwork>>;
type Session = LobbySession<MockConnection>;

fn registry() -> GameRegistry {
    GameRegistry::new().with(Rc::new(TicTacToe) as Rc<dyn Game>)
}

fn pump(sessions: &mut [&mut Session]) {
    for _ in 0..6 {
        for session in sessions.iter_mut() {
            session.poll();
        }
    }
}

fn host_session(network: &Net, clock: &ManualClock) -> Session {
    LobbySession::host(
        MockConnection::new(network.clone()),
        LobbyCode::parse("ABCD23").unwrap(),
        "A".to_string(),
        LobbySettings::default(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    )
    .unwrap()
}

fn guest_with_handle(
    network: &Net,
    clock: &ManualClock,
    name: &str,
) -> (Session, MockConnection) {
    let connection = MockConnection::new(network.clone());
    let session = LobbySession::join(
        connection.clone(),
        LobbyCode::parse("ABCD23").unwrap(),
        name.to_string(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    );
    (session, connection)
}

/// Scenario: mid-game two-player lobby, the guest's transport dies and the
/// reconnect window runs out. The lobby cannot continue with one player.
#[test]
fn test_mid_game_disconnect_tears_down() {
    support::init_tracing();
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);

    let mut host = host_session(&network, &clock);
    let (mut guest, mut guest_handle) = guest_with_handle(&network, &clock, "B");
    pump(&mut [&mut host, &mut guest]);
    let guest_id = guest.local_id();

    host.select_game("tictactoe").unwrap();
    host.start_game().unwrap();
    pump(&mut [&mut host, &mut guest]);
    host.drain_events();

    guest_handle.shutdown();
    host.poll();
    assert!(host
        .drain_events()
        .contains(&SessionEvent::PlayerConnection {
            logical_id: guest_id,
            is_connected: false,
        }));

    clock.advance(RECONNECT_WINDOW_MS);
    host.poll();
    let events = host.drain_events();

    assert!(!host.players().contains(guest_id));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::PlayerLeft { logical_id } if *logical_id == guest_id
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Closed {
            reason: CloseReason::NotEnoughPlayers
        }
    )));
    assert_eq!(host.close_reason(), Some(&CloseReason::NotEnoughPlayers));
}

/// Outside a game the same expiry only removes the player.
#[test]
fn test_lobby_disconnect_removes_without_teardown() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);

    let mut host = host_session(&network, &clock);
    let (mut guest, mut guest_handle) = guest_with_handle(&network, &clock, "B");
    let (mut other, _other_handle) = guest_with_handle(&network, &clock, "C");
    pump(&mut [&mut host, &mut guest, &mut other]);
    let guest_id = guest.local_id();
    other.drain_events();

    guest_handle.shutdown();
    pump(&mut [&mut host, &mut other]);

    // The survivor hears about the disconnect before the removal.
    assert!(other
        .drain_events()
        .contains(&SessionEvent::PlayerConnection {
            logical_id: guest_id,
            is_connected: false,
        }));

    clock.advance(RECONNECT_WINDOW_MS);
    pump(&mut [&mut host, &mut other]);

    assert!(host.close_reason().is_none());
    assert!(!host.players().contains(guest_id));
    assert!(!other.players().contains(guest_id));
    assert!(other.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::PlayerLeft { logical_id } if *logical_id == guest_id
    )));
}

/// A guest that returns inside the window keeps the lobby alive mid-game.
#[test]
fn test_return_inside_window_keeps_game_alive() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);

    let mut host = host_session(&network, &clock);
    let store = SharedStore::new();
    let connection = MockConnection::new(network.clone());
    let mut guest = LobbySession::join(
        connection.clone(),
        LobbyCode::parse("ABCD23").unwrap(),
        "B".to_string(),
        registry(),
        Box::new(store.clone()),
        Box::new(clock.clone()),
    );
    pump(&mut [&mut host, &mut guest]);
    let guest_id = guest.local_id();

    host.select_game("tictactoe").unwrap();
    host.start_game().unwrap();
    pump(&mut [&mut host, &mut guest]);

    let mut dead = connection;
    dead.shutdown();
    host.poll();

    clock.advance(RECONNECT_WINDOW_MS - 1_000);
    let mut returned = LobbySession::join(
        MockConnection::new(network.clone()),
        LobbyCode::parse("ABCD23").unwrap(),
        "B".to_string(),
        registry(),
        Box::new(store),
        Box::new(clock.clone()),
    );
    pump(&mut [&mut host, &mut returned]);

    assert!(host.close_reason().is_none());
    assert!(host.players().get(guest_id).unwrap().is_connected());

    clock.advance(RECONNECT_WINDOW_MS + 1);
    pump(&mut [&mut host, &mut returned]);
    assert!(host.close_reason().is_none());
    assert!(host.players().contains(guest_id));
}
