//! End-to-end consensus over the mock transport: full matches, the initial
//! sync latch, pass-through traffic, and the dual-approval defense against a
//! fabricating host.

mod support;

use parlor_core::games::TicTacToe;
use parlor_core::message::{Envelope, GameMessage, GameStart, JoinAccepted, MessageKind};
use parlor_core::{
    Game, GameOutcome, LobbyCode, LobbySettings, ManualClock, Player, PlayerId,
};
use parlor_p2p::consensus::{INNER_FINALIZE_MOVE, INNER_SYNC_STATE};
use parlor_p2p::{Connection, ConnectionEvent, GameRegistry, LobbySession, SessionEvent};
use serde_json::{json, Value};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use support::mock_connection::{create_mock_network, MockConnection, MockNetwork};
use support::SharedStore;
use uuid::Uuid;

const NOW: u64 = 1_700_000_000_000;

type Net = Arc<Mutex<MockNetwork>>;
type Session = LobbySession<MockConnection>;

fn registry() -> GameRegistry {
    GameRegistry::new().with(Rc::new(TicTacToe) as Rc<dyn Game>)
}

fn code() -> LobbyCode {
    LobbyCode::parse("ABCD23").unwrap()
}

fn pump(sessions: &mut [&mut Session]) {
    for _ in 0..6 {
        for session in sessions.iter_mut() {
            session.poll();
        }
    }
}

/// Host + guest, joined, tic-tac-toe selected and started.
fn started_table(network: &Net, clock: &ManualClock) -> (Session, Session) {
    let mut host = LobbySession::host(
        MockConnection::new(network.clone()),
        code(),
        "Host".to_string(),
        LobbySettings::default(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    )
    .unwrap();
    let mut guest = LobbySession::join(
        MockConnection::new(network.clone()),
        code(),
        "Guest".to_string(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    );
    pump(&mut [&mut host, &mut guest]);

    host.select_game("tictactoe").unwrap();
    host.start_game().unwrap();
    pump(&mut [&mut host, &mut guest]);
    (host, guest)
}

fn applied_states(events: &[SessionEvent]) -> Vec<&Value> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::MoveApplied { state } => Some(state),
            _ => None,
        })
        .collect()
}

#[test]
fn test_game_start_builds_engines_and_syncs() {
    support::init_tracing();
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);
    let (mut host, mut guest) = started_table(&network, &clock);

    assert!(host.is_game_started());
    assert!(guest.is_game_started());
    assert_eq!(host.game_state(), guest.game_state());

    let guest_events = guest.drain_events();
    assert!(guest_events
        .iter()
        .any(|e| matches!(e, SessionEvent::GameStarted { .. })));
    // The one-shot initial sync came back from the host.
    assert!(guest_events
        .iter()
        .any(|e| matches!(e, SessionEvent::StateSynced)));
    assert!(host
        .drain_events()
        .iter()
        .any(|e| matches!(e, SessionEvent::GameStarted { .. })));
}

#[test]
fn test_single_move_round_trip() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);
    let (mut host, mut guest) = started_table(&network, &clock);
    host.drain_events();
    guest.drain_events();

    // Host is seat 0 and opens.
    host.propose_move(json!({"cell": 4})).unwrap();
    pump(&mut [&mut host, &mut guest]);

    let host_states = host.drain_events();
    let guest_states = guest.drain_events();
    assert_eq!(applied_states(&host_states).len(), 1);
    assert_eq!(applied_states(&guest_states).len(), 1);
    assert_eq!(host.game_state(), guest.game_state());
    assert_eq!(host.game_state().unwrap()["board"][4], json!(0));
    assert!(host.pending_move().is_none());
    assert!(guest.pending_move().is_none());
}

#[test]
fn test_out_of_turn_proposal_is_rejected_locally() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);
    let (_host, mut guest) = started_table(&network, &clock);

    assert!(guest.propose_move(json!({"cell": 0})).is_err());
}

#[test]
fn test_full_match_to_win() {
    support::init_tracing();
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);
    let (mut host, mut guest) = started_table(&network, &clock);
    host.drain_events();
    guest.drain_events();

    // Seat 0 (host) takes the top row; seat 1 (guest) answers in the middle.
    let script: [(bool, u64); 5] = [(true, 0), (false, 3), (true, 1), (false, 4), (true, 2)];
    for (host_moves, cell) in script {
        if host_moves {
            host.propose_move(json!({ "cell": cell })).unwrap();
        } else {
            guest.propose_move(json!({ "cell": cell })).unwrap();
        }
        pump(&mut [&mut host, &mut guest]);
        assert_eq!(host.game_state(), guest.game_state());
    }

    let host_events = host.drain_events();
    let guest_events = guest.drain_events();
    for events in [&host_events, &guest_events] {
        assert!(events.iter().any(|e| matches!(
            e,
            SessionEvent::GameEnded {
                outcome: GameOutcome::Win { winner: 0 }
            }
        )));
    }
    assert_eq!(applied_states(&host_events).len(), 5);
    assert_eq!(applied_states(&guest_events).len(), 5);
}

#[test]
fn test_passthrough_game_message_reaches_host() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);
    let (mut host, mut guest) = started_table(&network, &clock);
    host.drain_events();

    guest
        .send_game_message("forfeit", json!({"reason": "rage"}))
        .unwrap();
    pump(&mut [&mut host, &mut guest]);

    let guest_id = guest.local_id();
    assert!(host.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::GameMessage { inner_type, sender, .. }
            if inner_type == "forfeit" && *sender == Some(guest_id)
    )));
}

/// Scenario: a compromised host fabricates a finalize for a move the honest
/// guest never saw proposed. The guest's dual-approval check refuses it.
#[test]
fn test_fabricated_finalize_from_host_is_refused() {
    support::init_tracing();
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);

    // The "host" here is a bare transport endpoint the test drives by hand.
    let mut evil = MockConnection::new(network.clone());
    let evil_id = PlayerId::random();

    let mut guest = LobbySession::join(
        MockConnection::new(network.clone()),
        code(),
        "B".to_string(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    );
    pump_one(&mut guest);

    // Absorb the join-request, then script a normal-looking admission.
    let guest_peer = wait_for_join_request(&mut evil);
    let roster = vec![
        Player::new_host(evil_id, "Evil".to_string()).unwrap(),
        Player::new_guest(guest.local_id(), "B".to_string()).unwrap(),
    ];
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::JoinAccepted(JoinAccepted {
            players: roster.clone(),
            selected_game: Some("tictactoe".to_string()),
            settings: LobbySettings::default(),
            is_game_started: false,
            session_token: None,
        }),
    );
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::GameStart(GameStart {
            game_id: "tictactoe".to_string(),
            players: roster,
        }),
    );
    pump_one(&mut guest);
    assert!(guest.is_game_started());
    let clean_state = guest.game_state().unwrap().clone();
    guest.drain_events();

    // No propose-move ever arrives; the finalize is fabricated outright.
    let fabricated = Uuid::new_v4();
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::GameMessage(GameMessage {
            inner_type: INNER_FINALIZE_MOVE.to_string(),
            data: json!({ "move_id": fabricated }),
            sender_id: Some(evil_id),
        }),
    );
    pump_one(&mut guest);

    assert_eq!(guest.game_state(), Some(&clean_state));
    assert!(guest.pending_move().is_none());
    assert!(guest.drain_events().iter().any(|e| matches!(
        e,
        SessionEvent::FinalizeRefused { move_id } if *move_id == fabricated
    )));
}

/// A second sync-state cannot overwrite mid-game state.
#[test]
fn test_second_sync_state_is_refused() {
    let network = create_mock_network();
    let clock = ManualClock::new(NOW);

    let mut evil = MockConnection::new(network.clone());
    let evil_id = PlayerId::random();
    let mut guest = LobbySession::join(
        MockConnection::new(network.clone()),
        code(),
        "B".to_string(),
        registry(),
        Box::new(SharedStore::new()),
        Box::new(clock.clone()),
    );
    pump_one(&mut guest);

    let guest_peer = wait_for_join_request(&mut evil);
    let roster = vec![
        Player::new_host(evil_id, "Evil".to_string()).unwrap(),
        Player::new_guest(guest.local_id(), "B".to_string()).unwrap(),
    ];
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::JoinAccepted(JoinAccepted {
            players: roster.clone(),
            selected_game: Some("tictactoe".to_string()),
            settings: LobbySettings::default(),
            is_game_started: false,
            session_token: None,
        }),
    );
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::GameStart(GameStart {
            game_id: "tictactoe".to_string(),
            players: roster,
        }),
    );
    pump_one(&mut guest);

    // First sync is accepted.
    let synced = json!({"board": [0, null, null, null, null, null, null, null, null], "next_player": 1});
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::GameMessage(GameMessage {
            inner_type: INNER_SYNC_STATE.to_string(),
            data: json!({ "game_state": synced }),
            sender_id: Some(evil_id),
        }),
    );
    pump_one(&mut guest);
    assert_eq!(guest.game_state(), Some(&synced));

    // Second sync is a no-op.
    let overwrite = json!({"board": [1, 1, 1, null, null, null, null, null, null], "next_player": 0});
    send(
        &mut evil,
        guest_peer,
        evil_id,
        MessageKind::GameMessage(GameMessage {
            inner_type: INNER_SYNC_STATE.to_string(),
            data: json!({ "game_state": overwrite }),
            sender_id: Some(evil_id),
        }),
    );
    pump_one(&mut guest);
    assert_eq!(guest.game_state(), Some(&synced));
}

fn pump_one(session: &mut Session) {
    for _ in 0..6 {
        session.poll();
    }
}

/// Drain the scripted host's endpoint until the guest's join-request shows
/// up, returning the guest's transport address.
fn wait_for_join_request(evil: &mut MockConnection) -> parlor_p2p::PeerId {
    for _ in 0..10 {
        for event in evil.poll_events() {
            if let ConnectionEvent::MessageReceived { from, data } = event {
                let envelope = Envelope::decode(&data).unwrap();
                if matches!(envelope.kind, MessageKind::JoinRequest(_)) {
                    return from;
                }
            }
        }
    }
    panic!("guest never sent a join-request");
}

fn send(evil: &mut MockConnection, to: parlor_p2p::PeerId, sender: PlayerId, kind: MessageKind) {
    let envelope = Envelope::new(kind, sender, NOW);
    evil.send_to(to, envelope.encode().unwrap()).unwrap();
}
