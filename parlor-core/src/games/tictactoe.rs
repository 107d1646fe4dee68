use crate::game::{GameAdapter, GameInfo, GameOutcome, GameSettings};
use serde::{Deserialize, Serialize};

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Two-player tic-tac-toe on a 3x3 board.
pub struct TicTacToe;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicTacToeState {
    /// Cell owner by turn-order index, row-major.
    pub board: Vec<Option<usize>>,
    /// Whose turn it is next.
    pub next_player: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TicTacToeMove {
    pub cell: usize,
}

impl GameAdapter for TicTacToe {
    type State = TicTacToeState;
    type Move = TicTacToeMove;

    fn info(&self) -> GameInfo {
        GameInfo {
            id: "tictactoe".to_string(),
            name: "Tic-Tac-Toe".to_string(),
            min_players: 2,
            max_players: 2,
        }
    }

    fn initial_state(&self, _player_count: usize, _settings: &GameSettings) -> TicTacToeState {
        TicTacToeState {
            board: vec![None; 9],
            next_player: 0,
        }
    }

    fn validate_move(&self, state: &TicTacToeState, mv: &TicTacToeMove, proposer: usize) -> bool {
        proposer == state.next_player
            && mv.cell < 9
            && state.board[mv.cell].is_none()
            && self.outcome(state).is_none()
    }

    fn apply_move(&self, state: &TicTacToeState, mv: &TicTacToeMove) -> TicTacToeState {
        let mut next = state.clone();
        next.board[mv.cell] = Some(state.next_player);
        next.next_player = 1 - state.next_player;
        next
    }

    fn outcome(&self, state: &TicTacToeState) -> Option<GameOutcome> {
        for line in LINES {
            if let Some(owner) = state.board[line[0]] {
                if line.iter().all(|&cell| state.board[cell] == Some(owner)) {
                    return Some(GameOutcome::Win { winner: owner });
                }
            }
        }
        if state.board.iter().all(|cell| cell.is_some()) {
            return Some(GameOutcome::Draw);
        }
        None
    }
}
