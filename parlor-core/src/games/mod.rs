//! Sample game adapters.
//!
//! Real games live with the UI; this module carries one complete adapter so
//! the consensus engine has a deterministic game to exercise in tests and
//! demos.

pub mod tictactoe;

pub use tictactoe::TicTacToe;
