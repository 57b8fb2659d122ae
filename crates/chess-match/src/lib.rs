//! Timed matches between humans and engines, and the command surface
//! that ties the game tree and engine sessions together.

pub mod clock;
pub mod controller;
pub mod error;
pub mod player;
pub mod workbench;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chess_core::Game;

pub use clock::{format_duration, Clock, TimeControl};
pub use controller::{MatchController, MatchResult, MatchStatus};
pub use error::MatchError;
pub use player::Player;
pub use workbench::Workbench;

/// One game shared between the match loop and everything that reads it.
pub type SharedGame = Arc<Mutex<Game>>;

/// Lock the game. Never held across an await.
pub fn lock_game(game: &SharedGame) -> MutexGuard<'_, Game> {
    game.lock().unwrap_or_else(PoisonError::into_inner)
}
