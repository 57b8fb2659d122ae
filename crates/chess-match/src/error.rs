//! Match controller error types

use chess_core::TreeError;
use engine_session::EngineError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Both sides need a player before the match can start")]
    NotReady,

    #[error("Not allowed while the match is {0}")]
    InvalidState(&'static str),

    #[error("The game is already held by a running match")]
    Busy,

    #[error("It is not a human player's turn")]
    NotYourTurn,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Invalid time control: {0}")]
    TimeControl(String),

    #[error("No engine named {0}")]
    UnknownEngine(String),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
