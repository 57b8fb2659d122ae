//! Game tree error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The move at `index` of a `play` batch is not legal; nothing was applied.
    #[error("Illegal move: {mv} (move {} of the batch)", index + 1)]
    IllegalMove { index: usize, mv: String },

    #[error("Couldn't find the move {0}")]
    NotFound(String),

    /// The tree is held by a running match.
    #[error("The game is busy with an ongoing match")]
    Busy,

    #[error("Node does not exist in this game")]
    InvalidNode,

    #[error("Cannot add a sideline to the root of the game")]
    RootHasNoSiblings,

    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid NAG: {0}")]
    InvalidNag(String),

    #[error("PGN error: {0}")]
    Pgn(String),
}
