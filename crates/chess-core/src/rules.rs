//! Rules adapter: the only place that talks to shakmaty directly.
//!
//! Legality, SAN/UCI conversion, FEN (de)serialization and terminal-state
//! detection all go through here so the tree code never touches board internals.

use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen,
    san::{San, SanPlus},
    uci::UciMove,
    CastlingMode, Chess, Color, EnPassantMode, Move, Position,
};

use crate::error::TreeError;

pub const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Why a game ended in a draw without stalemate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawReason {
    InsufficientMaterial,
    FiftyMoves,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Ongoing,
    /// The side to move has been mated.
    Checkmate,
    Stalemate,
    Draw(DrawReason),
}

impl GameStatus {
    pub fn is_over(self) -> bool {
        !matches!(self, GameStatus::Ongoing)
    }
}

pub fn legal_moves(pos: &Chess) -> Vec<Move> {
    pos.legal_moves().into_iter().collect()
}

/// Resolve a move string against a position.
/// Accepts SAN with or without check suffix ("Nf3", "exd5+", "O-O") and
/// falls back to UCI coordinates ("g1f3", "e7e8q").
pub fn parse_move(pos: &Chess, text: &str) -> Option<Move> {
    let text = text.trim();
    if let Ok(san) = text.parse::<SanPlus>() {
        if let Ok(mv) = san.san.to_move(pos) {
            return Some(mv);
        }
    }
    let uci: UciMove = text.parse().ok()?;
    uci.to_move(pos).ok()
}

/// Apply a move, rejecting it if it is not legal in `pos`.
pub fn apply(pos: &Chess, mv: Move) -> Result<Chess, TreeError> {
    pos.clone().play(mv).map_err(|_| TreeError::IllegalMove {
        index: 0,
        mv: uci(mv),
    })
}

/// SAN for `mv` including the `+`/`#` suffix.
pub fn san(pos: &Chess, mv: Move) -> String {
    let mut text = San::from_move(pos, mv).to_string();
    let mut after = pos.clone();
    after.play_unchecked(mv);
    if after.is_checkmate() {
        text.push('#');
    } else if after.is_check() {
        text.push('+');
    }
    text
}

pub fn uci(mv: Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos, EnPassantMode::Legal).to_string()
}

pub fn from_fen(fen: &str) -> Result<Chess, TreeError> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| TreeError::InvalidFen(format!("{fen}: {e}")))?;
    parsed
        .into_position::<Chess>(CastlingMode::Standard)
        .map_err(|e| TreeError::InvalidFen(format!("{fen}: {e}")))
}

pub fn game_status(pos: &Chess) -> GameStatus {
    if pos.is_checkmate() {
        GameStatus::Checkmate
    } else if pos.is_stalemate() {
        GameStatus::Stalemate
    } else if pos.is_insufficient_material() {
        GameStatus::Draw(DrawReason::InsufficientMaterial)
    } else if pos.halfmoves() >= 100 {
        GameStatus::Draw(DrawReason::FiftyMoves)
    } else {
        GameStatus::Ongoing
    }
}

pub fn side_to_move(pos: &Chess) -> Color {
    pos.turn()
}

/// Full move number of the position (1 at the start of a standard game).
pub fn fullmove_number(pos: &Chess) -> u32 {
    pos.fullmoves().get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_san_and_uci() {
        let pos = Chess::default();
        let by_san = parse_move(&pos, "Nf3").unwrap();
        let by_uci = parse_move(&pos, "g1f3").unwrap();
        assert_eq!(by_san, by_uci);
        assert!(parse_move(&pos, "Nf6").is_none());
        assert!(parse_move(&pos, "e2e5").is_none());
    }

    #[test]
    fn test_san_suffix() {
        // Fool's mate
        let mut pos = Chess::default();
        for text in ["f3", "e5", "g4"] {
            let mv = parse_move(&pos, text).unwrap();
            pos = apply(&pos, mv).unwrap();
        }
        let mate = parse_move(&pos, "Qh4").unwrap();
        assert_eq!(san(&pos, mate), "Qh4#");
        let after = apply(&pos, mate).unwrap();
        assert_eq!(game_status(&after), GameStatus::Checkmate);
    }

    #[test]
    fn test_fen_roundtrip() {
        let pos = from_fen(STANDARD_START_FEN).unwrap();
        assert_eq!(to_fen(&pos), STANDARD_START_FEN);
        assert!(from_fen("not a fen").is_err());
    }

    #[test]
    fn test_insufficient_material() {
        let pos = from_fen("8/8/4k3/8/8/3K4/8/8 w - - 0 1").unwrap();
        assert_eq!(
            game_status(&pos),
            GameStatus::Draw(DrawReason::InsufficientMaterial)
        );
    }

    #[test]
    fn test_stalemate() {
        let pos = from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert_eq!(game_status(&pos), GameStatus::Stalemate);
    }
}
