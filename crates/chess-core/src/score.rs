//! Engine evaluations as attached to game nodes and analysis records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Score from the perspective of the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Cp(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated)
    Mate(i32),
}

impl Score {
    /// Centipawns from white's perspective, with mates mapped to +-10000
    /// shrinking by 10 per move so that shorter mates rank higher.
    pub fn to_white_cp(self, white_to_move: bool) -> i32 {
        let cp = match self {
            Score::Mate(m) if m > 0 => 10000 - m * 10,
            Score::Mate(m) => -10000 - m * 10,
            Score::Cp(c) => c,
        };
        if white_to_move {
            cp
        } else {
            -cp
        }
    }

    /// Flip to the other side's perspective.
    pub fn negate(self) -> Self {
        match self {
            Score::Cp(c) => Score::Cp(c.saturating_neg()),
            Score::Mate(m) => Score::Mate(m.saturating_neg()),
        }
    }

    /// PGN `[%eval ...]` form: pawns with two decimals or `#N`.
    pub fn to_pgn_eval(self) -> String {
        match self {
            Score::Cp(c) => format!("{:.2}", c as f64 / 100.0),
            Score::Mate(m) => format!("#{m}"),
        }
    }

    pub fn from_pgn_eval(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(mate) = text.strip_prefix('#') {
            return mate.parse().ok().map(Score::Mate);
        }
        let pawns: f64 = text.parse().ok()?;
        Some(Score::Cp((pawns * 100.0).round() as i32))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Mate(m) if m > 0 => write!(f, "Mate in {m}"),
            Score::Mate(m) => write!(f, "Mated in {}", -m),
            Score::Cp(c) if c > 0 => write!(f, "+{:.2} pawns", c as f64 / 100.0),
            Score::Cp(c) => write!(f, "{:.2} pawns", c as f64 / 100.0),
        }
    }
}
