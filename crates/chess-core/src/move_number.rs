//! Move numbers such as "3." (white's third move) or "3..." (black's third move).

use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use shakmaty::Color;

/// A full move number together with the color that made the move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveNumber {
    pub number: u32,
    pub color: Color,
}

fn move_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(\.\.\.|\.)?").expect("static regex"))
}

impl MoveNumber {
    pub fn new(number: u32, color: Color) -> Self {
        Self { number, color }
    }

    /// The move number of the move that led to a position whose side to move
    /// is `turn` and whose full move counter is `fullmoves`.
    pub fn of_move_leading_to(fullmoves: u32, turn: Color) -> Self {
        match turn {
            // White to move: black just completed move `fullmoves - 1`.
            Color::White => Self::new(fullmoves.saturating_sub(1), Color::Black),
            Color::Black => Self::new(fullmoves, Color::White),
        }
    }

    /// Split a query like "8...Nxe5" into its move number and the remaining
    /// move text. A bare number without dots counts as white's move.
    pub fn split_prefix(text: &str) -> (Option<MoveNumber>, Option<&str>) {
        let Some(caps) = move_number_re().captures(text) else {
            return (None, Some(text));
        };
        let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let Ok(number) = caps[1].parse::<u32>() else {
            return (None, Some(text));
        };
        let color = match caps.get(2).map(|m| m.as_str()) {
            Some("...") => Color::Black,
            _ => Color::White,
        };
        let rest = text[whole..].trim();
        (
            Some(Self::new(number, color)),
            if rest.is_empty() { None } else { Some(rest) },
        )
    }

    pub fn next(self) -> Self {
        match self.color {
            Color::White => Self::new(self.number, Color::Black),
            Color::Black => Self::new(self.number + 1, Color::White),
        }
    }
}

impl Ord for MoveNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let ply = |m: &MoveNumber| (m.number, matches!(m.color, Color::Black));
        ply(self).cmp(&ply(other))
    }
}

impl PartialOrd for MoveNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MoveNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.color {
            Color::White => write!(f, "{}.", self.number),
            Color::Black => write!(f, "{}...", self.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_prefix() {
        assert_eq!(
            MoveNumber::split_prefix("3..."),
            (Some(MoveNumber::new(3, Color::Black)), None)
        );
        assert_eq!(
            MoveNumber::split_prefix("9.dxe5+"),
            (Some(MoveNumber::new(9, Color::White)), Some("dxe5+"))
        );
        assert_eq!(
            MoveNumber::split_prefix("12"),
            (Some(MoveNumber::new(12, Color::White)), None)
        );
        assert_eq!(MoveNumber::split_prefix("f4"), (None, Some("f4")));
    }

    #[test]
    fn test_ordering() {
        let w3 = MoveNumber::new(3, Color::White);
        let b3 = MoveNumber::new(3, Color::Black);
        assert!(w3 < b3);
        assert!(b3 < MoveNumber::new(4, Color::White));
        assert_eq!(w3.next(), b3);
        assert_eq!(b3.to_string(), "3...");
    }
}
