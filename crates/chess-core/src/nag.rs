//! Numeric annotation glyphs (`$1`, `!`, `?!`, ...).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;

/// Glyphs with a conventional ASCII form, indexed by NAG number.
const GLYPHS: [(u8, &str, &str); 6] = [
    (1, "!", "good move"),
    (2, "?", "poor move"),
    (3, "!!", "very good move"),
    (4, "??", "very poor move"),
    (5, "!?", "speculative move"),
    (6, "?!", "questionable move"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Nag(pub u8);

impl Nag {
    pub fn glyph(self) -> Option<&'static str> {
        GLYPHS.iter().find(|(n, _, _)| *n == self.0).map(|(_, g, _)| *g)
    }

    pub fn description(self) -> Option<&'static str> {
        GLYPHS.iter().find(|(n, _, _)| *n == self.0).map(|(_, _, d)| *d)
    }

    /// Split trailing glyphs off a move token: `"Nf3!?"` gives `("Nf3", Some($5))`.
    pub fn split_suffix(token: &str) -> (&str, Option<Nag>) {
        let mv = token.trim_end_matches(|c| c == '!' || c == '?');
        let suffix = &token[mv.len()..];
        if suffix.is_empty() {
            return (token, None);
        }
        match suffix.parse() {
            Ok(nag) => (mv, Some(nag)),
            Err(_) => (token, None),
        }
    }
}

impl FromStr for Nag {
    type Err = TreeError;

    /// `$N` or one of the ASCII glyphs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(number) = s.strip_prefix('$') {
            return number
                .parse()
                .map(Nag)
                .map_err(|_| TreeError::InvalidNag(s.to_string()));
        }
        GLYPHS
            .iter()
            .find(|(_, g, _)| *g == s)
            .map(|(n, _, _)| Nag(*n))
            .ok_or_else(|| TreeError::InvalidNag(s.to_string()))
    }
}

impl fmt::Display for Nag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nag() {
        assert_eq!("$17".parse::<Nag>().unwrap(), Nag(17));
        assert_eq!("?!".parse::<Nag>().unwrap(), Nag(6));
        assert_eq!("!!".parse::<Nag>().unwrap().glyph(), Some("!!"));
        assert_eq!(Nag(4).description(), Some("very poor move"));
        assert_eq!(Nag(14).glyph(), None);
        assert!("$300".parse::<Nag>().is_err());
        assert!("+-".parse::<Nag>().is_err());
    }

    #[test]
    fn test_split_suffix() {
        assert_eq!(Nag::split_suffix("Nf3!?"), ("Nf3", Some(Nag(5))));
        assert_eq!(Nag::split_suffix("Qxf7#??"), ("Qxf7#", Some(Nag(4))));
        assert_eq!(Nag::split_suffix("e4"), ("e4", None));
        assert_eq!(Nag::split_suffix("e4!?!"), ("e4!?!", None));
    }
}
