use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// PGN seven-tag roster plus the time control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub event: String,
    pub site: String,
    pub date: String, // "2025.01.15", "????.??.??" when unknown
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub time_control: Option<String>,
}

impl Default for GameMetadata {
    fn default() -> Self {
        Self {
            event: "?".to_string(),
            site: "?".to_string(),
            date: "????.??.??".to_string(),
            round: "?".to_string(),
            white: "?".to_string(),
            black: "?".to_string(),
            result: "*".to_string(),
            time_control: None,
        }
    }
}

impl GameMetadata {
    /// Tags in PGN export order.
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("Event", self.event.clone()),
            ("Site", self.site.clone()),
            ("Date", self.date.clone()),
            ("Round", self.round.clone()),
            ("White", self.white.clone()),
            ("Black", self.black.clone()),
            ("Result", self.result.clone()),
        ];
        if let Some(tc) = &self.time_control {
            tags.push(("TimeControl", tc.clone()));
        }
        tags
    }

    /// Apply one header tag. Returns false for tags this type doesn't keep.
    pub fn set_tag(&mut self, key: &str, value: &str) -> bool {
        let value = value.to_string();
        match key {
            "Event" => self.event = value,
            "Site" => self.site = value,
            "Date" => self.date = value,
            "Round" => self.round = value,
            "White" => self.white = value,
            "Black" => self.black = value,
            "Result" => self.result = value,
            "TimeControl" => self.time_control = Some(value),
            _ => return false,
        }
        true
    }

    pub fn set_date(&mut self, date: NaiveDate) {
        self.date = date.format("%Y.%m.%d").to_string();
    }

    pub fn stamp_today(&mut self) {
        self.set_date(Local::now().date_naive());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        let mut meta = GameMetadata::default();
        assert!(meta.set_tag("White", "Stockfish"));
        assert!(meta.set_tag("TimeControl", "180+2"));
        assert!(!meta.set_tag("ECO", "C20"));
        meta.set_date(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());

        let tags = meta.tags();
        assert_eq!(tags[2], ("Date", "2025.01.15".to_string()));
        assert_eq!(tags[4], ("White", "Stockfish".to_string()));
        assert_eq!(tags.last().unwrap().0, "TimeControl");
        assert_eq!(tags.len(), 8);
    }
}
