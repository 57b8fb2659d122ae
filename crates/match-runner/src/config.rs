//! Runner configuration from environment variables

use std::collections::BTreeMap;
use std::env;

use chess_match::TimeControl;
use engine_session::{Dialect, EngineConfig};

use crate::error::RunnerError;

/// Environment keys for one side's engine.
struct EngineKeys {
    side: &'static str,
    path: &'static str,
    protocol: &'static str,
    options: &'static str,
}

const WHITE: EngineKeys = EngineKeys {
    side: "white",
    path: "WHITE_ENGINE_PATH",
    protocol: "WHITE_ENGINE_PROTOCOL",
    options: "WHITE_ENGINE_OPTIONS",
};

const BLACK: EngineKeys = EngineKeys {
    side: "black",
    path: "BLACK_ENGINE_PATH",
    protocol: "BLACK_ENGINE_PROTOCOL",
    options: "BLACK_ENGINE_OPTIONS",
};

#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub white: EngineConfig,

    pub black: EngineConfig,

    /// Both sides' clock, `minutes+increment`
    pub time_control: TimeControl,

    /// Custom start position; standard when unset
    pub start_fen: Option<String>,

    /// Where to write the finished game; stdout when unset
    pub pgn_out: Option<String>,
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, RunnerError> {
        let white = engine_config(&WHITE)?;
        let black = engine_config(&BLACK)?;

        let raw = env::var("TIME_CONTROL").unwrap_or_else(|_| "3+2".to_string());
        let time_control = raw.parse().map_err(|_| RunnerError::InvalidValue {
            key: "TIME_CONTROL",
            value: raw.clone(),
        })?;

        let start_fen = env::var("START_FEN").ok().filter(|f| !f.trim().is_empty());
        let pgn_out = env::var("PGN_OUT").ok().filter(|p| !p.trim().is_empty());

        Ok(Self {
            white,
            black,
            time_control,
            start_fen,
            pgn_out,
        })
    }
}

fn engine_config(keys: &EngineKeys) -> Result<EngineConfig, RunnerError> {
    let path = env::var(keys.path).map_err(|_| RunnerError::Config(keys.path))?;

    let dialect = match env::var(keys.protocol) {
        Ok(raw) => raw.parse::<Dialect>().map_err(|_| RunnerError::InvalidValue {
            key: keys.protocol,
            value: raw.clone(),
        })?,
        Err(_) => Dialect::default(),
    };

    let mut config = EngineConfig::new(keys.side, &path, dialect);
    if let Ok(raw) = env::var(keys.options) {
        config.options = parse_options(&raw).ok_or(RunnerError::InvalidValue {
            key: keys.options,
            value: raw.clone(),
        })?;
    }
    Ok(config)
}

/// `Hash=64,Threads=2`
fn parse_options(raw: &str) -> Option<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = parse_options("Hash=64, Threads = 2,").unwrap();
        assert_eq!(options.get("Hash").map(String::as_str), Some("64"));
        assert_eq!(options.get("Threads").map(String::as_str), Some("2"));
        assert_eq!(options.len(), 2);

        assert!(parse_options("").unwrap().is_empty());
        assert!(parse_options("Hash").is_none());
        assert!(parse_options("=5").is_none());
    }
}
