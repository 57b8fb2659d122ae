//! Engine configuration: what to launch and which option values to apply.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Wire protocol spoken by an engine binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Uci,
    Xboard,
}

impl FromStr for Dialect {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uci" => Ok(Dialect::Uci),
            "xboard" | "cecp" | "winboard" => Ok(Dialect::Xboard),
            other => Err(EngineError::Protocol(format!("unknown protocol: {other}"))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Uci => f.write_str("uci"),
            Dialect::Xboard => f.write_str("xboard"),
        }
    }
}

fn default_handshake_timeout_ms() -> u64 {
    10_000
}

fn default_quit_grace_ms() -> u64 {
    2_000
}

fn default_stop_grace_ms() -> u64 {
    250
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Display name, also used in log lines
    pub name: String,

    /// Path to the engine binary
    pub path: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub dialect: Dialect,

    /// Option values to apply after every handshake, as the user typed them
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Bound on identification plus the ready handshake
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// How long `quit` waits for the process before killing it
    #[serde(default = "default_quit_grace_ms")]
    pub quit_grace_ms: u64,

    /// A bounded search is told to stop this long before its deadline
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
            dialect,
            options: BTreeMap::new(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            quit_grace_ms: default_quit_grace_ms(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn quit_grace(&self) -> Duration {
        Duration::from_millis(self.quit_grace_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"name": "sf", "path": "/usr/bin/stockfish"}"#).unwrap();
        assert_eq!(config.dialect, Dialect::Uci);
        assert_eq!(config.handshake_timeout(), Duration::from_secs(10));
        assert_eq!(config.quit_grace(), Duration::from_secs(2));
        assert_eq!(config.stop_grace(), Duration::from_millis(250));
    }

    #[test]
    fn test_dialect_parse() {
        assert_eq!("XBoard".parse::<Dialect>().unwrap(), Dialect::Xboard);
        assert_eq!("uci".parse::<Dialect>().unwrap(), Dialect::Uci);
        assert!("usi".parse::<Dialect>().is_err());
    }
}
