//! Engine session error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown option: {0}")]
    InvalidOption(String),

    #[error("Invalid value for option {name}: {value}")]
    OutOfRange { name: String, value: String },

    #[error("Engine timed out during {0}")]
    EngineTimeout(&'static str),

    #[error("Engine process exited unexpectedly")]
    EngineCrash,

    #[error("Engine is not running")]
    EngineGone,

    #[error("Engine is busy: {0}")]
    Busy(&'static str),

    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}
