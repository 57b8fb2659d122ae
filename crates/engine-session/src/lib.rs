//! Driving external chess engines over UCI or XBoard.

pub mod analysis;
pub mod config;
pub mod error;
pub mod options;
pub mod protocol;
pub mod session;

pub use analysis::{AnalysisInfo, AnalysisLimits, AnalysisStream, BestMove, ClockLimits, SearchLimits};
pub use config::{Dialect, EngineConfig};
pub use error::EngineError;
pub use options::{OptionKind, OptionSpec, OptionValue};
pub use session::{EngineSession, SessionState};
