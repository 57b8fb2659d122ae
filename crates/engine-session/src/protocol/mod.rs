//! Dialect adapters. Each dialect turns session requests into command lines
//! and engine output lines into [`EngineEvent`]s.

mod uci;
mod xboard;

use std::time::Duration;

use chess_core::PositionLine;

use crate::analysis::{AnalysisInfo, AnalysisLimits, BestMove, SearchLimits};
use crate::config::Dialect;
use crate::options::{OptionSpec, OptionValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Engine name (`id name`, `myname`)
    Id(String),
    Option(OptionSpec),
    /// An XBoard feature announcement that expects an `accepted` reply
    Feature { name: String, value: String },
    /// Identification finished (`uciok`, `feature done=1`)
    HandshakeDone,
    /// Answer to a synchronisation request (`readyok`, `pong N`)
    Ready,
    Info(AnalysisInfo),
    BestMove(BestMove),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Uci,
    Xboard(XboardState),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XboardState {
    usermove: bool,
    ping: u32,
}

impl Protocol {
    pub fn new(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Uci => Protocol::Uci,
            Dialect::Xboard => Protocol::Xboard(XboardState::default()),
        }
    }

    pub fn identify(&self) -> Vec<String> {
        match self {
            Protocol::Uci => vec!["uci".to_string()],
            Protocol::Xboard(_) => vec!["xboard".to_string(), "protover 2".to_string()],
        }
    }

    /// Reply to a feature announcement, remembering the ones that change
    /// how commands are sent.
    pub fn accept_feature(&mut self, name: &str, value: &str) -> Option<String> {
        match self {
            Protocol::Uci => None,
            Protocol::Xboard(state) => {
                if name == "usermove" {
                    state.usermove = value == "1";
                }
                Some(format!("accepted {name}"))
            }
        }
    }

    /// Synchronisation request; the engine answers with [`EngineEvent::Ready`].
    pub fn ready(&mut self) -> String {
        match self {
            Protocol::Uci => "isready".to_string(),
            Protocol::Xboard(state) => {
                state.ping += 1;
                format!("ping {}", state.ping)
            }
        }
    }

    pub fn set_option(&self, spec: &OptionSpec, value: &OptionValue) -> String {
        match self {
            Protocol::Uci => uci::set_option(spec, value),
            Protocol::Xboard(_) => xboard::set_option(spec, value),
        }
    }

    pub fn set_position(&self, line: &PositionLine) -> Vec<String> {
        match self {
            Protocol::Uci => vec![uci::position(line)],
            Protocol::Xboard(state) => xboard::position(line, state.usermove),
        }
    }

    pub fn go(&self, limits: &SearchLimits, white_to_move: bool) -> Vec<String> {
        match self {
            Protocol::Uci => vec![uci::go(limits)],
            Protocol::Xboard(_) => xboard::go(limits, white_to_move),
        }
    }

    /// Commands that start an open-ended analysis. `multipv` is sent
    /// separately through [`Protocol::multipv_option`].
    pub fn analyze(&self, limits: &AnalysisLimits) -> Vec<String> {
        match self {
            Protocol::Uci => vec![uci::analyze(limits)],
            Protocol::Xboard(_) => xboard::analyze(limits),
        }
    }

    /// Name of the option controlling the number of analysed lines.
    pub fn multipv_option(&self) -> Option<&'static str> {
        match self {
            Protocol::Uci => Some("MultiPV"),
            Protocol::Xboard(_) => None,
        }
    }

    /// Interrupt a search; the engine still reports its move.
    pub fn stop_search(&self) -> String {
        match self {
            Protocol::Uci => "stop".to_string(),
            Protocol::Xboard(_) => "?".to_string(),
        }
    }

    /// Leave analysis mode. The last command is answered by exactly one
    /// terminating event (a best move or a pong).
    pub fn stop_analysis(&mut self) -> Vec<String> {
        if *self == Protocol::Uci {
            return vec!["stop".to_string()];
        }
        let ping = self.ready();
        vec!["exit".to_string(), ping]
    }

    pub fn quit(&self) -> String {
        "quit".to_string()
    }

    pub fn parse_line(&self, line: &str) -> Vec<EngineEvent> {
        match self {
            Protocol::Uci => uci::parse_line(line).into_iter().collect(),
            Protocol::Xboard(_) => xboard::parse_line(line),
        }
    }
}

pub(crate) fn millis(d: Duration) -> u128 {
    d.as_millis().max(1)
}
