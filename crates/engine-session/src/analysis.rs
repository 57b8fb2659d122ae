//! Structured engine output and the subscriber side of an analysis.

use std::collections::BTreeMap;
use std::time::Duration;

use chess_core::Score;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One parsed line of engine thinking output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnalysisInfo {
    /// 1-based line index when several lines are searched at once
    pub multipv: u32,
    pub depth: Option<u32>,
    pub seldepth: Option<u32>,
    /// From the perspective of the side to move
    pub score: Option<Score>,
    pub pv: Vec<String>,
    pub nodes: Option<u64>,
    pub nps: Option<u64>,
    pub time: Option<Duration>,
    /// FEN of the analysed position, filled in by the session
    pub fen: String,
}

/// Limits for an open-ended analysis. Without any limit the engine
/// thinks until stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisLimits {
    pub multipv: u32,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub time: Option<Duration>,
    pub mate: Option<u32>,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            multipv: 5,
            depth: None,
            nodes: None,
            time: None,
            mate: None,
        }
    }
}

/// Remaining time on both clocks, passed along with a search request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockLimits {
    pub white: Duration,
    pub black: Duration,
    pub white_increment: Duration,
    pub black_increment: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchLimits {
    pub movetime: Option<Duration>,
    pub depth: Option<u32>,
    pub nodes: Option<u64>,
    pub clock: Option<ClockLimits>,
}

impl SearchLimits {
    pub fn movetime(limit: Duration) -> Self {
        Self {
            movetime: Some(limit),
            ..Self::default()
        }
    }

    pub fn depth(depth: u32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn clock(clock: ClockLimits) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    /// Hard deadline for the search, if any: the move time or the mover's
    /// remaining clock, whichever is shorter.
    pub fn bound(&self, white_to_move: bool) -> Option<Duration> {
        let clock = self.clock.map(|c| if white_to_move { c.white } else { c.black });
        match (self.movetime, clock) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BestMove {
    /// Coordinate notation as sent by the engine
    pub mv: String,
    pub ponder: Option<String>,
}

/// Receiving end of an analysis. Survives automatic restarts on new
/// positions; ends when the analysis is stopped or the engine goes away.
#[derive(Debug)]
pub struct AnalysisStream {
    rx: mpsc::UnboundedReceiver<AnalysisInfo>,
    fen: String,
    best: BTreeMap<u32, AnalysisInfo>,
}

impl AnalysisStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<AnalysisInfo>) -> Self {
        Self {
            rx,
            fen: String::new(),
            best: BTreeMap::new(),
        }
    }

    /// Wait for the next record. `None` once the analysis has ended.
    pub async fn next(&mut self) -> Option<AnalysisInfo> {
        let info = self.rx.recv().await?;
        self.record(&info);
        Some(info)
    }

    /// Take everything already received without waiting.
    pub fn drain(&mut self) -> Vec<AnalysisInfo> {
        let mut out = Vec::new();
        while let Ok(info) = self.rx.try_recv() {
            self.record(&info);
            out.push(info);
        }
        out
    }

    fn record(&mut self, info: &AnalysisInfo) {
        if info.fen != self.fen {
            self.fen = info.fen.clone();
            self.best.clear();
        }
        self.best.insert(info.multipv.max(1), info.clone());
    }

    /// Latest record per line for the current position, best line first.
    pub fn best_lines(&self) -> Vec<&AnalysisInfo> {
        self.best.values().collect()
    }
}
