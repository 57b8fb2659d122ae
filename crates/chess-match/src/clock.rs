//! Chess clocks.
//!
//! Time is derived from `tokio::time::Instant` reads, never from counted
//! ticks, so a paused runtime in tests advances clocks exactly.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::MatchError;

/// Base time plus per-move increment, written `minutes+seconds` ("3+2").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeControl {
    pub base: Duration,
    pub increment: Duration,
}

impl TimeControl {
    pub fn new(base: Duration, increment: Duration) -> Self {
        Self { base, increment }
    }
}

impl FromStr for TimeControl {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MatchError::TimeControl(s.to_string());
        let (minutes, increment) = s.trim().split_once('+').unwrap_or((s.trim(), "0"));
        let minutes: f64 = minutes.trim().parse().map_err(|_| invalid())?;
        let increment: u64 = increment.trim().parse().map_err(|_| invalid())?;
        if !minutes.is_finite() || minutes < 0.0 || (minutes == 0.0 && increment == 0) {
            return Err(invalid());
        }
        Ok(Self {
            base: Duration::try_from_secs_f64(minutes * 60.0).map_err(|_| invalid())?,
            increment: Duration::from_secs(increment),
        })
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.base.as_secs();
        if secs % 60 == 0 {
            write!(f, "{}+{}", secs / 60, self.increment.as_secs())
        } else {
            write!(f, "{}+{}", self.base.as_secs_f64() / 60.0, self.increment.as_secs())
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clock {
    /// Remaining time as of the last pause (or start)
    remaining: Duration,
    increment: Duration,
    running_since: Option<Instant>,
    /// Latched once the clock reaches zero while running
    flagged: bool,
}

impl Clock {
    pub fn new(control: TimeControl) -> Self {
        Self {
            remaining: control.base,
            increment: control.increment,
            running_since: None,
            flagged: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    pub fn start(&mut self) {
        if self.running_since.is_none() && !self.flagged {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn pause(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.remaining = self.remaining.saturating_sub(since.elapsed());
            if self.remaining.is_zero() {
                self.flagged = true;
            }
        }
    }

    /// Stop the clock after a move and add the increment. A clock that ran
    /// out before the move stays at zero.
    pub fn complete_move(&mut self) {
        self.pause();
        if !self.flagged {
            self.remaining += self.increment;
        }
    }

    pub fn remaining(&self) -> Duration {
        match self.running_since {
            Some(since) => self.remaining.saturating_sub(since.elapsed()),
            None => self.remaining,
        }
    }

    /// Read the clock, latching the flag once time is up.
    pub fn is_flagged(&mut self) -> bool {
        if !self.flagged && self.is_running() && self.remaining().is_zero() {
            self.pause();
        }
        self.flagged
    }

    /// When a running clock will hit zero.
    pub fn deadline(&self) -> Option<Instant> {
        self.running_since.map(|since| since + self.remaining)
    }

    pub fn reset(&mut self, control: TimeControl) {
        *self = Self::new(control);
    }

    pub fn display(&self) -> String {
        format_duration(self.remaining())
    }
}

/// `m:ss`, or `h:mm:ss` from one hour up.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
