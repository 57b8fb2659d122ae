//! Turn-taking between two players with independent clocks.
//!
//! The controller holds the shared game for the whole match, so manual
//! edits and cursor moves elsewhere fail with `Busy` until it finishes.
//! Engine searches run on their own task; [`MatchController::step`] waits
//! for whichever comes first, the engine's reply or the mover's flag.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chess_core::rules::{self, DrawReason, GameStatus};
use chess_core::{Hold, NodeId, Placement, TreeError};
use engine_session::{BestMove, ClockLimits, EngineError, EngineSession, SearchLimits};
use shakmaty::{ByColor, Color};
use tokio::task::JoinHandle;
use tokio::time::sleep_until;
use tracing::{debug, info, warn};

use crate::clock::{Clock, TimeControl};
use crate::error::MatchError;
use crate::player::Player;
use crate::{lock_game, SharedGame};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Checkmate { winner: Color },
    Stalemate,
    Draw(DrawReason),
    TimeForfeit { loser: Color },
    Resignation { loser: Color },
    /// The engine crashed, timed out or sent an illegal move.
    EngineFailure { loser: Color, reason: String },
}

fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

impl MatchResult {
    pub fn winner(&self) -> Option<Color> {
        match self {
            MatchResult::Checkmate { winner } => Some(*winner),
            MatchResult::TimeForfeit { loser }
            | MatchResult::Resignation { loser }
            | MatchResult::EngineFailure { loser, .. } => Some(!*loser),
            MatchResult::Stalemate | MatchResult::Draw(_) => None,
        }
    }

    /// PGN result token.
    pub fn pgn_result(&self) -> &'static str {
        match self.winner() {
            Some(Color::White) => "1-0",
            Some(Color::Black) => "0-1",
            None => "1/2-1/2",
        }
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchResult::Checkmate { winner } => write!(f, "{} wins by checkmate", color_name(*winner)),
            MatchResult::Stalemate => f.write_str("Draw by stalemate"),
            MatchResult::Draw(DrawReason::InsufficientMaterial) => {
                f.write_str("Draw by insufficient material")
            }
            MatchResult::Draw(DrawReason::FiftyMoves) => f.write_str("Draw by the fifty-move rule"),
            MatchResult::TimeForfeit { loser } => write!(f, "{} lost on time", color_name(*loser)),
            MatchResult::Resignation { loser } => write!(f, "{} resigned", color_name(*loser)),
            MatchResult::EngineFailure { loser, reason } => {
                write!(f, "{} forfeits: {reason}", color_name(*loser))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchStatus {
    NotStarted,
    Running,
    Paused,
    Finished(MatchResult),
}

impl MatchStatus {
    pub(crate) fn label(&self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "not started",
            MatchStatus::Running => "running",
            MatchStatus::Paused => "paused",
            MatchStatus::Finished(_) => "finished",
        }
    }
}

type SearchHandle = JoinHandle<Result<BestMove, EngineError>>;

pub struct MatchController {
    game: SharedGame,
    controls: ByColor<TimeControl>,
    clocks: ByColor<Clock>,
    players: ByColor<Option<Player>>,
    status: MatchStatus,
    hold: Option<Hold>,
    /// Node the match started from
    origin: Option<NodeId>,
    search: Option<SearchHandle>,
}

impl MatchController {
    pub fn new(game: SharedGame, control: TimeControl) -> Self {
        Self {
            game,
            controls: ByColor {
                white: control,
                black: control,
            },
            clocks: ByColor {
                white: Clock::new(control),
                black: Clock::new(control),
            },
            players: ByColor {
                white: None,
                black: None,
            },
            status: MatchStatus::NotStarted,
            hold: None,
            origin: None,
            search: None,
        }
    }

    /// Current status. A side whose clock has run out loses first.
    pub fn status(&mut self) -> &MatchStatus {
        self.apply_flag();
        &self.status
    }

    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    pub fn player(&self, color: Color) -> Option<&Player> {
        self.players.get(color).as_ref()
    }

    pub fn set_player(&mut self, color: Color, player: Player) -> Result<(), MatchError> {
        self.ensure_not_started()?;
        *self.players.get_mut(color) = Some(player);
        Ok(())
    }

    /// Give one side a different time control.
    pub fn set_time_control(&mut self, color: Color, control: TimeControl) -> Result<(), MatchError> {
        self.ensure_not_started()?;
        *self.controls.get_mut(color) = control;
        self.clocks.get_mut(color).reset(control);
        Ok(())
    }

    fn ensure_not_started(&self) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::NotStarted => Ok(()),
            ref other => Err(MatchError::InvalidState(other.label())),
        }
    }

    fn ensure_running(&self) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::Running => Ok(()),
            ref other => Err(MatchError::InvalidState(other.label())),
        }
    }

    pub fn to_move(&self) -> Color {
        rules::side_to_move(lock_game(&self.game).position())
    }

    /// Remaining time. Like every clock read, this applies a fallen flag.
    pub fn remaining(&mut self, color: Color) -> Duration {
        self.apply_flag();
        self.clocks.get(color).remaining()
    }

    pub fn clock_display(&mut self, color: Color) -> String {
        self.apply_flag();
        self.clocks.get(color).display()
    }

    fn apply_flag(&mut self) {
        if self.status != MatchStatus::Running {
            return;
        }
        let side = self.to_move();
        if self.clocks.get_mut(side).is_flagged() {
            self.finish_now(MatchResult::TimeForfeit { loser: side });
        }
    }

    // ---- Lifecycle ----

    /// Take hold of the game and start the clock of the side to move.
    /// An engine to move is asked for its move right away. Player names
    /// and the time control go into the game's headers only when the
    /// match starts on the mainline.
    pub async fn start(&mut self) -> Result<(), MatchError> {
        self.ensure_not_started()?;
        let (Some(white), Some(black)) = (&self.players.white, &self.players.black) else {
            return Err(MatchError::NotReady);
        };
        let (white_name, black_name) = (white.display_name(), black.display_name());
        {
            let mut game = lock_game(&self.game);
            let hold = game.acquire_hold().map_err(|_| MatchError::Busy)?;
            self.hold = Some(hold);
            let origin = game.cursor();
            self.origin = Some(origin);
            if game.tree().is_on_mainline(origin) {
                game.metadata.white = white_name;
                game.metadata.black = black_name;
                game.metadata.time_control = Some(if self.controls.white == self.controls.black {
                    self.controls.white.to_string()
                } else {
                    format!("{}/{}", self.controls.white, self.controls.black)
                });
                game.metadata.result = "*".to_string();
                game.metadata.stamp_today();
            }
        }
        self.status = MatchStatus::Running;
        info!(
            white = ?self.players.white,
            black = ?self.players.black,
            time_control = %self.controls.white,
            "match started"
        );

        if let Some(result) = self.terminal_result() {
            self.finish(result).await;
            return Ok(());
        }
        let side = self.to_move();
        self.clocks.get_mut(side).start();
        self.begin_turn();
        Ok(())
    }

    /// Stop the running clock and interrupt an engine search in flight.
    pub async fn pause(&mut self) -> Result<(), MatchError> {
        self.check_time().await;
        self.ensure_running()?;
        let side = self.to_move();
        self.clocks.get_mut(side).pause();
        self.cancel_search(side).await;
        self.status = MatchStatus::Paused;
        info!(remaining = %self.clocks.get(side).display(), "match paused");
        Ok(())
    }

    /// Restart the clock; an engine to move gets a fresh search with its
    /// remaining time.
    pub async fn resume(&mut self) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::Paused => {}
            ref other => return Err(MatchError::InvalidState(other.label())),
        }
        self.status = MatchStatus::Running;
        let side = self.to_move();
        self.clocks.get_mut(side).start();
        self.begin_turn();
        info!("match resumed");
        Ok(())
    }

    pub async fn resign(&mut self, color: Color) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::Running | MatchStatus::Paused => {}
            ref other => return Err(MatchError::InvalidState(other.label())),
        }
        self.finish(MatchResult::Resignation { loser: color }).await;
        Ok(())
    }

    /// Back to `NotStarted` with fresh clocks and no players.
    pub fn reset(&mut self) -> Result<(), MatchError> {
        match self.status {
            MatchStatus::Finished(_) => {}
            ref other => return Err(MatchError::InvalidState(other.label())),
        }
        self.clocks.white.reset(self.controls.white);
        self.clocks.black.reset(self.controls.black);
        self.players = ByColor {
            white: None,
            black: None,
        };
        self.origin = None;
        self.status = MatchStatus::NotStarted;
        Ok(())
    }

    // ---- Moves ----

    /// Play a move for a human side.
    pub async fn submit_move(&mut self, mv: &str) -> Result<NodeId, MatchError> {
        self.check_time().await;
        self.ensure_running()?;
        let side = self.to_move();
        if !matches!(self.players.get(side), Some(Player::Human)) {
            return Err(MatchError::NotYourTurn);
        }
        self.play_move(side, mv).await
    }

    /// Read the clocks; a side whose time ran out loses. Returns the
    /// status afterwards.
    pub async fn check_time(&mut self) -> &MatchStatus {
        if self.status == MatchStatus::Running {
            let side = self.to_move();
            if self.clocks.get_mut(side).is_flagged() {
                self.finish(MatchResult::TimeForfeit { loser: side }).await;
            }
        }
        &self.status
    }

    /// Wait for the next event of a running match: the engine's move or
    /// the mover's flag. With a human to move this only returns on a flag,
    /// so callers race it against their input.
    pub async fn step(&mut self) -> Result<MatchStatus, MatchError> {
        self.ensure_running()?;
        let side = self.to_move();
        let deadline = self
            .clocks
            .get(side)
            .deadline()
            .ok_or(MatchError::InvalidState("running without a clock"))?;

        let joined = match self.search.as_mut() {
            Some(search) => tokio::select! {
                biased;
                _ = sleep_until(deadline) => None,
                joined = search => Some(joined),
            },
            None => {
                sleep_until(deadline).await;
                None
            }
        };

        match joined {
            None => {
                self.check_time().await;
            }
            Some(joined) => {
                self.search = None;
                let reply = joined
                    .unwrap_or_else(|e| Err(EngineError::Protocol(format!("search task failed: {e}"))));
                self.on_engine_reply(side, reply).await?;
            }
        }
        Ok(self.status.clone())
    }

    pub async fn run_until_finished(&mut self) -> Result<MatchResult, MatchError> {
        loop {
            match &self.status {
                MatchStatus::Finished(result) => return Ok(result.clone()),
                MatchStatus::Running => {
                    self.step().await?;
                }
                other => return Err(MatchError::InvalidState(other.label())),
            }
        }
    }

    async fn on_engine_reply(
        &mut self,
        side: Color,
        reply: Result<BestMove, EngineError>,
    ) -> Result<(), MatchError> {
        if self.clocks.get_mut(side).is_flagged() {
            self.finish(MatchResult::TimeForfeit { loser: side }).await;
            return Ok(());
        }
        match reply {
            Ok(best) => match self.play_move(side, &best.mv).await {
                Ok(_) => Ok(()),
                Err(MatchError::IllegalMove(mv)) => {
                    warn!(side = color_name(side), mv = %mv, "engine played an illegal move");
                    let reason = format!("illegal move {mv}");
                    self.finish(MatchResult::EngineFailure { loser: side, reason }).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Err(e) => {
                warn!(side = color_name(side), error = %e, "engine failed during match");
                let reason = e.to_string();
                self.finish(MatchResult::EngineFailure { loser: side, reason }).await;
                Ok(())
            }
        }
    }

    async fn play_move(&mut self, side: Color, mv: &str) -> Result<NodeId, MatchError> {
        let node = {
            let mut game = lock_game(&self.game);
            let hold = self
                .hold
                .as_ref()
                .ok_or(MatchError::InvalidState("detached from its game"))?;
            let node = match game.play_held(hold, &[mv], Placement::Default) {
                Ok(node) => node,
                Err(TreeError::IllegalMove { .. }) => {
                    return Err(MatchError::IllegalMove(mv.to_string()))
                }
                Err(e) => return Err(e.into()),
            };
            let clock = self.clocks.get_mut(side);
            clock.complete_move();
            game.set_clock(node, Some(clock.remaining()))?;
            node
        };
        debug!(
            side = color_name(side),
            mv,
            remaining = %self.clocks.get(side).display(),
            "move played"
        );

        if let Some(result) = self.terminal_result() {
            self.finish(result).await;
        } else {
            self.clocks.get_mut(!side).start();
            self.begin_turn();
        }
        Ok(node)
    }

    fn terminal_result(&self) -> Option<MatchResult> {
        let game = lock_game(&self.game);
        let position = game.position();
        match rules::game_status(position) {
            GameStatus::Ongoing => None,
            GameStatus::Checkmate => Some(MatchResult::Checkmate {
                winner: !rules::side_to_move(position),
            }),
            GameStatus::Stalemate => Some(MatchResult::Stalemate),
            GameStatus::Draw(reason) => Some(MatchResult::Draw(reason)),
        }
    }

    /// Ask the engine to move if it is the engine's turn.
    fn begin_turn(&mut self) {
        let side = self.to_move();
        let Some(Player::Engine(session)) = self.players.get(side).clone() else {
            return;
        };
        let line = lock_game(&self.game).line();
        let limits = SearchLimits::clock(ClockLimits {
            white: self.clocks.white.remaining(),
            black: self.clocks.black.remaining(),
            white_increment: self.controls.white.increment,
            black_increment: self.controls.black.increment,
        });
        debug!(engine = session.name(), side = color_name(side), "requesting move");
        self.search = Some(tokio::spawn(async move { session.go(&line, limits).await }));
    }

    /// Detach the search in flight along with the engine running it.
    fn take_search(&mut self, side: Color) -> Option<(Option<Arc<EngineSession>>, SearchHandle)> {
        let search = self.search.take()?;
        let session = self.players.get(side).as_ref().and_then(Player::engine).cloned();
        Some((session, search))
    }

    async fn cancel_search(&mut self, side: Color) {
        if let Some((session, search)) = self.take_search(side) {
            halt_search(session, search).await;
        }
    }

    async fn finish(&mut self, result: MatchResult) {
        let side = self.to_move();
        self.cancel_search(side).await;
        self.conclude(result);
    }

    /// Finish from a synchronous read; the engine still searching is
    /// stopped on a background task.
    fn finish_now(&mut self, result: MatchResult) {
        let side = self.to_move();
        if let Some((session, search)) = self.take_search(side) {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(halt_search(session, search));
                }
                Err(_) => search.abort(),
            }
        }
        self.conclude(result);
    }

    /// Record the result and give the game back. The `Result` header is
    /// only written for a match that started on the mainline.
    fn conclude(&mut self, result: MatchResult) {
        self.clocks.white.pause();
        self.clocks.black.pause();
        {
            let mut game = lock_game(&self.game);
            let cursor = game.cursor();
            if let Err(e) = game.append_comment(cursor, &result.to_string()) {
                warn!(error = %e, "could not annotate the final move");
            }
            let on_mainline = self
                .origin
                .take()
                .is_some_and(|origin| game.tree().is_on_mainline(origin));
            if on_mainline {
                game.metadata.result = result.pgn_result().to_string();
            }
            if let Some(hold) = self.hold.take() {
                game.release_hold(hold);
            }
        }
        info!(result = %result, pgn = result.pgn_result(), "match finished");
        self.status = MatchStatus::Finished(result);
    }
}

/// Stop the engine's search, then drop the task waiting for its move.
async fn halt_search(session: Option<Arc<EngineSession>>, search: SearchHandle) {
    if let Some(session) = session {
        if let Err(e) = session.stop().await {
            warn!(engine = session.name(), error = %e, "failed to stop search");
        }
    }
    search.abort();
}

impl Drop for MatchController {
    fn drop(&mut self) {
        if let Some(search) = self.search.take() {
            search.abort();
        }
        if let Some(hold) = self.hold.take() {
            lock_game(&self.game).release_hold(hold);
        }
    }
}
