//! The operations an interactive front end drives: tree editing and
//! navigation, engine management, and match control over one shared game.

use std::collections::BTreeMap;
use std::sync::Arc;

use chess_core::{pgn, render_moves, rules, Game, NodeId, Placement, PositionLine, Score, TreeError};
use engine_session::{AnalysisLimits, AnalysisStream, EngineConfig, EngineSession, OptionSpec, OptionValue, SessionState};
use shakmaty::Color;
use tracing::{info, warn};

use crate::clock::TimeControl;
use crate::controller::{MatchController, MatchResult, MatchStatus};
use crate::error::MatchError;
use crate::player::Player;
use crate::{lock_game, SharedGame};

/// `Busy` from a held tree is the match's hold.
fn tree_error(e: TreeError) -> MatchError {
    match e {
        TreeError::Busy => MatchError::Busy,
        other => MatchError::Tree(other),
    }
}

pub struct Workbench {
    game: SharedGame,
    engines: BTreeMap<String, Arc<EngineSession>>,
    matchup: Option<MatchController>,
}

impl Default for Workbench {
    fn default() -> Self {
        Self::new(Game::default())
    }
}

impl Workbench {
    pub fn new(game: Game) -> Self {
        Self {
            game: SharedGame::new(game.into()),
            engines: BTreeMap::new(),
            matchup: None,
        }
    }

    pub fn game(&self) -> &SharedGame {
        &self.game
    }

    fn line(&self) -> PositionLine {
        lock_game(&self.game).line()
    }

    /// Point every following analysis at the cursor's position.
    async fn follow_cursor(&self) {
        let line = self.line();
        for session in self.engines.values() {
            if let Err(e) = session.follow_position(&line).await {
                warn!(engine = session.name(), error = %e, "analysis could not follow the cursor");
            }
        }
    }

    async fn move_cursor<F>(&self, f: F) -> Result<NodeId, MatchError>
    where
        F: FnOnce(&mut Game) -> Result<NodeId, TreeError>,
    {
        let node = {
            let mut game = lock_game(&self.game);
            f(&mut game).map_err(tree_error)?
        };
        self.follow_cursor().await;
        Ok(node)
    }

    // ---- Tree ----

    pub async fn play(&self, moves: &[&str], placement: Placement) -> Result<NodeId, MatchError> {
        self.move_cursor(|game| game.play(moves, placement)).await
    }

    pub async fn goto(&self, query: &str, recurse: bool) -> Result<NodeId, MatchError> {
        self.move_cursor(|game| game.goto(query, recurse)).await
    }

    pub async fn back(&self) -> Result<NodeId, MatchError> {
        self.move_cursor(Game::back).await
    }

    pub async fn forward(&self) -> Result<NodeId, MatchError> {
        self.move_cursor(Game::forward).await
    }

    pub async fn previous_sideline(&self) -> Result<NodeId, MatchError> {
        self.move_cursor(Game::previous_sideline).await
    }

    pub async fn next_sideline(&self) -> Result<NodeId, MatchError> {
        self.move_cursor(Game::next_sideline).await
    }

    /// Promote the node under the cursor.
    pub fn promote(&self, to_mainline: bool) -> Result<(), MatchError> {
        let mut game = lock_game(&self.game);
        let cursor = game.cursor();
        game.promote(cursor, to_mainline).map_err(tree_error)
    }

    /// Demote the node under the cursor.
    pub fn demote(&self) -> Result<(), MatchError> {
        let mut game = lock_game(&self.game);
        let cursor = game.cursor();
        game.demote(cursor).map_err(tree_error)
    }

    /// Delete the subtree under the cursor. Returns the number of nodes removed.
    pub async fn delete(&self) -> Result<usize, MatchError> {
        let removed = {
            let mut game = lock_game(&self.game);
            let cursor = game.cursor();
            game.delete(cursor).map_err(tree_error)?
        };
        self.follow_cursor().await;
        Ok(removed)
    }

    pub fn comment(&self, text: Option<String>) -> Result<(), MatchError> {
        let mut game = lock_game(&self.game);
        let cursor = game.cursor();
        game.set_comment(cursor, text).map_err(tree_error)
    }

    /// Set or clear the evaluation shown on the cursor's node.
    pub fn evaluate(&self, score: Option<Score>) -> Result<(), MatchError> {
        let mut game = lock_game(&self.game);
        let cursor = game.cursor();
        game.set_eval(cursor, score).map_err(tree_error)
    }

    pub fn moves(&self, recurse: bool) -> String {
        render_moves(lock_game(&self.game).moves(recurse))
    }

    pub fn moves_with_sidelines(&self) -> String {
        render_moves(lock_game(&self.game).moves_with_sidelines())
    }

    pub fn fen(&self) -> String {
        lock_game(&self.game).fen()
    }

    pub fn export_pgn(&self) -> String {
        pgn::export(&lock_game(&self.game))
    }

    /// Replace the game with an imported one. Refused while a match holds it.
    pub async fn import_pgn(&self, text: &str) -> Result<(), MatchError> {
        let imported = pgn::import(text)?;
        {
            let mut game = lock_game(&self.game);
            if game.is_held() {
                return Err(MatchError::Busy);
            }
            *game = imported;
        }
        self.follow_cursor().await;
        Ok(())
    }

    // ---- Engines ----

    /// Spawn and handshake an engine. A disconnected engine of the same
    /// name is replaced.
    pub async fn load_engine(&mut self, config: EngineConfig) -> Result<Arc<EngineSession>, MatchError> {
        let session = Arc::new(EngineSession::new(config));
        self.add_engine(session.clone())?;
        if let Err(e) = session.load().await {
            self.engines.remove(session.name());
            return Err(e.into());
        }
        info!(engine = session.name(), reported = ?session.engine_name(), "engine loaded");
        Ok(session)
    }

    /// Register an engine session connected by other means.
    pub fn add_engine(&mut self, session: Arc<EngineSession>) -> Result<(), MatchError> {
        if let Some(existing) = self.engines.get(session.name()) {
            if existing.state() != SessionState::Disconnected {
                return Err(engine_session::EngineError::Busy("engine name in use").into());
            }
        }
        self.engines.insert(session.name().to_string(), session);
        Ok(())
    }

    pub fn engine(&self, name: &str) -> Result<&Arc<EngineSession>, MatchError> {
        self.engines
            .get(name)
            .ok_or_else(|| MatchError::UnknownEngine(name.to_string()))
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    pub fn engine_options(&self, name: &str) -> Result<Vec<OptionSpec>, MatchError> {
        Ok(self.engine(name)?.options())
    }

    pub async fn config_set(&self, name: &str, option: &str, value: &str) -> Result<OptionValue, MatchError> {
        Ok(self.engine(name)?.config_set(option, value).await?)
    }

    pub fn config_get(&self, name: &str, option: &str) -> Result<OptionValue, MatchError> {
        Ok(self.engine(name)?.config_get(option)?)
    }

    pub async fn config_unset(&self, name: &str, option: &str) -> Result<(), MatchError> {
        Ok(self.engine(name)?.config_unset(option).await?)
    }

    /// Analyse the cursor's position. Without `fixed` the analysis moves
    /// along with the cursor.
    pub async fn analysis_start(
        &self,
        name: &str,
        limits: AnalysisLimits,
        fixed: bool,
    ) -> Result<AnalysisStream, MatchError> {
        let session = self.engine(name)?;
        Ok(session.analysis_start(&self.line(), limits, fixed).await?)
    }

    /// Store the stream's best score on the node it was computed for, from
    /// White's point of view. Positions no longer on the cursor's line are
    /// skipped.
    pub fn record_evaluation(&self, stream: &AnalysisStream) -> Result<Option<NodeId>, MatchError> {
        let lines = stream.best_lines();
        let Some(best) = lines.first() else {
            return Ok(None);
        };
        let Some(score) = best.score else {
            return Ok(None);
        };
        let mut game = lock_game(&self.game);
        let Some(node) = game.find_position(&best.fen) else {
            return Ok(None);
        };
        let black_to_move = game
            .tree()
            .node(node)
            .is_some_and(|n| rules::side_to_move(n.position()) == Color::Black);
        let score = if black_to_move { score.negate() } else { score };
        game.set_eval(node, Some(score)).map_err(tree_error)?;
        Ok(Some(node))
    }

    pub async fn analysis_stop(&self, name: &str) -> Result<(), MatchError> {
        Ok(self.engine(name)?.analysis_stop().await?)
    }

    pub async fn quit_engine(&mut self, name: &str) -> Result<(), MatchError> {
        let session = self
            .engines
            .remove(name)
            .ok_or_else(|| MatchError::UnknownEngine(name.to_string()))?;
        session.quit().await?;
        info!(engine = name, "engine quit");
        Ok(())
    }

    /// Quit every engine.
    pub async fn shutdown(&mut self) {
        for (name, session) in std::mem::take(&mut self.engines) {
            if let Err(e) = session.quit().await {
                warn!(engine = %name, error = %e, "engine did not quit cleanly");
            }
        }
    }

    // ---- Match ----

    /// Set up a new match on the current game, replacing a finished or
    /// unstarted one.
    pub fn new_match(&mut self, control: TimeControl) -> Result<&mut MatchController, MatchError> {
        if let Some(current) = self.matchup.as_mut() {
            if matches!(current.status(), MatchStatus::Running | MatchStatus::Paused) {
                return Err(MatchError::Busy);
            }
        }
        Ok(self.matchup.insert(MatchController::new(self.game.clone(), control)))
    }

    fn controller(&mut self) -> Result<&mut MatchController, MatchError> {
        self.matchup
            .as_mut()
            .ok_or(MatchError::InvalidState("not set up"))
    }

    pub fn match_status(&mut self) -> Option<&MatchStatus> {
        self.matchup.as_mut().map(MatchController::status)
    }

    /// Bind a side to a loaded engine, or to the human when `engine` is `None`.
    pub fn set_player(&mut self, color: Color, engine: Option<&str>) -> Result<(), MatchError> {
        let player = match engine {
            Some(name) => Player::Engine(self.engine(name)?.clone()),
            None => Player::Human,
        };
        self.controller()?.set_player(color, player)
    }

    pub fn set_time_control(&mut self, color: Color, control: TimeControl) -> Result<(), MatchError> {
        self.controller()?.set_time_control(color, control)
    }

    /// Start the match. A player engine's own analysis is stopped first;
    /// other engines keep analysing and follow the match's moves.
    pub async fn match_start(&mut self) -> Result<(), MatchError> {
        let ctl = self.controller()?;
        let players: Vec<Arc<EngineSession>> = [Color::White, Color::Black]
            .into_iter()
            .filter_map(|color| ctl.player(color).and_then(Player::engine).cloned())
            .collect();
        for session in &players {
            session.analysis_stop().await?;
        }
        self.controller()?.start().await?;
        self.follow_cursor().await;
        Ok(())
    }

    pub async fn match_pause(&mut self) -> Result<(), MatchError> {
        self.controller()?.pause().await
    }

    pub async fn match_resume(&mut self) -> Result<(), MatchError> {
        self.controller()?.resume().await
    }

    pub fn match_reset(&mut self) -> Result<(), MatchError> {
        self.controller()?.reset()
    }

    pub async fn submit_move(&mut self, mv: &str) -> Result<NodeId, MatchError> {
        let node = self.controller()?.submit_move(mv).await?;
        self.follow_cursor().await;
        Ok(node)
    }

    pub async fn resign(&mut self, color: Color) -> Result<(), MatchError> {
        self.controller()?.resign(color).await
    }

    /// Drive the match until the next move or the end.
    pub async fn match_step(&mut self) -> Result<MatchStatus, MatchError> {
        let status = self.controller()?.step().await?;
        self.follow_cursor().await;
        Ok(status)
    }

    pub async fn run_match(&mut self) -> Result<MatchResult, MatchError> {
        loop {
            match self.match_step().await? {
                MatchStatus::Finished(result) => return Ok(result),
                MatchStatus::Running => {}
                other => return Err(MatchError::InvalidState(other.label())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tree_commands() {
        let bench = Workbench::default();
        bench.play(&["e4", "e5"], Placement::Default).await.unwrap();
        bench.play(&["d5"], Placement::Sideline).await.unwrap();
        assert_eq!(bench.moves(false), "1. e4 d5");
        bench.promote(true).unwrap();
        assert_eq!(bench.moves(true), "1. e4 d5 <e5>");
        bench.goto("e5", true).await.unwrap();
        assert_eq!(bench.delete().await.unwrap(), 1);
        assert_eq!(bench.moves(true), "1. e4 d5");
    }

    #[tokio::test]
    async fn test_unknown_engine() {
        let mut bench = Workbench::default();
        assert_eq!(
            bench.config_get("sf", "Hash"),
            Err(MatchError::UnknownEngine("sf".into()))
        );
        assert_eq!(
            bench.quit_engine("sf").await,
            Err(MatchError::UnknownEngine("sf".into()))
        );
        assert_eq!(
            bench.set_player(Color::White, None),
            Err(MatchError::InvalidState("not set up"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_match_holds_tree() {
        let mut bench = Workbench::default();
        bench.new_match("5+0".parse().unwrap()).unwrap();
        bench.set_player(Color::White, None).unwrap();
        bench.set_player(Color::Black, None).unwrap();
        bench.match_start().await.unwrap();
        bench.submit_move("e4").await.unwrap();

        assert_eq!(bench.play(&["e5"], Placement::Default).await, Err(MatchError::Busy));
        assert_eq!(bench.goto("start", false).await, Err(MatchError::Busy));
        assert_eq!(bench.import_pgn("1. d4 *").await, Err(MatchError::Busy));
        assert!(matches!(
            bench.new_match("1+0".parse().unwrap()),
            Err(MatchError::Busy)
        ));

        bench.resign(Color::Black).await.unwrap();
        bench.play(&["e5"], Placement::Default).await.unwrap();
        assert_eq!(bench.moves(false), "1. e4 e5");
        assert!(bench.export_pgn().contains("[Result \"1-0\"]"));
    }
}
