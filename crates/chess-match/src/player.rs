use std::fmt;
use std::sync::Arc;

use engine_session::EngineSession;

/// Who supplies the moves for one side of a match.
#[derive(Clone)]
pub enum Player {
    /// Moves arrive through `MatchController::submit_move`.
    Human,
    Engine(Arc<EngineSession>),
}

impl Player {
    pub fn is_human(&self) -> bool {
        matches!(self, Player::Human)
    }

    pub fn engine(&self) -> Option<&Arc<EngineSession>> {
        match self {
            Player::Engine(session) => Some(session),
            Player::Human => None,
        }
    }

    /// Name for PGN headers.
    pub fn display_name(&self) -> String {
        match self {
            Player::Human => "Human".to_string(),
            Player::Engine(session) => session
                .engine_name()
                .unwrap_or_else(|| session.name().to_string()),
        }
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::Human => f.write_str("Human"),
            Player::Engine(session) => f.debug_tuple("Engine").field(&session.name()).finish(),
        }
    }
}
