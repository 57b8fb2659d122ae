pub mod error;
pub mod game;
pub mod game_data;
pub mod game_tree;
pub mod move_number;
pub mod moves;
pub mod nag;
pub mod pgn;
pub mod rules;
pub mod score;

pub use error::TreeError;
pub use game::{Game, Hold};
pub use game_data::GameMetadata;
pub use game_tree::{GameNode, GameTree, NodeId, Placement, PositionLine};
pub use move_number::MoveNumber;
pub use moves::{render_moves, MoveToken, Moves};
pub use nag::Nag;
pub use rules::{DrawReason, GameStatus};
pub use score::Score;

pub use shakmaty::{Chess, Color};
