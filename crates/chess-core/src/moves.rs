//! Lazy move listings over a [`GameTree`].
//!
//! A [`Moves`] value walks the tree on demand and yields [`MoveToken`]s.
//! It is `Clone`, so a listing can be restarted by cloning it before use.

use std::fmt;

use shakmaty::Color;

use crate::game_tree::{GameTree, NodeId};
use crate::move_number::MoveNumber;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveToken {
    Move {
        number: MoveNumber,
        san: String,
        show_number: bool,
    },
    /// Opens a sideline; rendered as `<`.
    StartVariation,
    /// Closes a sideline; rendered as `>`.
    EndVariation,
    /// Every move played at a branch point, mainline first.
    Alternatives(Vec<String>),
}

impl fmt::Display for MoveToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveToken::Move {
                number,
                san,
                show_number: true,
            } => write!(f, "{number} {san}"),
            MoveToken::Move { san, .. } => f.write_str(san),
            MoveToken::StartVariation => f.write_str("<"),
            MoveToken::EndVariation => f.write_str(">"),
            MoveToken::Alternatives(sans) => write!(f, "({})", sans.join("; ")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Work {
    Move(NodeId),
    Alternatives(NodeId),
    Start,
    End,
    /// Expand the children of a node: mainline move, its sidelines, then onwards.
    Continue(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Nothing,
    Move,
    Start,
    End,
}

#[derive(Debug, Clone)]
pub struct Moves<'a> {
    tree: &'a GameTree,
    work: Vec<Work>,
    last: Last,
}

impl<'a> Moves<'a> {
    /// The moves from the root down to `to`.
    pub fn path(tree: &'a GameTree, to: NodeId) -> Self {
        Self::along_path(tree, to, false)
    }

    /// Like [`Moves::path`], followed at every branch point by the list of
    /// all moves played there.
    pub fn path_with_sidelines(tree: &'a GameTree, to: NodeId) -> Self {
        Self::along_path(tree, to, true)
    }

    fn along_path(tree: &'a GameTree, to: NodeId, sidelines: bool) -> Self {
        let mut work = Vec::new();
        for &id in tree.path_from_root(to).iter().rev() {
            if tree.parent(id).is_none() {
                continue;
            }
            if sidelines && tree.parent(id).is_some_and(|p| tree.children(p).len() > 1) {
                work.push(Work::Alternatives(id));
            }
            work.push(Work::Move(id));
        }
        Self {
            tree,
            work,
            last: Last::Nothing,
        }
    }

    /// Every move in the tree, sidelines nested right after the move they
    /// are an alternative to.
    pub fn whole_tree(tree: &'a GameTree) -> Self {
        Self {
            tree,
            work: vec![Work::Continue(tree.root())],
            last: Last::Nothing,
        }
    }

    fn move_token(&self, id: NodeId) -> Option<MoveToken> {
        let node = self.tree.node(id)?;
        let number = node.move_number()?;
        let show_number = match number.color {
            Color::White => true,
            Color::Black => matches!(self.last, Last::Nothing | Last::End),
        };
        Some(MoveToken::Move {
            number,
            san: node.san()?.to_string(),
            show_number,
        })
    }
}

impl Iterator for Moves<'_> {
    type Item = MoveToken;

    fn next(&mut self) -> Option<MoveToken> {
        while let Some(work) = self.work.pop() {
            match work {
                Work::Move(id) => {
                    if let Some(token) = self.move_token(id) {
                        self.last = Last::Move;
                        return Some(token);
                    }
                }
                Work::Alternatives(id) => {
                    let Some(parent) = self.tree.parent(id) else {
                        continue;
                    };
                    let sans = self
                        .tree
                        .children(parent)
                        .iter()
                        .filter_map(|&c| self.tree.node(c)?.san().map(str::to_string))
                        .collect();
                    return Some(MoveToken::Alternatives(sans));
                }
                Work::Start => {
                    self.last = Last::Start;
                    return Some(MoveToken::StartVariation);
                }
                Work::End => {
                    self.last = Last::End;
                    return Some(MoveToken::EndVariation);
                }
                Work::Continue(id) => {
                    let children = self.tree.children(id);
                    let Some((&main, sidelines)) = children.split_first() else {
                        continue;
                    };
                    self.work.push(Work::Continue(main));
                    for &side in sidelines.iter().rev() {
                        self.work.push(Work::End);
                        self.work.push(Work::Continue(side));
                        self.work.push(Work::Move(side));
                        self.work.push(Work::Start);
                    }
                    self.work.push(Work::Move(main));
                }
            }
        }
        None
    }
}

/// Join tokens into one line: `1. e4 e5 <d5> 2. Nf3`.
pub fn render_moves<I>(tokens: I) -> String
where
    I: IntoIterator<Item = MoveToken>,
{
    let mut out = String::new();
    let mut glue = false;
    for token in tokens {
        if glue && token != MoveToken::EndVariation {
            out.push(' ');
        }
        glue = token != MoveToken::StartVariation;
        out.push_str(&token.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Game;
    use crate::game_tree::Placement;

    fn sample() -> Game {
        let mut game = Game::default();
        game.play(&["e4", "e5", "Nf3"], Placement::Default).unwrap();
        game.goto("1...", false).unwrap();
        game.play(&["c5", "Nf3"], Placement::Sideline).unwrap();
        game.goto("1...", false).unwrap();
        game.play(&["d5"], Placement::Sideline).unwrap();
        game
    }

    #[test]
    fn test_whole_tree() {
        let game = sample();
        assert_eq!(
            render_moves(Moves::whole_tree(game.tree())),
            "1. e4 e5 <c5 2. Nf3> <d5> 2. Nf3"
        );
    }

    #[test]
    fn test_path_and_summary() {
        let mut game = sample();
        game.goto("end", false).unwrap();
        assert_eq!(render_moves(game.moves(false)), "1. e4 d5");

        game.goto("start", false).unwrap();
        game.goto("Nf3", false).unwrap();
        let listing = Moves::path_with_sidelines(game.tree(), game.cursor());
        assert_eq!(render_moves(listing), "1. e4 e5 (e5; c5; d5) 2. Nf3");
    }

    #[test]
    fn test_restartable() {
        let game = sample();
        let listing = game.moves(true);
        let first: Vec<_> = listing.clone().collect();
        let second: Vec<_> = listing.collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_black_first_move_numbered() {
        let mut game =
            Game::from_fen("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1").unwrap();
        game.play(&["e5", "Nf3"], Placement::Default).unwrap();
        assert_eq!(render_moves(game.moves(false)), "1... e5 2. Nf3");
    }
}
