//! A game: the move tree, a cursor into it, and the game's metadata.
//!
//! All cursor movement and structural edits go through [`Game`]. While a
//! match holds the game (see [`Game::acquire_hold`]) every manual edit or
//! cursor move fails with [`TreeError::Busy`]; the holder mutates through the
//! `*_held` variants instead.

use std::collections::VecDeque;
use std::time::Duration;

use shakmaty::Chess;
use tracing::debug;

use crate::error::TreeError;
use crate::game_data::GameMetadata;
use crate::game_tree::{GameNode, GameTree, NodeId, Placement, PositionLine};
use crate::move_number::MoveNumber;
use crate::moves::Moves;
use crate::nag::Nag;
use crate::rules;
use crate::score::Score;

/// Exclusive right to mutate a held game. Not `Clone`: only one holder exists.
#[derive(Debug)]
pub struct Hold {
    id: u64,
}

#[derive(Debug, Clone)]
pub struct Game {
    tree: GameTree,
    cursor: NodeId,
    pub metadata: GameMetadata,
    holder: Option<u64>,
    next_hold: u64,
}

impl Default for Game {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl Game {
    pub fn new(start: Chess) -> Self {
        let tree = GameTree::new(start);
        let cursor = tree.root();
        Self {
            tree,
            cursor,
            metadata: GameMetadata::default(),
            holder: None,
            next_hold: 1,
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, TreeError> {
        Ok(Self::new(rules::from_fen(fen)?))
    }

    /// Build a game around an existing tree (used by PGN import).
    pub fn from_tree(tree: GameTree, metadata: GameMetadata) -> Self {
        let cursor = tree.root();
        Self {
            tree,
            cursor,
            metadata,
            holder: None,
            next_hold: 1,
        }
    }

    pub fn tree(&self) -> &GameTree {
        &self.tree
    }

    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    pub fn current(&self) -> &GameNode {
        // The cursor always points at a live node: deletion relocates it first.
        match self.tree.node(self.cursor) {
            Some(node) => node,
            None => unreachable!("cursor points at a deleted node"),
        }
    }

    pub fn position(&self) -> &Chess {
        self.current().position()
    }

    pub fn fen(&self) -> String {
        rules::to_fen(self.position())
    }

    pub fn line(&self) -> PositionLine {
        self.tree.line_to(self.cursor)
    }

    /// Start FEN if the game does not start from the standard position.
    pub fn custom_start_fen(&self) -> Option<String> {
        let root = self.tree.node(self.tree.root())?;
        let fen = rules::to_fen(root.position());
        (fen != rules::STANDARD_START_FEN).then_some(fen)
    }

    // ---- Holding ----

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    pub fn acquire_hold(&mut self) -> Result<Hold, TreeError> {
        if self.holder.is_some() {
            return Err(TreeError::Busy);
        }
        let id = self.next_hold;
        self.next_hold += 1;
        self.holder = Some(id);
        Ok(Hold { id })
    }

    pub fn release_hold(&mut self, hold: Hold) {
        if self.holder == Some(hold.id) {
            self.holder = None;
        }
    }

    fn ensure_free(&self) -> Result<(), TreeError> {
        if self.holder.is_some() {
            Err(TreeError::Busy)
        } else {
            Ok(())
        }
    }

    fn ensure_holder(&self, hold: &Hold) -> Result<(), TreeError> {
        if self.holder == Some(hold.id) {
            Ok(())
        } else {
            Err(TreeError::Busy)
        }
    }

    // ---- Playing moves ----

    /// Play a sequence of moves from the cursor. Either every move is legal
    /// and all are applied, or nothing changes and the index of the first
    /// illegal move is reported. The cursor ends on the last played node.
    ///
    /// With [`Placement::Sideline`] the first move is played from the
    /// cursor's parent, i.e. as an alternative to the current move.
    pub fn play(&mut self, moves: &[&str], placement: Placement) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        self.apply_moves(moves, placement)
    }

    pub fn play_held(
        &mut self,
        hold: &Hold,
        moves: &[&str],
        placement: Placement,
    ) -> Result<NodeId, TreeError> {
        self.ensure_holder(hold)?;
        self.apply_moves(moves, placement)
    }

    fn apply_moves(
        &mut self,
        moves: &[&str],
        placement: Placement,
    ) -> Result<NodeId, TreeError> {
        if moves.is_empty() {
            return Ok(self.cursor);
        }
        let start = match placement {
            Placement::Sideline => self
                .tree
                .parent(self.cursor)
                .ok_or(TreeError::RootHasNoSiblings)?,
            _ => self.cursor,
        };

        // Validate the whole batch before touching the tree.
        let mut pos = self
            .tree
            .node(start)
            .ok_or(TreeError::InvalidNode)?
            .position()
            .clone();
        let mut parsed = Vec::with_capacity(moves.len());
        for (index, text) in moves.iter().enumerate() {
            let mv = rules::parse_move(&pos, text).ok_or_else(|| TreeError::IllegalMove {
                index,
                mv: text.to_string(),
            })?;
            pos = rules::apply(&pos, mv).map_err(|_| TreeError::IllegalMove {
                index,
                mv: text.to_string(),
            })?;
            parsed.push(mv);
        }

        let mut node = start;
        for (i, mv) in parsed.into_iter().enumerate() {
            let step = match placement {
                Placement::Mainline => Placement::Mainline,
                Placement::Sideline if i == 0 => Placement::Sideline,
                _ => Placement::Default,
            };
            node = self.tree.add_child(node, mv, step)?;
        }
        debug!(count = moves.len(), node = ?node, "played moves");
        self.cursor = node;
        Ok(node)
    }

    // ---- Jumping ----

    /// Jump to the node described by `query`: "start"/"s", "end"/"e", a move
    /// number ("8..."), a move ("Nxe5") or both ("8...Nxe5").
    ///
    /// The search runs forwards from the cursor first (the cursor's own
    /// line, then its siblings and the mainline ahead; every branch when
    /// `recurse` is set), breadth-first so the shallowest match wins. At
    /// the same depth the cursor's line comes first, then the mainline. If
    /// nothing ahead matches, the cursor's ancestors are searched, nearest
    /// first.
    pub fn goto(&mut self, query: &str, recurse: bool) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        let target = self.find(query, recurse)?;
        self.cursor = target;
        Ok(target)
    }

    pub fn goto_node(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        if !self.tree.contains(id) {
            return Err(TreeError::InvalidNode);
        }
        self.cursor = id;
        Ok(id)
    }

    /// Resolve a goto query without moving the cursor.
    pub fn find(&self, query: &str, recurse: bool) -> Result<NodeId, TreeError> {
        let not_found = || TreeError::NotFound(query.to_string());
        match query.trim() {
            "s" | "start" => return Ok(self.tree.root()),
            "e" | "end" => return Ok(self.tree.mainline_end(self.cursor)),
            "" => return Err(not_found()),
            _ => {}
        }

        let (number, san) = MoveNumber::split_prefix(query.trim());
        let matches = |id: NodeId| -> bool {
            if id == self.cursor {
                return false;
            }
            let Some(node) = self.tree.node(id) else {
                return false;
            };
            if let Some(wanted) = number {
                if node.move_number() != Some(wanted) {
                    return false;
                }
            }
            if let Some(text) = san {
                let Some(parent) = node.parent().and_then(|p| self.tree.node(p)) else {
                    return false;
                };
                if rules::parse_move(parent.position(), text) != node.mv() {
                    return false;
                }
            }
            node.mv().is_some()
        };

        let cursor_number = self.current().move_number();
        let search_forwards = match (number, cursor_number) {
            (Some(wanted), Some(current)) => wanted >= current,
            _ => true,
        };

        if search_forwards {
            let mut queue = VecDeque::from([self.cursor]);
            if let Some(parent) = self.tree.parent(self.cursor) {
                queue.extend(
                    self.tree
                        .children(parent)
                        .iter()
                        .copied()
                        .filter(|&id| id != self.cursor),
                );
            }
            while let Some(id) = queue.pop_front() {
                if matches(id) {
                    return Ok(id);
                }
                if let (Some(wanted), Some(at)) =
                    (number, self.tree.node(id).and_then(GameNode::move_number))
                {
                    if at > wanted {
                        continue;
                    }
                }
                let expand = id == self.cursor
                    || recurse
                    || self.tree.sibling_index(id) == Some(0);
                if expand {
                    queue.extend(self.tree.children(id).iter().copied());
                }
            }
        }

        let mut node = self.tree.parent(self.cursor);
        while let Some(id) = node {
            if matches(id) {
                return Ok(id);
            }
            if let (Some(wanted), Some(at)) =
                (number, self.tree.node(id).and_then(GameNode::move_number))
            {
                if at < wanted {
                    break;
                }
            }
            node = self.tree.parent(id);
        }
        Err(not_found())
    }

    // ---- Pointer navigation (no-ops at the boundaries) ----

    pub fn back(&mut self) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        if let Some(parent) = self.tree.parent(self.cursor) {
            self.cursor = parent;
        }
        Ok(self.cursor)
    }

    pub fn forward(&mut self) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        if let Some(&next) = self.tree.children(self.cursor).first() {
            self.cursor = next;
        }
        Ok(self.cursor)
    }

    pub fn previous_sideline(&mut self) -> Result<NodeId, TreeError> {
        self.step_sideline(-1)
    }

    pub fn next_sideline(&mut self) -> Result<NodeId, TreeError> {
        self.step_sideline(1)
    }

    fn step_sideline(&mut self, step: isize) -> Result<NodeId, TreeError> {
        self.ensure_free()?;
        let (Some(parent), Some(index)) = (
            self.tree.parent(self.cursor),
            self.tree.sibling_index(self.cursor),
        ) else {
            return Ok(self.cursor);
        };
        let siblings = self.tree.children(parent);
        if let Some(&target) = index
            .checked_add_signed(step)
            .and_then(|i| siblings.get(i))
        {
            self.cursor = target;
        }
        Ok(self.cursor)
    }

    // ---- Structural edits ----

    pub fn promote(&mut self, id: NodeId, to_mainline: bool) -> Result<(), TreeError> {
        self.ensure_free()?;
        self.tree.promote(id, to_mainline)
    }

    pub fn demote(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.ensure_free()?;
        self.tree.demote(id)
    }

    /// Delete `id` with its subtree. If the cursor was inside it, the cursor
    /// moves to the next sibling, else the previous sibling, else the parent.
    pub fn delete(&mut self, id: NodeId) -> Result<usize, TreeError> {
        self.ensure_free()?;
        let parent = self.tree.parent(id).ok_or(TreeError::InvalidNode)?;
        if self.tree.is_ancestor(id, self.cursor) {
            let siblings = self.tree.children(parent);
            let index = siblings.iter().position(|&c| c == id).unwrap_or(0);
            self.cursor = siblings
                .get(index + 1)
                .or_else(|| index.checked_sub(1).and_then(|i| siblings.get(i)))
                .copied()
                .unwrap_or(parent);
        }
        self.tree.delete(id)
    }

    // ---- Annotations ----

    pub fn set_comment(&mut self, id: NodeId, comment: Option<String>) -> Result<(), TreeError> {
        self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.comment = comment;
        Ok(())
    }

    /// Add `text` to the node's comment unless it is already there.
    pub fn append_comment(&mut self, id: NodeId, text: &str) -> Result<(), TreeError> {
        let node = self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?;
        node.comment = match node.comment.take() {
            Some(existing) if existing.contains(text) => Some(existing),
            Some(existing) if !existing.trim().is_empty() => Some(format!("{} {text}", existing.trim_end())),
            _ => Some(text.to_string()),
        };
        Ok(())
    }

    pub fn set_eval(&mut self, id: NodeId, eval: Option<Score>) -> Result<(), TreeError> {
        self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.eval = eval;
        Ok(())
    }

    pub fn set_clock(&mut self, id: NodeId, clock: Option<Duration>) -> Result<(), TreeError> {
        self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.clock = clock;
        Ok(())
    }

    pub fn add_nag(&mut self, id: NodeId, nag: Nag) -> Result<(), TreeError> {
        self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.nags.insert(nag);
        Ok(())
    }

    /// Returns whether the NAG was set.
    pub fn remove_nag(&mut self, id: NodeId, nag: Nag) -> Result<bool, TreeError> {
        Ok(self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.nags.remove(&nag))
    }

    pub fn clear_nags(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.tree.node_mut(id).ok_or(TreeError::InvalidNode)?.nags.clear();
        Ok(())
    }

    /// The cursor or its nearest ancestor with the position `fen`.
    pub fn find_position(&self, fen: &str) -> Option<NodeId> {
        let mut node = Some(self.cursor);
        while let Some(id) = node {
            let found = self
                .tree
                .node(id)
                .is_some_and(|n| rules::to_fen(n.position()) == fen);
            if found {
                return Some(id);
            }
            node = self.tree.parent(id);
        }
        None
    }

    // ---- Listing ----

    /// Move tokens along the path from the root to the cursor, or the whole
    /// tree when `recurse` is set.
    pub fn moves(&self, recurse: bool) -> Moves<'_> {
        if recurse {
            Moves::whole_tree(&self.tree)
        } else {
            Moves::path(&self.tree, self.cursor)
        }
    }

    /// Path to the cursor with every branch point's alternatives listed.
    pub fn moves_with_sidelines(&self) -> Moves<'_> {
        Moves::path_with_sidelines(&self.tree, self.cursor)
    }
}
