//! Branching move history.
//!
//! Nodes live in an arena owned by the tree. Each node owns its children
//! (by id) and keeps a plain id back-reference to its parent, so the
//! structure is a tree by construction. Deleted nodes leave an empty slot;
//! ids are never reused.

use std::collections::BTreeSet;
use std::time::Duration;

use shakmaty::{Chess, Move};

use crate::error::TreeError;
use crate::move_number::MoveNumber;
use crate::nag::Nag;
use crate::rules;
use crate::score::Score;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where a played move lands among its parent's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// First child if there are none, otherwise appended as a sideline.
    /// An existing child with the same move is reused in place.
    #[default]
    Default,
    /// Appended after the existing children; an existing match is left where it is.
    Sideline,
    /// Moved (or inserted) to index 0, superseding the previous mainline.
    Mainline,
}

/// One ply in the tree.
#[derive(Debug, Clone)]
pub struct GameNode {
    mv: Option<Move>,
    san: Option<String>,
    position: Chess,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub comment: Option<String>,
    pub eval: Option<Score>,
    pub nags: BTreeSet<Nag>,
    /// Time left for the player who made the move (`[%clk]`)
    pub clock: Option<Duration>,
}

impl GameNode {
    fn new(mv: Option<Move>, san: Option<String>, position: Chess, parent: Option<NodeId>) -> Self {
        Self {
            mv,
            san,
            position,
            parent,
            children: Vec::new(),
            comment: None,
            eval: None,
            nags: BTreeSet::new(),
            clock: None,
        }
    }

    /// The move that produced this node (`None` for the root).
    pub fn mv(&self) -> Option<Move> {
        self.mv
    }

    pub fn san(&self) -> Option<&str> {
        self.san.as_deref()
    }

    pub fn uci(&self) -> Option<String> {
        self.mv.map(rules::uci)
    }

    /// Position after the move.
    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Number of the move that produced this node.
    pub fn move_number(&self) -> Option<MoveNumber> {
        self.mv?;
        Some(MoveNumber::of_move_leading_to(
            rules::fullmove_number(&self.position),
            rules::side_to_move(&self.position),
        ))
    }
}

/// A position an engine can be asked about: the game's start position plus
/// the moves (UCI notation) leading to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionLine {
    pub start_fen: String,
    pub moves: Vec<String>,
    /// FEN of the resulting position
    pub fen: String,
}

impl PositionLine {
    pub fn white_to_move(&self) -> bool {
        self.fen.split_whitespace().nth(1) != Some("b")
    }

    pub fn starts_from_standard(&self) -> bool {
        self.start_fen == rules::STANDARD_START_FEN
    }
}

#[derive(Debug, Clone)]
pub struct GameTree {
    nodes: Vec<Option<GameNode>>,
    root: NodeId,
}

impl Default for GameTree {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl GameTree {
    pub fn new(start: Chess) -> Self {
        Self {
            nodes: vec![Some(GameNode::new(None, None, start, None))],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&GameNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GameNode> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn get(&self, id: NodeId) -> Result<&GameNode, TreeError> {
        self.node(id).ok_or(TreeError::InvalidNode)
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut GameNode, TreeError> {
        self.node_mut(id).ok_or(TreeError::InvalidNode)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Position of `id` among its siblings (0 = mainline continuation).
    pub fn sibling_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// True if every node from the root down to `id` is a first child.
    pub fn is_on_mainline(&self, id: NodeId) -> bool {
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            if self.children(parent).first() != Some(&node) {
                return false;
            }
            node = parent;
        }
        node == self.root
    }

    /// Number of plies from the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            depth += 1;
            node = parent;
        }
        depth
    }

    /// Nodes from the root down to `id`, both included.
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = vec![id];
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            path.push(parent);
            node = parent;
        }
        path.reverse();
        path
    }

    /// Follow first children from `id` to the end of the line.
    pub fn mainline_end(&self, id: NodeId) -> NodeId {
        let mut node = id;
        while let Some(&next) = self.children(node).first() {
            node = next;
        }
        node
    }

    pub fn find_child(&self, parent: NodeId, mv: Move) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&c| self.node(c).and_then(|n| n.mv) == Some(mv))
    }

    /// Add `mv` (already known to be legal) below `parent`, or reuse the
    /// child that already holds it.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mv: Move,
        placement: Placement,
    ) -> Result<NodeId, TreeError> {
        let child = match self.find_child(parent, mv) {
            Some(existing) => existing,
            None => {
                let before = self.get(parent)?.position.clone();
                let position = rules::apply(&before, mv)?;
                let san = rules::san(&before, mv);
                let id = NodeId(self.nodes.len());
                self.nodes
                    .push(Some(GameNode::new(Some(mv), Some(san), position, Some(parent))));
                self.get_mut(parent)?.children.push(id);
                id
            }
        };
        if placement == Placement::Mainline {
            self.promote(child, true)?;
        }
        Ok(child)
    }

    /// Move `id` one step earlier among its siblings, or to the front.
    pub fn promote(&mut self, id: NodeId, to_mainline: bool) -> Result<(), TreeError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(());
        };
        let siblings = &mut self.get_mut(parent)?.children;
        let Some(index) = siblings.iter().position(|&c| c == id) else {
            return Err(TreeError::InvalidNode);
        };
        if index == 0 {
            return Ok(());
        }
        if to_mainline {
            let node = siblings.remove(index);
            siblings.insert(0, node);
        } else {
            siblings.swap(index, index - 1);
        }
        Ok(())
    }

    /// Move `id` one step later among its siblings.
    pub fn demote(&mut self, id: NodeId) -> Result<(), TreeError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(());
        };
        let siblings = &mut self.get_mut(parent)?.children;
        let Some(index) = siblings.iter().position(|&c| c == id) else {
            return Err(TreeError::InvalidNode);
        };
        if index + 1 < siblings.len() {
            siblings.swap(index, index + 1);
        }
        Ok(())
    }

    /// Remove `id` and its whole subtree. The root cannot be deleted.
    /// Returns the number of removed nodes.
    pub fn delete(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let Some(parent) = self.get(id)?.parent else {
            return Err(TreeError::InvalidNode);
        };
        self.get_mut(parent)?.children.retain(|&c| c != id);

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(slot) = self.nodes.get_mut(node.0) {
                if let Some(taken) = slot.take() {
                    stack.extend(taken.children);
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    /// True if `ancestor` is `id` or lies on the path from the root to `id`.
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut node = Some(id);
        while let Some(current) = node {
            if current == ancestor {
                return true;
            }
            node = self.parent(current);
        }
        false
    }

    pub fn line_to(&self, id: NodeId) -> PositionLine {
        let path = self.path_from_root(id);
        let start_fen = self
            .node(self.root)
            .map(|n| rules::to_fen(&n.position))
            .unwrap_or_else(|| rules::STANDARD_START_FEN.to_string());
        let moves = path.iter().filter_map(|&n| self.node(n)?.uci()).collect();
        let fen = self
            .node(id)
            .map(|n| rules::to_fen(&n.position))
            .unwrap_or_else(|| start_fen.clone());
        PositionLine {
            start_fen,
            moves,
            fen,
        }
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.children(self.root).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(tree: &mut GameTree, from: NodeId, san: &str, placement: Placement) -> NodeId {
        let pos = tree.node(from).unwrap().position().clone();
        let mv = rules::parse_move(&pos, san).unwrap();
        tree.add_child(from, mv, placement).unwrap()
    }

    fn sans(tree: &GameTree, parent: NodeId) -> Vec<String> {
        tree.children(parent)
            .iter()
            .map(|&c| tree.node(c).unwrap().san().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_add_child_reuses_existing() {
        let mut tree = GameTree::default();
        let root = tree.root();
        let e4 = play(&mut tree, root, "e4", Placement::Default);
        let again = play(&mut tree, root, "e4", Placement::Default);
        assert_eq!(e4, again);
        assert_eq!(tree.children(root).len(), 1);
    }

    #[test]
    fn test_placement_order() {
        let mut tree = GameTree::default();
        let root = tree.root();
        play(&mut tree, root, "e4", Placement::Default);
        play(&mut tree, root, "d4", Placement::Sideline);
        play(&mut tree, root, "c4", Placement::Default);
        assert_eq!(sans(&tree, root), ["e4", "d4", "c4"]);

        let nf3 = play(&mut tree, root, "Nf3", Placement::Mainline);
        assert_eq!(sans(&tree, root), ["Nf3", "e4", "d4", "c4"]);
        assert!(tree.is_on_mainline(nf3));

        // An existing sideline becomes the mainline without duplication.
        play(&mut tree, root, "d4", Placement::Mainline);
        assert_eq!(sans(&tree, root), ["d4", "Nf3", "e4", "c4"]);
    }

    #[test]
    fn test_promote_demote() {
        let mut tree = GameTree::default();
        let root = tree.root();
        play(&mut tree, root, "e4", Placement::Default);
        play(&mut tree, root, "d4", Placement::Default);
        let c4 = play(&mut tree, root, "c4", Placement::Default);

        tree.promote(c4, false).unwrap();
        assert_eq!(sans(&tree, root), ["e4", "c4", "d4"]);
        tree.demote(c4).unwrap();
        tree.demote(c4).unwrap(); // already last: no-op
        assert_eq!(sans(&tree, root), ["e4", "d4", "c4"]);
        tree.promote(c4, true).unwrap();
        assert_eq!(sans(&tree, root), ["c4", "e4", "d4"]);
        // Root is a no-op
        tree.promote(root, true).unwrap();
    }

    #[test]
    fn test_delete_subtree() {
        let mut tree = GameTree::default();
        let root = tree.root();
        let e4 = play(&mut tree, root, "e4", Placement::Default);
        let e5 = play(&mut tree, e4, "e5", Placement::Default);
        play(&mut tree, e5, "Nf3", Placement::Default);
        play(&mut tree, root, "d4", Placement::Default);
        assert_eq!(tree.len(), 5);

        assert_eq!(tree.delete(e4).unwrap(), 3);
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(e5));
        assert_eq!(sans(&tree, root), ["d4"]);
        assert_eq!(tree.delete(root), Err(TreeError::InvalidNode));
    }

    #[test]
    fn test_node_position_follows_parent() {
        let mut tree = GameTree::default();
        let root = tree.root();
        let e4 = play(&mut tree, root, "e4", Placement::Default);
        let node = tree.node(e4).unwrap();
        let expected = rules::apply(
            tree.node(root).unwrap().position(),
            node.mv().unwrap(),
        )
        .unwrap();
        assert_eq!(rules::to_fen(node.position()), rules::to_fen(&expected));

        let line = tree.line_to(e4);
        assert_eq!(line.moves, ["e2e4"]);
        assert_eq!(line.start_fen, rules::STANDARD_START_FEN);
    }
}
