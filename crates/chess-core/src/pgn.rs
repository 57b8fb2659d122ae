//! PGN export and import for whole game trees, variations included.
//!
//! Import is a lightweight regex tokenizer rather than a full grammar: it
//! understands headers, move numbers, SAN (or UCI) moves, `{comments}`,
//! `(variations)`, NAGs (`$1` or a trailing `!?`) and the result token.
//! Evaluations and clocks travel inside comments as `[%eval 0.35]` /
//! `[%eval #3]` and `[%clk 0:02:52]`.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use shakmaty::Color;

use crate::error::TreeError;
use crate::game::Game;
use crate::game_data::GameMetadata;
use crate::game_tree::{GameNode, GameTree, NodeId, Placement};
use crate::nag::Nag;
use crate::rules;
use crate::score::Score;

const LINE_WIDTH: usize = 80;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\[(\w+)\s+"((?:[^"\\]|\\.)*)"\]\s*$"#).expect("static regex")
    })
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?s)\{(?P<comment>[^}]*)\}|(?P<open>\()|(?P<close>\))|(?P<nag>\$\d+)|(?P<result>1-0|0-1|1/2-1/2|\*)|(?P<number>\d+\.+)|(?P<san>[^\s(){}]+)",
        )
        .expect("static regex")
    })
}

fn eval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[%eval\s+([^\]\s]+)\s*\]").expect("static regex"))
}

fn clock_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[%clk\s+(\d+):(\d{1,2}):(\d{1,2}(?:\.\d+)?)\s*\]").expect("static regex")
    })
}

// ---- Export ----

/// Render the game as PGN: headers, then the mainline with every sideline.
pub fn export(game: &Game) -> String {
    let tree = game.tree();
    let mut out = String::new();
    for (key, value) in game.metadata.tags() {
        out.push_str(&format!("[{key} \"{}\"]\n", escape(&value)));
    }
    if let Some(fen) = game.custom_start_fen() {
        out.push_str("[SetUp \"1\"]\n");
        out.push_str(&format!("[FEN \"{fen}\"]\n"));
    }
    out.push('\n');

    let mut tokens = Vec::new();
    if let Some(text) = tree.node(tree.root()).and_then(comment_text) {
        tokens.push(text);
    }
    write_continuation(tree, tree.root(), true, &mut tokens);
    tokens.push(game.metadata.result.clone());

    out.push_str(&wrap(&tokens));
    out.push('\n');
    out
}

/// Emit the mainline below `node`, with each sideline in parentheses
/// right after the move it replaces.
fn write_continuation(tree: &GameTree, node: NodeId, mut force_number: bool, out: &mut Vec<String>) {
    let mut current = node;
    loop {
        let children = tree.children(current);
        let Some((&main, sidelines)) = children.split_first() else {
            return;
        };
        let Some(main_node) = tree.node(main) else {
            return;
        };
        out.push(move_text(main_node, force_number));
        out.extend(main_node.nags.iter().map(Nag::to_string));
        force_number = false;
        if let Some(text) = comment_text(main_node) {
            out.push(text);
            force_number = true;
        }
        for &side in sidelines {
            let Some(side_node) = tree.node(side) else {
                continue;
            };
            out.push(format!("({}", move_text(side_node, true)));
            out.extend(side_node.nags.iter().map(Nag::to_string));
            let comment = comment_text(side_node);
            let comment_ended = comment.is_some();
            out.extend(comment);
            write_continuation(tree, side, comment_ended, out);
            if let Some(last) = out.last_mut() {
                last.push(')');
            }
            force_number = true;
        }
        current = main;
    }
}

fn move_text(node: &GameNode, force_number: bool) -> String {
    let san = node.san().unwrap_or_default();
    match node.move_number() {
        Some(number) if number.color == Color::White || force_number => format!("{number} {san}"),
        _ => san.to_string(),
    }
}

fn comment_text(node: &GameNode) -> Option<String> {
    let parts: Vec<String> = [
        node.clock.map(|d| format!("[%clk {}]", clock_text(d))),
        node.eval.map(|s| format!("[%eval {}]", s.to_pgn_eval())),
        node.comment
            .as_deref()
            .map(|c| c.replace('}', ")"))
            .filter(|c| !c.is_empty()),
    ]
    .into_iter()
    .flatten()
    .collect();
    (!parts.is_empty()).then(|| format!("{{{}}}", parts.join(" ")))
}

/// `h:mm:ss`, whole seconds.
fn clock_text(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

fn parse_clock(caps: &regex::Captures<'_>) -> Option<Duration> {
    let hours: u64 = caps[1].parse().ok()?;
    let minutes: u64 = caps[2].parse().ok()?;
    let seconds: f64 = caps[3].parse().ok()?;
    let whole = hours.checked_mul(3600)?.checked_add(minutes * 60)?;
    Duration::from_secs(whole).checked_add(Duration::try_from_secs_f64(seconds).ok()?)
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn unescape(value: &str) -> String {
    value.replace("\\\"", "\"").replace("\\\\", "\\")
}

fn wrap(tokens: &[String]) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
            out.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        out.push_str(token);
        line_len += token.len();
    }
    out
}

// ---- Import ----

/// Parse the first game in `pgn`. The cursor of the returned game is at
/// the root.
pub fn import(pgn: &str) -> Result<Game, TreeError> {
    let mut metadata = GameMetadata::default();
    let mut fen = None;
    let mut movetext = String::new();

    for line in pgn.lines() {
        let trimmed = line.trim();
        if movetext.trim().is_empty() && trimmed.starts_with('[') {
            let caps = header_re()
                .captures(trimmed)
                .ok_or_else(|| TreeError::Pgn(format!("malformed header: {trimmed}")))?;
            let value = unescape(&caps[2]);
            match &caps[1] {
                "FEN" => fen = Some(value),
                "SetUp" => {}
                key => {
                    metadata.set_tag(key, &value);
                }
            }
            continue;
        }
        // `;` comments run to the end of the line.
        let text = match trimmed.find(';') {
            Some(i) if !trimmed[..i].contains('{') => &trimmed[..i],
            _ => trimmed,
        };
        movetext.push_str(text);
        movetext.push('\n');
    }

    let start = match &fen {
        Some(fen) => rules::from_fen(fen)?,
        None => shakmaty::Chess::default(),
    };
    let mut tree = GameTree::new(start);
    let mut current = tree.root();
    let mut stack: Vec<NodeId> = Vec::new();
    let mut result_token = None;

    for caps in token_re().captures_iter(&movetext) {
        if let Some(comment) = caps.name("comment") {
            attach_comment(&mut tree, current, comment.as_str())?;
        } else if caps.name("open").is_some() {
            let parent = tree
                .parent(current)
                .ok_or_else(|| TreeError::Pgn("variation before any move".to_string()))?;
            stack.push(current);
            current = parent;
        } else if caps.name("close").is_some() {
            current = stack
                .pop()
                .ok_or_else(|| TreeError::Pgn("unbalanced ')'".to_string()))?;
        } else if let Some(result) = caps.name("result") {
            result_token = Some(result.as_str().to_string());
            break;
        } else if let Some(nag) = caps.name("nag") {
            let nag: Nag = nag.as_str().parse()?;
            if current != tree.root() {
                tree.node_mut(current).ok_or(TreeError::InvalidNode)?.nags.insert(nag);
            }
        } else if let Some(token) = caps.name("san") {
            let (san, glyph) = Nag::split_suffix(token.as_str());
            let position = tree
                .node(current)
                .ok_or(TreeError::InvalidNode)?
                .position()
                .clone();
            let mv = rules::parse_move(&position, san)
                .ok_or_else(|| TreeError::Pgn(format!("illegal move in movetext: {san}")))?;
            current = tree.add_child(current, mv, Placement::Default)?;
            if let Some(nag) = glyph {
                tree.node_mut(current).ok_or(TreeError::InvalidNode)?.nags.insert(nag);
            }
        }
        // Move numbers carry nothing the tree keeps.
    }

    if !stack.is_empty() {
        return Err(TreeError::Pgn("unclosed variation".to_string()));
    }
    if metadata.result == "*" {
        if let Some(result) = result_token {
            metadata.result = result;
        }
    }
    Ok(Game::from_tree(tree, metadata))
}

fn attach_comment(tree: &mut GameTree, id: NodeId, raw: &str) -> Result<(), TreeError> {
    let node = tree.node_mut(id).ok_or(TreeError::InvalidNode)?;
    if let Some(caps) = eval_re().captures(raw) {
        node.eval = Score::from_pgn_eval(&caps[1]);
    }
    if let Some(caps) = clock_re().captures(raw) {
        node.clock = parse_clock(&caps);
    }
    let text = eval_re().replace_all(raw, "");
    let text = clock_re().replace_all(&text, "");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !text.is_empty() {
        node.comment = Some(match node.comment.take() {
            Some(existing) => format!("{existing} {text}"),
            None => text,
        });
    }
    Ok(())
}
