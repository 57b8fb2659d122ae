//! XBoard (CECP v2) command building and output parsing.

use std::sync::OnceLock;
use std::time::Duration;

use chess_core::{PositionLine, Score};
use regex::Regex;

use super::EngineEvent;
use crate::analysis::{AnalysisInfo, AnalysisLimits, BestMove, SearchLimits};
use crate::options::{OptionKind, OptionSpec, OptionValue};

/// Scores at or beyond this magnitude encode a forced mate.
const MATE_SCORE: i32 = 100_000;

fn feature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(\w+)=(?:"([^"]*)"|(\S+))"#).expect("static regex"))
}

pub(super) fn set_option(spec: &OptionSpec, value: &OptionValue) -> String {
    if spec.is_button() {
        return format!("option {}", spec.name);
    }
    let value = match value {
        OptionValue::Bool(b) => u8::from(*b).to_string(),
        other => other.to_string(),
    };
    format!("option {}={value}", spec.name)
}

pub(super) fn position(line: &PositionLine, usermove: bool) -> Vec<String> {
    let mut cmds = vec![
        "new".to_string(),
        "force".to_string(),
        format!("setboard {}", line.start_fen),
    ];
    for mv in &line.moves {
        if usermove {
            cmds.push(format!("usermove {mv}"));
        } else {
            cmds.push(mv.clone());
        }
    }
    cmds
}

fn seconds(d: Duration) -> u64 {
    d.as_secs().max(1)
}

fn centis(d: Duration) -> u128 {
    d.as_millis() / 10
}

pub(super) fn go(limits: &SearchLimits, white_to_move: bool) -> Vec<String> {
    let mut cmds = Vec::new();
    if let Some(clock) = limits.clock {
        let (own, other, inc) = if white_to_move {
            (clock.white, clock.black, clock.white_increment)
        } else {
            (clock.black, clock.white, clock.black_increment)
        };
        let secs = own.as_secs();
        cmds.push(format!("level 0 {}:{:02} {}", secs / 60, secs % 60, inc.as_secs()));
        cmds.push(format!("time {}", centis(own)));
        cmds.push(format!("otim {}", centis(other)));
    }
    if let Some(t) = limits.movetime {
        cmds.push(format!("st {}", seconds(t)));
    }
    if let Some(d) = limits.depth {
        cmds.push(format!("sd {d}"));
    }
    cmds.push("post".to_string());
    cmds.push("go".to_string());
    cmds
}

pub(super) fn analyze(limits: &AnalysisLimits) -> Vec<String> {
    let mut cmds = Vec::new();
    if let Some(d) = limits.depth {
        cmds.push(format!("sd {d}"));
    }
    cmds.push("post".to_string());
    cmds.push("analyze".to_string());
    cmds
}

pub(super) fn parse_line(line: &str) -> Vec<EngineEvent> {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    let Some(first) = parts.next() else {
        return Vec::new();
    };
    match first {
        "feature" => parse_features(trimmed),
        "pong" => vec![EngineEvent::Ready],
        "move" => parts
            .next()
            .map(|mv| {
                EngineEvent::BestMove(BestMove {
                    mv: mv.to_string(),
                    ponder: None,
                })
            })
            .into_iter()
            .collect(),
        _ if first.starts_with(|c: char| c.is_ascii_digit()) => {
            parse_thinking(trimmed).map(EngineEvent::Info).into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn parse_features(line: &str) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    for caps in feature_re().captures_iter(line) {
        let name = caps[1].to_string();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let derived = match name.as_str() {
            "myname" => Some(EngineEvent::Id(value.clone())),
            "option" => parse_option(&value).map(EngineEvent::Option),
            "done" if value == "1" => Some(EngineEvent::HandshakeDone),
            _ => None,
        };
        if name != "done" {
            events.push(EngineEvent::Feature { name, value });
        }
        events.extend(derived);
    }
    events
}

/// `Hash -spin 64 1 1024`, `Ponder -check 0`, `Style -combo Solid /// *Normal /// Risky`
fn parse_option(text: &str) -> Option<OptionSpec> {
    let (name, rest) = text.split_once(" -")?;
    let (kind, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args: Vec<&str> = args.split_whitespace().collect();
    let int = |i: usize| args.get(i).and_then(|v| v.parse::<i64>().ok());
    let kind = match kind {
        "check" => OptionKind::Check {
            default: args.first() == Some(&"1"),
        },
        "spin" | "slider" => OptionKind::Spin {
            default: int(0)?,
            min: int(1)?,
            max: int(2)?,
        },
        "combo" => {
            let text = args.join(" ");
            let choices: Vec<&str> = text.split("///").map(str::trim).collect();
            let default = choices
                .iter()
                .find_map(|c| c.strip_prefix('*'))
                .or_else(|| choices.first().copied())
                .unwrap_or_default()
                .to_string();
            OptionKind::Combo {
                default,
                vars: choices
                    .iter()
                    .map(|c| c.trim_start_matches('*').to_string())
                    .collect(),
            }
        }
        "button" | "save" | "reset" => OptionKind::Button,
        "string" | "file" | "path" => OptionKind::String {
            default: args.join(" "),
        },
        _ => return None,
    };
    Some(OptionSpec {
        name: name.trim().to_string(),
        kind,
    })
}

/// `12 35 120 1000000 e2e4 e7e5`: depth, score (cp), time (cs), nodes, pv.
fn parse_thinking(line: &str) -> Option<AnalysisInfo> {
    let mut parts = line.split_whitespace();
    let depth: u32 = parts
        .next()?
        .trim_end_matches(|c: char| !c.is_ascii_digit())
        .parse()
        .ok()?;
    let raw: i32 = parts.next()?.parse().ok()?;
    let time_cs: u64 = parts.next()?.parse().ok()?;
    let nodes: u64 = parts.next()?.parse().ok()?;
    let pv = parts
        .filter(|m| !m.ends_with('.') && !m.starts_with(|c: char| c.is_ascii_digit()))
        .map(str::to_string)
        .collect();

    let magnitude = raw.checked_abs().unwrap_or(i32::MAX);
    let score = if magnitude >= MATE_SCORE {
        let moves = (magnitude - MATE_SCORE).max(1);
        Score::Mate(moves * raw.signum())
    } else {
        Score::Cp(raw)
    };
    let time = Duration::from_millis(time_cs.saturating_mul(10));
    let nps = (time_cs > 0).then(|| nodes.saturating_mul(100) / time_cs);
    Some(AnalysisInfo {
        multipv: 1,
        depth: Some(depth),
        score: Some(score),
        pv,
        nodes: Some(nodes),
        nps,
        time: Some(time),
        ..AnalysisInfo::default()
    })
}
