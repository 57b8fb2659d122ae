//! UCI command building and output parsing.

use std::time::Duration;

use chess_core::{PositionLine, Score};

use super::{millis, EngineEvent};
use crate::analysis::{AnalysisInfo, AnalysisLimits, BestMove, SearchLimits};
use crate::options::{OptionKind, OptionSpec, OptionValue};

pub(super) fn set_option(spec: &OptionSpec, value: &OptionValue) -> String {
    if spec.is_button() {
        format!("setoption name {}", spec.name)
    } else {
        format!("setoption name {} value {value}", spec.name)
    }
}

pub(super) fn position(line: &PositionLine) -> String {
    let mut cmd = if line.starts_from_standard() {
        "position startpos".to_string()
    } else {
        format!("position fen {}", line.start_fen)
    };
    if !line.moves.is_empty() {
        cmd.push_str(" moves ");
        cmd.push_str(&line.moves.join(" "));
    }
    cmd
}

pub(super) fn go(limits: &SearchLimits) -> String {
    let mut cmd = "go".to_string();
    if let Some(clock) = limits.clock {
        cmd.push_str(&format!(
            " wtime {} btime {} winc {} binc {}",
            millis(clock.white),
            millis(clock.black),
            clock.white_increment.as_millis(),
            clock.black_increment.as_millis()
        ));
    }
    if let Some(t) = limits.movetime {
        cmd.push_str(&format!(" movetime {}", millis(t)));
    }
    if let Some(d) = limits.depth {
        cmd.push_str(&format!(" depth {d}"));
    }
    if let Some(n) = limits.nodes {
        cmd.push_str(&format!(" nodes {n}"));
    }
    cmd
}

pub(super) fn analyze(limits: &AnalysisLimits) -> String {
    let mut cmd = "go".to_string();
    if let Some(d) = limits.depth {
        cmd.push_str(&format!(" depth {d}"));
    }
    if let Some(n) = limits.nodes {
        cmd.push_str(&format!(" nodes {n}"));
    }
    if let Some(m) = limits.mate {
        cmd.push_str(&format!(" mate {m}"));
    }
    if let Some(t) = limits.time {
        cmd.push_str(&format!(" movetime {}", millis(t)));
    }
    if cmd == "go" {
        cmd.push_str(" infinite");
    }
    cmd
}

pub(super) fn parse_line(line: &str) -> Option<EngineEvent> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "id" => {
            if parts.next()? != "name" {
                return None;
            }
            Some(EngineEvent::Id(parts.collect::<Vec<_>>().join(" ")))
        }
        "option" => parse_option(line).map(EngineEvent::Option),
        "uciok" => Some(EngineEvent::HandshakeDone),
        "readyok" => Some(EngineEvent::Ready),
        "info" => parse_info(line).map(EngineEvent::Info),
        "bestmove" => {
            let mv = parts.next()?.to_string();
            let ponder = match parts.next() {
                Some("ponder") => parts.next().map(str::to_string),
                _ => None,
            };
            Some(EngineEvent::BestMove(BestMove { mv, ponder }))
        }
        _ => None,
    }
}

/// `option name Clear Hash type button`
/// `option name Hash type spin default 16 min 1 max 33554432`
fn parse_option(line: &str) -> Option<OptionSpec> {
    const KEYWORDS: [&str; 6] = ["name", "type", "default", "min", "max", "var"];

    let mut name = Vec::new();
    let mut kind = None;
    let mut default: Option<Vec<&str>> = None;
    let mut min = None;
    let mut max = None;
    let mut vars: Vec<Vec<&str>> = Vec::new();

    let mut key = "";
    for token in line.split_whitespace().skip(1) {
        if KEYWORDS.contains(&token) && !(key == "name" && name.is_empty()) {
            key = token;
            match key {
                "default" => default = Some(Vec::new()),
                "var" => vars.push(Vec::new()),
                _ => {}
            }
            continue;
        }
        match key {
            "name" => name.push(token),
            "type" => kind = Some(token),
            "default" => default.get_or_insert_with(Vec::new).push(token),
            "min" => min = token.parse::<i64>().ok(),
            "max" => max = token.parse::<i64>().ok(),
            "var" => {
                if let Some(var) = vars.last_mut() {
                    var.push(token);
                }
            }
            _ => {}
        }
    }

    let name = name.join(" ");
    if name.is_empty() {
        return None;
    }
    let default = default.map(|d| d.join(" ")).unwrap_or_default();
    let kind = match kind? {
        "check" => OptionKind::Check {
            default: default == "true",
        },
        "spin" => OptionKind::Spin {
            default: default.parse().unwrap_or(0),
            min: min.unwrap_or(i64::MIN),
            max: max.unwrap_or(i64::MAX),
        },
        "combo" => OptionKind::Combo {
            default,
            vars: vars.into_iter().map(|v| v.join(" ")).collect(),
        },
        "button" => OptionKind::Button,
        "string" => OptionKind::String {
            default: if default == "<empty>" {
                String::new()
            } else {
                default
            },
        },
        _ => return None,
    };
    Some(OptionSpec { name, kind })
}

/// `info depth 20 seldepth 25 multipv 1 score cp 35 nodes 100000 nps 1000000 time 100 pv e2e4 e7e5`
fn parse_info(line: &str) -> Option<AnalysisInfo> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let mut info = AnalysisInfo {
        multipv: 1,
        ..AnalysisInfo::default()
    };
    let mut i = 1;
    while i < parts.len() {
        let value = parts.get(i + 1).copied();
        match parts[i] {
            "string" => return None,
            "depth" => info.depth = value.and_then(|v| v.parse().ok()),
            "seldepth" => info.seldepth = value.and_then(|v| v.parse().ok()),
            "multipv" => info.multipv = value.and_then(|v| v.parse().ok()).unwrap_or(1),
            "nodes" => info.nodes = value.and_then(|v| v.parse().ok()),
            "nps" => info.nps = value.and_then(|v| v.parse().ok()),
            "time" => {
                info.time = value
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_millis)
            }
            "score" => {
                let amount = parts.get(i + 2).and_then(|v| v.parse().ok());
                info.score = match (value, amount) {
                    (Some("cp"), Some(cp)) => Some(Score::Cp(cp)),
                    (Some("mate"), Some(m)) => Some(Score::Mate(m)),
                    _ => None,
                };
                i += 3;
                continue;
            }
            "pv" => {
                info.pv = parts[i + 1..].iter().map(|m| m.to_string()).collect();
                break;
            }
            "lowerbound" | "upperbound" => {
                i += 1;
                continue;
            }
            _ => {}
        }
        i += 2;
    }
    if info.score.is_none() && info.pv.is_empty() {
        return None;
    }
    Some(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let line = "info depth 20 seldepth 25 multipv 2 score cp -35 upperbound nodes 100000 nps 500000 time 200 pv e2e4 e7e5 g1f3";
        let Some(EngineEvent::Info(info)) = parse_line(line) else {
            panic!("expected info");
        };
        assert_eq!(info.depth, Some(20));
        assert_eq!(info.seldepth, Some(25));
        assert_eq!(info.multipv, 2);
        assert_eq!(info.score, Some(Score::Cp(-35)));
        assert_eq!(info.nodes, Some(100000));
        assert_eq!(info.nps, Some(500000));
        assert_eq!(info.time, Some(Duration::from_millis(200)));
        assert_eq!(info.pv, vec!["e2e4", "e7e5", "g1f3"]);
    }

    #[test]
    fn test_parse_info_mate_and_noise() {
        let Some(EngineEvent::Info(info)) =
            parse_line("info depth 5 score mate -3 pv h7h6")
        else {
            panic!("expected info");
        };
        assert_eq!(info.score, Some(Score::Mate(-3)));
        assert_eq!(info.multipv, 1);

        assert_eq!(parse_line("info string NNUE enabled"), None);
        assert_eq!(parse_line("info depth 12 currmove e2e4 currmovenumber 1"), None);
    }

    #[test]
    fn test_parse_options() {
        let Some(EngineEvent::Option(spin)) =
            parse_line("option name Hash type spin default 16 min 1 max 33554432")
        else {
            panic!("expected option");
        };
        assert_eq!(
            spin.kind,
            OptionKind::Spin {
                default: 16,
                min: 1,
                max: 33554432
            }
        );

        let Some(EngineEvent::Option(button)) = parse_line("option name Clear Hash type button")
        else {
            panic!("expected option");
        };
        assert_eq!(button.name, "Clear Hash");
        assert_eq!(button.kind, OptionKind::Button);

        let Some(EngineEvent::Option(combo)) = parse_line(
            "option name Analysis Contempt type combo default Both var Off var White var Black var Both",
        ) else {
            panic!("expected option");
        };
        let OptionKind::Combo { default, vars } = combo.kind else {
            panic!("expected combo");
        };
        assert_eq!(default, "Both");
        assert_eq!(vars, ["Off", "White", "Black", "Both"]);

        let Some(EngineEvent::Option(path)) =
            parse_line("option name SyzygyPath type string default <empty>")
        else {
            panic!("expected option");
        };
        assert_eq!(path.kind, OptionKind::String { default: String::new() });
    }

    #[test]
    fn test_bestmove_and_handshake() {
        assert_eq!(
            parse_line("bestmove e2e4 ponder e7e5"),
            Some(EngineEvent::BestMove(BestMove {
                mv: "e2e4".into(),
                ponder: Some("e7e5".into())
            }))
        );
        assert_eq!(parse_line("uciok"), Some(EngineEvent::HandshakeDone));
        assert_eq!(
            parse_line("id name Stockfish 17"),
            Some(EngineEvent::Id("Stockfish 17".into()))
        );
        assert_eq!(parse_line("id author the authors"), None);
    }

    #[test]
    fn test_commands() {
        let line = PositionLine {
            start_fen: chess_core::rules::STANDARD_START_FEN.to_string(),
            moves: vec!["e2e4".into(), "e7e5".into()],
            fen: String::new(),
        };
        assert_eq!(position(&line), "position startpos moves e2e4 e7e5");
        assert_eq!(
            go(&SearchLimits::movetime(Duration::from_millis(1500))),
            "go movetime 1500"
        );
        assert_eq!(analyze(&AnalysisLimits::default()), "go infinite");
        let limits = AnalysisLimits {
            depth: Some(18),
            ..AnalysisLimits::default()
        };
        assert_eq!(analyze(&limits), "go depth 18");
    }
}
