//! Scripted in-process engines for session and match tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chess_core::rules;
use engine_session::{Dialect, EngineConfig, EngineError, EngineSession};
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Position};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// What the fake engine does when asked for a move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Answer `go` right away with the first legal move.
    FirstLegal,
    /// Never answer `go`, not even after `stop`.
    Never,
    /// Answer `go` only once told to `stop`.
    OnStop,
    /// Close the connection on `go`; an analysis gets its first lines out.
    Crash,
    /// Ignore `go` and `stop` alike, analysis included.
    Mute,
}

/// Every command the engine received, in order.
pub type Transcript = Arc<Mutex<Vec<String>>>;

pub fn commands(transcript: &Transcript) -> Vec<String> {
    transcript.lock().unwrap().clone()
}

pub fn config(name: &str, dialect: Dialect) -> EngineConfig {
    EngineConfig::new(name, "/nonexistent/fake-engine", dialect)
}

/// A session attached to a scripted UCI engine.
pub async fn uci_session(name: &str, reply: Reply) -> (Arc<EngineSession>, Transcript) {
    let session = Arc::new(EngineSession::new(config(name, Dialect::Uci)));
    let transcript = attach_uci(&session, reply).await;
    (session, transcript)
}

pub async fn attach_uci(session: &EngineSession, reply: Reply) -> Transcript {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let transcript = Transcript::default();
    tokio::spawn(run_uci(server, reply, transcript.clone()));
    let (reader, writer) = tokio::io::split(client);
    session.attach(reader, writer).await.unwrap();
    transcript
}

/// Position after a `position startpos|fen ... [moves ...]` command.
fn parse_position(cmd: &str) -> Option<Chess> {
    let rest = cmd.strip_prefix("position ")?;
    let (setup, moves) = match rest.split_once(" moves ") {
        Some((setup, moves)) => (setup, moves),
        None => (rest, ""),
    };
    let mut pos = if setup == "startpos" {
        Chess::default()
    } else {
        rules::from_fen(setup.strip_prefix("fen ")?).ok()?
    };
    for uci in moves.split_whitespace() {
        let mv = uci.parse::<UciMove>().ok()?.to_move(&pos).ok()?;
        pos.play_unchecked(mv);
    }
    Some(pos)
}

async fn run_uci(stream: DuplexStream, reply: Reply, transcript: Transcript) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut position = Chess::default();
    let mut analyzing = false;
    let mut searching = false;

    while let Ok(Some(line)) = lines.next_line().await {
        transcript.lock().unwrap().push(line.clone());
        let out = match line.split_whitespace().next().unwrap_or("") {
            "uci" => concat!(
                "id name Fake Engine 1.0\n",
                "id author Nobody\n",
                "option name Hash type spin default 16 min 1 max 1024\n",
                "option name Ponder type check default false\n",
                "option name MultiPV type spin default 1 min 1 max 5\n",
                "option name Style type combo default Normal var Solid var Normal var Risky\n",
                "option name Clear Hash type button\n",
                "uciok\n"
            )
            .to_string(),
            "isready" => "readyok\n".to_string(),
            "position" => {
                if let Some(pos) = parse_position(&line) {
                    position = pos;
                }
                String::new()
            }
            "go" if line.contains("infinite") => {
                analyzing = true;
                let infos = concat!(
                    "info string analysing\n",
                    "info depth 1 seldepth 1 multipv 1 score cp 20 nodes 40 nps 4000 time 10 pv e2e4\n",
                    "info depth 2 seldepth 3 multipv 1 score cp 31 nodes 400 nps 40000 time 10 pv e2e4 e7e5\n",
                );
                if reply == Reply::Crash {
                    let _ = writer.write_all(infos.as_bytes()).await;
                    return;
                }
                infos.to_string()
            }
            "go" => match reply {
                Reply::FirstLegal => first_legal(&position),
                Reply::OnStop => {
                    searching = true;
                    String::new()
                }
                Reply::Never | Reply::Mute => String::new(),
                Reply::Crash => return,
            },
            "stop" if reply == Reply::Mute => String::new(),
            "stop" if analyzing => {
                analyzing = false;
                "bestmove e2e4 ponder e7e5\n".to_string()
            }
            "stop" if searching => {
                searching = false;
                first_legal(&position)
            }
            "quit" => return,
            _ => String::new(),
        };
        if !out.is_empty() && writer.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn first_legal(position: &Chess) -> String {
    match rules::legal_moves(position).first() {
        Some(&mv) => {
            let uci = rules::uci(mv);
            format!("info depth 1 score cp 0 pv {uci}\nbestmove {uci}\n")
        }
        None => "bestmove (none)\n".to_string(),
    }
}

/// A session attached to a scripted XBoard engine.
pub async fn xboard_session(name: &str) -> (Arc<EngineSession>, Transcript) {
    let session = Arc::new(EngineSession::new(config(name, Dialect::Xboard)));
    let (client, server) = tokio::io::duplex(64 * 1024);
    let transcript = Transcript::default();
    tokio::spawn(run_xboard(server, transcript.clone()));
    let (reader, writer) = tokio::io::split(client);
    session.attach(reader, writer).await.unwrap();
    (session, transcript)
}

/// Attach a peer that reads every command and never answers.
pub async fn attach_silent(session: &EngineSession) -> Result<(), EngineError> {
    let (client, server) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        let mut lines = BufReader::new(server).lines();
        while let Ok(Some(_)) = lines.next_line().await {}
    });
    let (reader, writer) = tokio::io::split(client);
    session.attach(reader, writer).await
}

async fn run_xboard(stream: DuplexStream, transcript: Transcript) {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    let mut position = Chess::default();

    while let Ok(Some(line)) = lines.next_line().await {
        transcript.lock().unwrap().push(line.clone());
        let mut parts = line.split_whitespace();
        let out = match parts.next().unwrap_or("") {
            "protover" => concat!(
                "feature ping=1 setboard=1 usermove=1 myname=\"Fake Board 2\"\n",
                "feature option=\"Hash -spin 16 1 512\"\n",
                "feature option=\"Resign -check 0\"\n",
                "feature done=1\n"
            )
            .to_string(),
            "ping" => format!("pong {}\n", parts.next().unwrap_or("0")),
            "setboard" => {
                let fen = line.trim_start_matches("setboard").trim();
                if let Ok(pos) = rules::from_fen(fen) {
                    position = pos;
                }
                String::new()
            }
            "usermove" => {
                let mv = parts
                    .next()
                    .and_then(|uci| uci.parse::<UciMove>().ok())
                    .and_then(|uci| uci.to_move(&position).ok());
                if let Some(mv) = mv {
                    position.play_unchecked(mv);
                }
                String::new()
            }
            "go" => match rules::legal_moves(&position).first() {
                Some(&mv) => {
                    let uci = rules::uci(mv);
                    format!("1 15 5 200 {uci}\nmove {uci}\n")
                }
                None => String::new(),
            },
            "analyze" => "3 25 10 1500 e2e4 e7e5\n".to_string(),
            "quit" => return,
            _ => String::new(),
        };
        if !out.is_empty() && writer.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}
