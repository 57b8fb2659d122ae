/// Match controller tests on paused time, with humans and scripted engines.
mod common;

use std::time::Duration;

use chess_core::{pgn, Color, Game, Placement};
use chess_match::{lock_game, MatchController, MatchError, MatchResult, MatchStatus, Player, SharedGame};
use common::{uci_session, Reply};
use engine_session::SessionState;
use tokio::time::{advance, Instant};

fn controller(control: &str) -> MatchController {
    MatchController::new(SharedGame::default(), control.parse().unwrap())
}

async fn humans(control: &str) -> MatchController {
    let mut ctl = controller(control);
    ctl.set_player(Color::White, Player::Human).unwrap();
    ctl.set_player(Color::Black, Player::Human).unwrap();
    ctl.start().await.unwrap();
    ctl
}

#[tokio::test(start_paused = true)]
async fn test_increment_applied_after_move() {
    let mut ctl = humans("3+2").await;
    advance(Duration::from_secs(10)).await;
    let e4 = ctl.submit_move("e4").await.unwrap();

    assert_eq!(ctl.remaining(Color::White), Duration::from_secs(172));
    assert_eq!(ctl.clock_display(Color::White), "2:52");
    assert_eq!(ctl.remaining(Color::Black), Duration::from_secs(180));
    assert_eq!(ctl.to_move(), Color::Black);

    let game = lock_game(ctl.game());
    assert_eq!(game.tree().node(e4).unwrap().clock, Some(Duration::from_secs(172)));
    assert!(pgn::export(&game).contains("{[%clk 0:02:52]}"));
}

#[tokio::test(start_paused = true)]
async fn test_only_side_to_move_runs() {
    let mut ctl = humans("5+0").await;
    advance(Duration::from_secs(30)).await;
    assert_eq!(ctl.remaining(Color::White), Duration::from_secs(270));
    assert_eq!(ctl.remaining(Color::Black), Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let mut ctl = humans("1+0").await;
    advance(Duration::from_secs(5)).await;
    ctl.pause().await.unwrap();
    advance(Duration::from_secs(100)).await;

    assert_eq!(ctl.remaining(Color::White), Duration::from_secs(55));
    assert_eq!(
        ctl.submit_move("e4").await,
        Err(MatchError::InvalidState("paused"))
    );

    ctl.resume().await.unwrap();
    advance(Duration::from_secs(5)).await;
    ctl.submit_move("e4").await.unwrap();
    assert_eq!(ctl.remaining(Color::White), Duration::from_secs(50));
}

#[tokio::test(start_paused = true)]
async fn test_human_flag_falls_on_read() {
    let mut ctl = humans("1+0").await;
    advance(Duration::from_secs(61)).await;

    assert_eq!(
        ctl.submit_move("e4").await,
        Err(MatchError::InvalidState("finished"))
    );
    assert_eq!(
        ctl.status(),
        &MatchStatus::Finished(MatchResult::TimeForfeit { loser: Color::White })
    );
    let game = lock_game(ctl.game());
    assert_eq!(game.metadata.result, "0-1");
    assert!(!game.is_held());
}

#[tokio::test(start_paused = true)]
async fn test_clock_read_applies_flag() {
    let mut ctl = humans("1+0").await;
    advance(Duration::from_secs(61)).await;

    assert_eq!(ctl.remaining(Color::White), Duration::ZERO);
    assert_eq!(
        ctl.status(),
        &MatchStatus::Finished(MatchResult::TimeForfeit { loser: Color::White })
    );
    let game = lock_game(ctl.game());
    assert!(!game.is_held());
    assert_eq!(game.metadata.result, "0-1");
}

#[tokio::test(start_paused = true)]
async fn test_step_waits_for_human_flag() {
    let mut ctl = humans("1+0").await;
    ctl.submit_move("d4").await.unwrap();

    let start = Instant::now();
    let status = ctl.step().await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(
        status,
        MatchStatus::Finished(MatchResult::TimeForfeit { loser: Color::Black })
    );
}

#[tokio::test(start_paused = true)]
async fn test_engine_answers_human() {
    let (engine, _) = uci_session("fake", Reply::FirstLegal).await;
    let mut ctl = controller("3+0");
    ctl.set_player(Color::White, Player::Human).unwrap();
    ctl.set_player(Color::Black, Player::Engine(engine.clone())).unwrap();
    ctl.start().await.unwrap();

    ctl.submit_move("e4").await.unwrap();
    assert_eq!(ctl.submit_move("e5").await, Err(MatchError::NotYourTurn));
    assert_eq!(ctl.step().await, Ok(MatchStatus::Running));
    assert_eq!(ctl.to_move(), Color::White);

    let game = lock_game(ctl.game());
    assert_eq!(game.line().moves.len(), 2);
    assert_eq!(game.metadata.black, "Fake Engine 1.0");
    assert_eq!(game.metadata.time_control.as_deref(), Some("3+0"));
}

#[tokio::test(start_paused = true)]
async fn test_engine_to_move_searches_at_start() {
    let (engine, transcript) = uci_session("fake", Reply::FirstLegal).await;
    let mut ctl = controller("1+0");
    ctl.set_player(Color::White, Player::Engine(engine)).unwrap();
    ctl.set_player(Color::Black, Player::Human).unwrap();
    ctl.start().await.unwrap();

    ctl.step().await.unwrap();
    assert_eq!(ctl.to_move(), Color::Black);
    let sent = common::commands(&transcript);
    assert!(sent.contains(&"go wtime 60000 btime 60000 winc 0 binc 0".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_silent_engines_lose_on_time() {
    let (white, _) = uci_session("white", Reply::Never).await;
    let (black, _) = uci_session("black", Reply::Never).await;
    let mut ctl = controller("1+0");
    ctl.set_player(Color::White, Player::Engine(white.clone())).unwrap();
    ctl.set_player(Color::Black, Player::Engine(black.clone())).unwrap();

    let start = Instant::now();
    ctl.start().await.unwrap();
    let result = ctl.run_until_finished().await.unwrap();

    assert_eq!(result, MatchResult::TimeForfeit { loser: Color::White });
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(white.state(), SessionState::Disconnected);
    assert_eq!(black.state(), SessionState::Idle);

    let game = lock_game(ctl.game());
    assert_eq!(game.metadata.result, "0-1");
    assert_eq!(game.current().comment.as_deref(), Some("White lost on time"));
}

#[tokio::test(start_paused = true)]
async fn test_engine_crash_forfeits() {
    let (engine, _) = uci_session("fake", Reply::Crash).await;
    let mut ctl = controller("3+2");
    ctl.set_player(Color::White, Player::Human).unwrap();
    ctl.set_player(Color::Black, Player::Engine(engine)).unwrap();
    ctl.start().await.unwrap();

    ctl.submit_move("e4").await.unwrap();
    let status = ctl.step().await.unwrap();
    assert_eq!(
        status,
        MatchStatus::Finished(MatchResult::EngineFailure {
            loser: Color::Black,
            reason: "Engine process exited unexpectedly".into(),
        })
    );
    assert_eq!(lock_game(ctl.game()).metadata.result, "1-0");
}

#[tokio::test(start_paused = true)]
async fn test_resign_and_reset() {
    let mut ctl = humans("3+2").await;
    ctl.submit_move("e4").await.unwrap();
    ctl.resign(Color::Black).await.unwrap();
    assert_eq!(
        ctl.status(),
        &MatchStatus::Finished(MatchResult::Resignation { loser: Color::Black })
    );
    assert_eq!(lock_game(ctl.game()).metadata.result, "1-0");
    assert_eq!(ctl.resign(Color::White).await, Err(MatchError::InvalidState("finished")));

    ctl.reset().unwrap();
    assert_eq!(ctl.status(), &MatchStatus::NotStarted);
    assert_eq!(ctl.remaining(Color::White), Duration::from_secs(180));
    assert_eq!(ctl.start().await, Err(MatchError::NotReady));
}

#[tokio::test(start_paused = true)]
async fn test_match_on_sideline_keeps_headers() {
    let mut game = Game::default();
    game.play(&["e4", "e5"], Placement::Default).unwrap();
    game.metadata.result = "1-0".into();
    game.goto("1...", false).unwrap();
    let c5 = game.play(&["c5"], Placement::Sideline).unwrap();
    game.set_comment(c5, Some("Sicilian".into())).unwrap();

    let mut ctl = MatchController::new(SharedGame::new(game.into()), "3+0".parse().unwrap());
    ctl.set_player(Color::White, Player::Human).unwrap();
    ctl.set_player(Color::Black, Player::Human).unwrap();
    ctl.start().await.unwrap();
    ctl.resign(Color::White).await.unwrap();

    let game = lock_game(ctl.game());
    assert_eq!(game.metadata.result, "1-0");
    assert_eq!(game.metadata.time_control, None);
    assert_eq!(
        game.tree().node(c5).unwrap().comment.as_deref(),
        Some("Sicilian White resigned")
    );
    assert!(!game.tree().is_on_mainline(c5));
}

#[tokio::test(start_paused = true)]
async fn test_resume_sends_fresh_search() {
    let (engine, transcript) = uci_session("fake", Reply::OnStop).await;
    let mut ctl = controller("1+0");
    ctl.set_player(Color::White, Player::Engine(engine.clone())).unwrap();
    ctl.set_player(Color::Black, Player::Human).unwrap();
    ctl.start().await.unwrap();
    let mut state = engine.subscribe_state();
    state.wait_for(|s| *s == SessionState::Searching).await.unwrap();

    advance(Duration::from_secs(5)).await;
    ctl.pause().await.unwrap();
    assert_eq!(engine.state(), SessionState::Idle);
    assert_eq!(ctl.to_move(), Color::White);
    advance(Duration::from_secs(100)).await;

    ctl.resume().await.unwrap();
    state.wait_for(|s| *s == SessionState::Searching).await.unwrap();

    let sent = common::commands(&transcript);
    let searches: Vec<&str> = sent
        .iter()
        .map(String::as_str)
        .filter(|c| c.starts_with("go "))
        .collect();
    assert_eq!(
        searches,
        [
            "go wtime 60000 btime 60000 winc 0 binc 0",
            "go wtime 55000 btime 60000 winc 0 binc 0",
        ]
    );
    assert!(sent.contains(&"stop".to_string()));
    ctl.resign(Color::White).await.unwrap();
}
