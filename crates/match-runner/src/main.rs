//! Engine-vs-engine match runner
//!
//! Launches the two engines named in the environment, plays one timed game
//! between them and writes the PGN.

mod config;
mod error;

use chess_core::{Color, Game};
use chess_match::Workbench;
use tracing::{error, info};

use crate::config::RunnerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let config = RunnerConfig::load()?;
    info!(
        white = %config.white.path,
        black = %config.black.path,
        time_control = %config.time_control,
        "Runner config loaded"
    );

    let game = match &config.start_fen {
        Some(fen) => Game::from_fen(fen)?,
        None => Game::default(),
    };
    let mut bench = Workbench::new(game);

    let outcome = play(&mut bench, &config).await;
    bench.shutdown().await;
    let result = outcome?;
    info!(result = %result, "Match complete");

    let pgn = bench.export_pgn();
    match &config.pgn_out {
        Some(path) => {
            tokio::fs::write(path, &pgn).await?;
            info!(path = %path, "PGN written");
        }
        None => print!("{pgn}"),
    }
    Ok(())
}

async fn play(
    bench: &mut Workbench,
    config: &RunnerConfig,
) -> anyhow::Result<chess_match::MatchResult> {
    for engine in [&config.white, &config.black] {
        if let Err(e) = bench.load_engine(engine.clone()).await {
            error!(engine = %engine.name, path = %engine.path, error = %e, "Failed to load engine");
            return Err(e.into());
        }
    }

    bench.new_match(config.time_control)?;
    bench.set_player(Color::White, Some(&config.white.name))?;
    bench.set_player(Color::Black, Some(&config.black.name))?;
    bench.match_start().await?;
    Ok(bench.run_match().await?)
}
