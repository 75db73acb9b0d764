use anyhow::Result;
use chessflip::logging::{init_from_env, init_logging, LoggingConfig};
use clap::Parser;

mod app;
mod config;
mod repl;
mod session;

use app::GameApp;
use config::AppConfig;

#[derive(Parser)]
#[command(name = "chessflip")]
#[command(about = "Match the chess pieces before your lives run out")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    /// Use the development preset (shorter resolution delays)
    #[arg(long)]
    dev: bool,

    /// Lives per game
    #[arg(short, long)]
    lives: Option<u8>,

    /// Settle each game as soon as it ends
    #[arg(short, long)]
    auto_settle: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let explicit_level = cli.log_level.is_some();
    // Keep the REPL quiet unless asked otherwise
    let log_level = cli
        .log_level
        .or_else(|| cli.config.is_none().then(|| "warn".to_string()));

    let config = AppConfig::load(cli.config.as_deref(), cli.dev)?
        .with_overrides(cli.lives, log_level, cli.auto_settle)?;

    // --log-level beats CHESSFLIP_LOG_*, which beat the config file
    let logging = &config.chessflip.logging;
    if explicit_level {
        init_logging(LoggingConfig::from_settings(logging))?;
    } else {
        init_from_env(logging)?;
    }

    let mut app = GameApp::new(config)?;
    app.run().await?;

    Ok(())
}
