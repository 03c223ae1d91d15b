//! Dumpyara bot - Telegram front-end for the dumpyara Jenkins jobs
//!
//! Listens for `/dump`, `/dump_alt`, `/cancel`, `/restart` and `/help` in the
//! allowed chats and relays them to Jenkins.
//!
//! Settings come from the environment; a `.env` file in the working
//! directory (or the one given with `--env-file`) is loaded first.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use dumpyara_core::{init_tracing, JenkinsClient, Reconciler, Settings};
use teloxide::prelude::*;
use tracing::{info, warn, Level};

mod handlers;

use handlers::{BotState, Command};

#[derive(Parser)]
#[command(name = "dumpyara-bot")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Telegram bridge to the dumpyara Jenkins jobs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Environment file to load before reading settings
    #[arg(long, env = "DUMPYARA_ENV_FILE")]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    // Setup logging once RUST_LOG from the env file is visible
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let settings = Settings::from_env().context("Failed to read settings")?;
    info!(
        jenkins = %settings.jenkins.url,
        chats = settings.allowed_chats.len(),
        "starting dumpyara bot"
    );

    let client =
        JenkinsClient::new(settings.jenkins.clone()).context("Failed to create Jenkins client")?;
    let bot = Bot::new(settings.telegram_bot_token.clone());
    let state = Arc::new(BotState::new(settings, Reconciler::new(client)));

    let handler = Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handlers::handle_command);

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state.clone()])
        .enable_ctrlc_handler()
        .build();

    // Stop polling on /restart but let running handlers finish their replies.
    let shutdown = dispatcher.shutdown_token();
    let restart = state.clone();
    tokio::spawn(async move {
        restart.restart_requested().await;
        info!("restart requested, shutting down");
        match shutdown.shutdown() {
            Ok(done) => done.await,
            Err(e) => warn!("dispatcher was not running: {}", e),
        }
    });

    dispatcher.dispatch().await;
    info!("dispatcher stopped");

    Ok(())
}
