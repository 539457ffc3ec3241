//! Keyguard Bot - Main Entry Point
//!
//! Serves the admin command webhook and read-only endpoints over the
//! key file and the user file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keyguard_bot::commands::CommandHandler;
use keyguard_bot::config::BotSettings;
use keyguard_bot::dispatcher::CommandDispatcher;
use keyguard_bot::store::RecordStore;
use keyguard_bot::web::{self, AppState};

/// Admin bot for hardware-key users kept in flat text files.
#[derive(Parser, Debug)]
#[command(name = "keyguard_bot")]
#[command(about = "Approve, ban, rename and remove hardware-key users")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Key file path (overrides KEYS_PATH).
    #[arg(long)]
    keys: Option<PathBuf>,

    /// User file path (overrides USERS_PATH).
    #[arg(long)]
    users: Option<PathBuf>,

    /// Listen address (overrides LISTEN_ADDR).
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level);

    // Load environment variables
    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let mut settings =
        BotSettings::from_env_with_defaults().context("Failed to load settings from environment")?;

    if let Some(keys) = args.keys {
        settings.keys_path = keys;
    }
    if let Some(users) = args.users {
        settings.users_path = users;
    }
    if let Some(listen) = args.listen {
        settings.listen_addr = listen;
    }

    settings.validate().context("Invalid settings")?;

    let store = Arc::new(RecordStore::new(&settings.keys_path, &settings.users_path));

    let audit = store.audit().context("Failed to read record files")?;
    info!(
        "Loaded {} key(s) and {} user(s) from {} / {}",
        audit.key_count,
        audit.user_count,
        settings.keys_path.display(),
        settings.users_path.display()
    );
    if !audit.is_aligned() {
        warn!(
            "Key and user files are out of step ({} vs {} lines); register, delete and remove \
             will be refused",
            audit.key_count, audit.user_count
        );
    }
    if !audit.malformed_lines.is_empty() {
        warn!("Malformed user lines: {:?}", audit.malformed_lines);
    }

    let handler = Arc::new(CommandHandler::new(
        settings.command_prefix.clone(),
        Arc::clone(&store),
        settings.ban_all_policy,
    ));

    // Create the command queue
    let (dispatcher, dispatch_handle) = CommandDispatcher::new(handler, settings.queue_capacity);

    let dispatcher_task = tokio::spawn(dispatcher.run());

    info!("Starting keyguard bot...");
    info!("Command prefix: {}", settings.command_prefix);
    info!("Ban-all policy: {}", settings.ban_all_policy);

    let listener = TcpListener::bind(settings.socket_addr()?)
        .await
        .with_context(|| format!("Failed to bind {}", settings.listen_addr))?;

    let state = AppState::new(store, dispatch_handle.clone(), &settings.command_prefix);

    info!("Bot is running. Use Ctrl+C to stop.");

    web::serve(listener, state, shutdown_signal())
        .await
        .context("Web server failed")?;

    // Cleanup
    info!("Shutting down...");
    dispatch_handle.shutdown().await;
    let _ = dispatcher_task.await;

    Ok(())
}

/// Resolves when Ctrl+C is received.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down...");
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
