//! Hydromate - water reminder bot
//!
//! CLI entry point: the long-running daemon plus a couple of offline
//! inspection commands for checking what a given profile would produce.

use clap::{Parser, Subcommand};
use hydromate::bot::Bot;
use hydromate::config::{Config, PORTION_ML};
use hydromate::profile::SqliteProfileStore;
use hydromate::resolver::HttpLocationResolver;
use hydromate::schedule;
use hydromate::session::MemorySessionStore;
use hydromate::telegram::TelegramClient;
use hydromate::validate;
use hydromate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Hydromate - Telegram water reminder bot
#[derive(Parser)]
#[command(name = "hydromate")]
#[command(about = "Run the hydration reminder bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot daemon
    Run,

    /// Print the daily water goal for a body weight
    Goal {
        /// Body weight in kg
        weight: f64,
    },

    /// Print the reminder schedule for a profile
    Schedule {
        /// Wake-up time, HH:MM
        wake: String,

        /// Bedtime, HH:MM
        sleep: String,

        /// Body weight in kg
        weight: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run => cmd_run().await,
        Commands::Goal { weight } => cmd_goal(weight),
        Commands::Schedule {
            wake,
            sleep,
            weight,
        } => cmd_schedule(&wake, &sleep, weight),
    }
}

// ============================================================================
// CLI Commands
// ============================================================================

fn cmd_goal(weight: f64) -> Result<()> {
    if !(weight.is_finite() && weight > 0.0) {
        return Err(Error::Parse(format!("invalid weight: {}", weight)));
    }
    let goal = validate::daily_goal(weight);
    println!("Daily goal for {} kg: {} litres", weight, goal);
    println!(
        "That's {} reminders of {} ml",
        ((goal * 1000.0).round() as u32).div_ceil(PORTION_ML),
        PORTION_ML
    );
    Ok(())
}

fn cmd_schedule(wake: &str, sleep: &str, weight: f64) -> Result<()> {
    if !(weight.is_finite() && weight > 0.0) {
        return Err(Error::Parse(format!("invalid weight: {}", weight)));
    }
    let goal = validate::daily_goal(weight);
    let reminders = schedule::generate(wake, sleep, goal)?;

    println!("Goal: {} litres, {} reminders", goal, reminders.len());
    for slot in reminders {
        println!("  {}", slot);
    }
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

async fn cmd_run() -> Result<()> {
    let config = Config::from_env()?;
    info!("Hydromate daemon starting");

    let client = Arc::new(TelegramClient::new(&config.telegram_token));
    let sessions = Arc::new(MemorySessionStore::new(Duration::from_secs(
        config.session_ttl_secs,
    )));
    let profiles = Arc::new(SqliteProfileStore::open(&config.profile_db)?);
    let resolver = Arc::new(HttpLocationResolver::new(
        config.geocode_api_key.clone(),
        config.timezonedb_api_key.clone(),
    ));

    let poll_timeout = config.poll_timeout_secs;
    let dispatch_interval = config.dispatch_interval_secs;

    let bot = Arc::new(Bot::new(
        Arc::clone(&client),
        sessions,
        profiles,
        resolver,
        config,
    ));

    // Reminder dispatcher: one pass per minute
    let dispatcher = Arc::clone(&bot);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(dispatch_interval));
        loop {
            tick.tick().await;
            if let Err(e) = dispatcher.dispatch_due_reminders().await {
                error!("Reminder dispatch pass failed: {}", e);
            }
        }
    });

    // Long-poll loop
    let mut offset = 0i64;
    loop {
        match client.get_updates(offset, poll_timeout).await {
            Ok((events, next_offset)) => {
                offset = next_offset;
                for event in events {
                    bot.process_event(event).await;
                }
            }
            Err(e) => {
                error!("Polling failed: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}
