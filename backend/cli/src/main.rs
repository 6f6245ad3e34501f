mod check_cmd;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use idlewatch_archive::{Archiver, ThreadArchive};
use idlewatch_channels::{
    LiveFeed, SlackClient, SlackConfig, SlackEventsConfig, SlackEventsFeed, SlackSocketFeed,
};
use idlewatch_core::{
    route_feed, ChannelDirectory, Component, HistorySource, MetadataSource, Notifier, SystemClock,
    WatchBus,
};
use idlewatch_scheduler::{Notification, Watchdog, WatchdogConfig};

use config::{Config, FeedConfig};

#[derive(Parser)]
#[command(name = "idlewatch")]
#[command(about = "idlewatch — notifies you when a Slack workspace goes quiet")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile from history, then watch the live feed (default)
    Run,
    /// Report the last activity and the idle deadline without notifying or
    /// joining channels
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    idlewatch_logging::init_logger(config.log_dir.as_deref(), &config.log_level);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Check { json } => check_cmd::run(&config, json).await,
    }
}

/// Build the watchdog over the Slack Web API.
pub(crate) fn build_watchdog(
    config: &Config,
    client: &Arc<SlackClient>,
    inbox_tx: tokio::sync::mpsc::Sender<idlewatch_core::Message>,
) -> Watchdog {
    let directory: Arc<dyn ChannelDirectory> = client.clone();
    let history: Arc<dyn HistorySource> = client.clone();
    let notifier: Arc<dyn Notifier> = client.clone();
    Watchdog::new(
        directory,
        history,
        notifier,
        Arc::new(SystemClock),
        WatchdogConfig {
            idle_threshold: config.idle_threshold,
            notification: Notification {
                target: config.notify_target.clone(),
                text: config.notify_text.clone(),
            },
        },
        inbox_tx,
    )
}

async fn run(config: Config) -> Result<()> {
    let feed_config = config.require_feed()?.clone();
    info!(
        threshold_secs = config.idle_threshold.num_seconds(),
        archive = config.archive_dir.is_some(),
        "Starting idlewatch"
    );

    let client = Arc::new(SlackClient::new(SlackConfig::new(&config.bot_token)));
    let mut bus = WatchBus::new();

    let feed_rx = bus.take_feed_rx().context("feed rx already taken")?;
    let watchdog_rx = bus.take_watchdog_rx().context("watchdog rx already taken")?;
    let archive_rx = bus.take_archive_rx().context("archive rx already taken")?;

    // Optional archiver
    let archive_tx = match &config.archive_dir {
        Some(dir) => {
            let directory: Arc<dyn ChannelDirectory> = client.clone();
            let metadata: Arc<dyn MetadataSource> = client.clone();
            let archive = ThreadArchive::new(dir, directory).with_metadata(metadata);
            let archiver = Archiver::new(Arc::new(archive));
            tokio::spawn(async move {
                if let Err(e) = archiver.start(archive_rx).await {
                    error!(error = %e, "Archiver task failed");
                }
            });
            info!(dir = %dir.display(), "Archiving live messages");
            Some(bus.archive_tx.clone())
        }
        None => None,
    };

    // The bot's own posts (including the idle notification) are not activity.
    let own = client
        .auth_identity()
        .await
        .context("Failed to resolve the bot identity via auth.test")?;
    tokio::spawn(route_feed(feed_rx, bus.watchdog_tx.clone(), archive_tx, own));

    // Live feed. Events received before reconciliation finishes wait in the
    // watchdog inbox.
    match feed_config {
        FeedConfig::SocketMode { app_token } => {
            let feed = SlackSocketFeed::new((*client).clone(), app_token, bus.feed_tx.clone());
            info!(feed = feed.name(), "Registered live feed");
            tokio::spawn(async move {
                if let Err(e) = feed.start().await {
                    error!(error = %e, "Socket Mode feed failed");
                }
            });
        }
        FeedConfig::EventsApi {
            signing_secret,
            port,
            events_path,
        } => {
            let feed = SlackEventsFeed::new(
                SlackEventsConfig {
                    signing_secret,
                    events_path,
                },
                bus.feed_tx.clone(),
            );
            info!(feed = feed.name(), "Registered live feed");
            feed.start().await?;
            let app = feed.build_router();
            let addr = format!("0.0.0.0:{port}");
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("Failed to bind {addr}"))?;
            info!(addr = %addr, "Events API listening");
            tokio::spawn(async move {
                if let Err(e) = axum::serve(listener, app).await {
                    error!(error = %e, "Events API server failed");
                }
            });
        }
    }

    let watchdog = build_watchdog(&config, &client, bus.watchdog_tx.clone());
    let watchdog_task = tokio::spawn(async move { watchdog.start(watchdog_rx).await });

    tokio::select! {
        res = watchdog_task => {
            res.context("Watchdog task panicked")??;
        }
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
