//! Operator command line.
//!
//! `run` (the default) keeps the monitor going until interrupted. Everything
//! else is a one-shot command against the same configuration and database.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use community_post_watcher::channels::ChannelRegistry;
use community_post_watcher::community::CommunityScraper;
use community_post_watcher::config::Config;
use community_post_watcher::db::{
    self, AddWatchOutcome, Database, NewChannelPost, NewWatch, UpsertOutcome,
};
use community_post_watcher::monitor::{notifier_from_config, Monitor};

/// Watch YouTube community posts and notify on new ones.
#[derive(Debug, Parser)]
#[command(name = "community-post-watcher", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sweep watched channels on an interval until interrupted. The default.
    Run,

    /// Run a single sweep and exit.
    Sweep,

    /// Fetch the latest post of a configured channel and print it as JSON.
    Fetch {
        /// Configured channel id.
        channel_id: String,

        /// Also record the post as the channel's latest known post.
        #[arg(long)]
        store: bool,
    },

    /// List configured channels.
    Channels,

    /// Manage watches.
    Watch {
        #[command(subcommand)]
        command: WatchCommand,
    },

    /// Show configuration and storage counts.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum WatchCommand {
    /// Deliver a channel's new posts to a delivery channel.
    Add(WatchArgs),

    /// Stop delivering a channel's posts to a delivery channel.
    Remove(WatchArgs),

    /// List watches, optionally for one guild or one channel.
    List {
        #[arg(long)]
        guild: Option<String>,

        #[arg(long, conflicts_with = "guild")]
        channel: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
pub struct WatchArgs {
    /// Guild (server) owning the delivery channel.
    #[arg(long)]
    guild: String,

    /// Delivery channel id.
    #[arg(long)]
    target: String,

    /// Configured channel id to watch.
    #[arg(long)]
    channel: String,
}

impl WatchArgs {
    fn to_new_watch(&self) -> NewWatch {
        NewWatch {
            guild_id: self.guild.clone(),
            delivery_channel_id: self.target.clone(),
            channel_id: self.channel.clone(),
        }
    }
}

pub async fn execute(
    command: Command,
    config: Config,
    channels: ChannelRegistry,
    db: Database,
) -> Result<()> {
    match command {
        Command::Run => run_monitor(config, channels, db).await,
        Command::Sweep => {
            let monitor = build_monitor(config, channels, db)?;
            if let Some(summary) = monitor.sweep().await {
                println!(
                    "{}",
                    json!({
                        "channels": summary.channels,
                        "notified": summary.notified,
                        "failures": summary.failures,
                    })
                );
            }
            Ok(())
        }
        Command::Fetch { channel_id, store } => {
            fetch_channel(&config, &channels, &db, &channel_id, store).await
        }
        Command::Channels => {
            for channel in channels.all() {
                println!("{}\t{}\t{}", channel.id, channel.handle, channel.display_name);
            }
            Ok(())
        }
        Command::Watch { command } => watch(command, &channels, &db).await,
        Command::Status => {
            let watches = db::count_watches(db.pool()).await?;
            let posts = db::count_posts(db.pool()).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "configured_channels": channels.len(),
                    "watches": watches,
                    "stored_posts": posts,
                    "check_interval_secs": config.check_interval.as_secs(),
                    "baseline_policy": format!("{:?}", config.baseline_policy).to_lowercase(),
                    "webhook_enabled": config.notify_webhook_url.is_some(),
                }))?
            );
            Ok(())
        }
    }
}

fn build_monitor(config: Config, channels: ChannelRegistry, db: Database) -> Result<Monitor> {
    let scraper = CommunityScraper::new(&config)?;
    let notifier = notifier_from_config(&config)?;
    Ok(Monitor::new(config, channels, scraper, Arc::new(db), notifier))
}

async fn run_monitor(config: Config, channels: ChannelRegistry, db: Database) -> Result<()> {
    let monitor = build_monitor(config, channels, db)?;

    let monitor_handle = tokio::spawn(async move {
        monitor.run().await;
    });

    shutdown_signal().await;

    info!("Shutting down...");
    monitor_handle.abort();
    info!("Shutdown complete");

    Ok(())
}

async fn fetch_channel(
    config: &Config,
    channels: &ChannelRegistry,
    db: &Database,
    channel_id: &str,
    store: bool,
) -> Result<()> {
    let Some(channel) = channels.get(channel_id) else {
        bail!("Unknown channel id '{channel_id}'");
    };

    let scraper = CommunityScraper::new(config)?;
    let result = scraper.fetch_channel_posts(&channel.handle).await;

    let stored = match (store, result.latest()) {
        (true, Some(latest)) => {
            let outcome = db::upsert_post(
                db.pool(),
                &NewChannelPost {
                    channel_id: channel.id.clone(),
                    post_id: latest.id.clone(),
                    content: latest.content.clone(),
                    published_at: latest.published_at,
                },
            )
            .await
            .context("Failed to store post")?;
            Some(matches!(outcome, UpsertOutcome::Stored))
        }
        _ => None,
    };

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "channel": channel,
            "success": result.success,
            "mode": result.mode,
            "diagnostic": result.diagnostic,
            "error": result.error,
            "tried_urls": result.tried_urls,
            "total_posts": result.posts.len(),
            "latest": result.latest(),
            "newly_stored": stored,
        }))?
    );
    Ok(())
}

async fn watch(command: WatchCommand, channels: &ChannelRegistry, db: &Database) -> Result<()> {
    match command {
        WatchCommand::Add(args) => {
            if channels.get(&args.channel).is_none() {
                bail!("Unknown channel id '{}'", args.channel);
            }
            match db::add_watch(db.pool(), &args.to_new_watch()).await? {
                AddWatchOutcome::Added(record) => {
                    println!("{}", serde_json::to_string(&record)?);
                }
                AddWatchOutcome::AlreadyWatching => {
                    println!(
                        "{} is already watching {} in guild {}",
                        args.target, args.channel, args.guild
                    );
                }
            }
        }
        WatchCommand::Remove(args) => {
            if db::remove_watch(db.pool(), &args.to_new_watch()).await? {
                println!("Removed watch of {} from {}", args.channel, args.target);
            } else {
                bail!(
                    "{} is not watching {} in guild {}",
                    args.target,
                    args.channel,
                    args.guild
                );
            }
        }
        WatchCommand::List { guild, channel } => {
            if let Some(channel_id) = channel {
                for target in db::get_watchers(db.pool(), &channel_id).await? {
                    println!("{}\t{}", target.guild_id, target.delivery_channel_id);
                }
                return Ok(());
            }

            let watches = match guild {
                Some(guild_id) => db::get_watches_for_guild(db.pool(), &guild_id).await?,
                None => db::get_all_watches(db.pool()).await?,
            };
            for watch in watches {
                let name = channels
                    .get(&watch.channel_id)
                    .map_or("(unconfigured)", |c| c.display_name.as_str());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    watch.guild_id, watch.delivery_channel_id, watch.channel_id, name, watch.created_at
                );
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
