use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedrelay::config::Config;
use feedrelay::crawler::{AuthSession, InstagramFetcher, InstagramLogin, PlatformClient, PollCycle, VliveFetcher};
use feedrelay::models::Platform;
use feedrelay::notifications::channels::discord::DiscordConfig;
use feedrelay::notifications::{DiscordClient, Dispatcher, HttpCompositor, NotificationBuilder};
use feedrelay::scheduler::{RepeatingTask, StoryCleanup};
use feedrelay::storage::{create_sqlite_store, Store};

#[derive(Parser)]
#[command(
    name = "feedrelay",
    version,
    about = "Relays new Instagram and VLIVE content to Discord channels",
    long_about = None
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long)]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env_overrides();
            config
        }
        None => Config::from_env()?,
    };

    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    config.validate()?;

    if let Err(e) = feedrelay::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed");
    }

    tracing::info!(
        instagram = config.instagram.enabled,
        vlive = config.vlive.enabled,
        subscriptions = config.subscriptions.len(),
        "feedrelay starting"
    );

    let handles = start(&config).await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    for handle in handles {
        handle.abort();
    }

    if let Ok(metrics) = feedrelay::metrics::encode_metrics() {
        tracing::debug!(metrics = %metrics, "Final metrics");
    }

    tracing::info!("feedrelay stopped");
    Ok(())
}

/// Build every component and spawn the repeating tasks
async fn start(config: &Config) -> Result<Vec<tokio::task::JoinHandle<()>>> {
    let store = create_sqlite_store(&config.database.sqlite_path).with_context(|| {
        format!(
            "Failed to open database at {}",
            config.database.sqlite_path.display()
        )
    })?;

    for subscription in &config.subscriptions {
        store.add_subscription(subscription).await?;
    }

    let notifications = &config.notifications;
    let token = notifications
        .discord_token
        .clone()
        .context("notifications.discord_token (or DISCORD_TOKEN) is required")?;
    let discord = DiscordClient::new(
        DiscordConfig::new(&notifications.discord_api_url, token)
            .with_timeout(config.http.request_timeout_secs),
    )?;
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(discord)));

    let compositor = HttpCompositor::new(notifications.collage_url.clone(), config.request_timeout())?;
    if !compositor.is_enabled() {
        tracing::info!("No collage endpoint configured, multi-image posts use their first image");
    }
    let builder = Arc::new(NotificationBuilder::new(
        store.clone(),
        Arc::new(compositor),
        &notifications.media_base_url,
    ));

    let mut handles = Vec::new();

    if config.instagram.enabled {
        let instagram = &config.instagram;
        let client = Arc::new(PlatformClient::new(
            config.http.requests_per_second,
            config.request_timeout(),
            config.http.user_agent.as_deref(),
        )?);
        let login = Arc::new(InstagramLogin::new(client.clone(), instagram));
        let session = AuthSession::spawn(Platform::Instagram, login, store.clone());
        let fetcher = Arc::new(InstagramFetcher::new(client, session, instagram));
        let cycle = PollCycle::new(fetcher, store.clone(), builder.clone(), dispatcher.clone());

        handles.push(
            RepeatingTask::new(
                "instagram-poll",
                Duration::from_secs(instagram.poll_interval_secs),
                Arc::new(cycle),
            )
            .with_per_source_delay(Duration::from_millis(instagram.per_source_delay_ms))
            .spawn(),
        );
    }

    if config.vlive.enabled {
        let vlive = &config.vlive;
        let client = Arc::new(PlatformClient::new(
            config.http.requests_per_second,
            Duration::from_secs(vlive.request_timeout_secs),
            config.http.user_agent.as_deref(),
        )?);
        let fetcher = Arc::new(VliveFetcher::new(client, vlive));
        let cycle = PollCycle::new(fetcher, store.clone(), builder.clone(), dispatcher.clone());

        handles.push(
            RepeatingTask::new(
                "vlive-poll",
                Duration::from_secs(vlive.poll_interval_secs),
                Arc::new(cycle),
            )
            .with_per_source_delay(Duration::from_millis(vlive.per_source_delay_ms))
            .spawn(),
        );
    }

    handles.push(
        RepeatingTask::new(
            "story-cleanup",
            Duration::from_secs(config.cleanup.interval_secs),
            Arc::new(StoryCleanup::new(store)),
        )
        .spawn(),
    );

    Ok(handles)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("feedrelay=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("feedrelay={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
