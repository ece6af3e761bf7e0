use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use slack_channel_stats::aggregate::reaction_breakdown;
use slack_channel_stats::config::{Config, OutputFormat, StatsMode};
use slack_channel_stats::directory::{resolve_channel_id, UserDirectory};
use slack_channel_stats::pattern::PatternCache;
use slack_channel_stats::report;
use slack_channel_stats::slack::{HttpSlackClient, RateLimitedCaller};
use slack_channel_stats::stats::{AuthorFilters, StatsCollector, Window};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        channel = %config.channel_name,
        from = %config.search_from,
        mode = ?config.mode,
        "Configuration loaded"
    );

    // Reject a bad pattern before walking the workspace directories
    let patterns = PatternCache::new();
    if let Some(pattern) = config.active_pattern() {
        patterns.compile(pattern).context("Invalid STATS_PATTERN")?;
    }

    let client = HttpSlackClient::new(&config.slack_api_url, &config.slack_token, config.http_timeout)?;

    // In-flight calls observe the token and return StatsError::Cancelled
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping");
            ctrl_c_token.cancel();
        }
    });
    let caller = RateLimitedCaller::new().with_cancellation(cancel);

    let users = UserDirectory::load(&client, &caller)
        .await
        .context("Failed to load users")?;
    let channel_id = resolve_channel_id(&client, &caller, &config.channel_name).await?;
    info!(channel = %config.channel_name, id = %channel_id, "Channel resolved");

    let window = Window {
        from: config.search_from,
        to: config.search_to,
        max_messages: config.max_messages,
    };
    let collector = StatsCollector::new(&client, &caller, &patterns);
    let channel = config.channel_name.as_str();

    match config.mode {
        StatsMode::Authors | StatsMode::Reactions => {
            let filters = AuthorFilters {
                reaction: config.reaction.clone(),
                pattern: config.pattern.clone(),
            };
            let author_report = collector
                .by_author(&channel_id, &window, &filters)
                .await
                .context("Failed to aggregate by author")?;
            println!("{}", report::render_summary(&author_report.summary));

            match (config.mode, config.reaction.as_deref()) {
                (StatsMode::Reactions, Some(reaction)) => {
                    let summaries = reaction_breakdown(&author_report.entries, reaction);
                    match config.output_format {
                        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summaries)?),
                        OutputFormat::Text => print!(
                            "{}",
                            report::render_reactions(&summaries, &users, channel, reaction)
                        ),
                    }
                }
                _ => match config.output_format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&author_report)?),
                    OutputFormat::Text => {
                        print!("{}", report::render_authors(&author_report, &users, channel));
                    }
                },
            }
        }
        StatsMode::Mentions => {
            let pattern_report = collector
                .by_pattern(&channel_id, &window, config.mention_pattern())
                .await
                .context("Failed to aggregate by pattern")?;
            println!("{}", report::render_summary(&pattern_report.summary));
            match config.output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pattern_report)?),
                OutputFormat::Text => {
                    print!("{}", report::render_mentions(&pattern_report, &users, channel));
                }
            }
        }
    }

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slack_channel_stats=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    // Logs go to stderr so stdout carries only the report
    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
