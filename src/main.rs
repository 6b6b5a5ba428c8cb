// src/main.rs

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local};
use clap::{Parser, Subcommand};
use mushaf_core::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mushaf", about = "Offline mushaf pages and reading progress")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, default_value = "mushaf.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every page of an edition into the offline cache.
    Download { edition: Option<String> },
    /// Show how much of each edition is cached.
    Status,
    /// Delete the cached pages of an edition.
    Clear { edition: Option<String> },
    /// Print where a page would be loaded from.
    Resolve { page: u16, edition: Option<String> },
    #[command(flatten)]
    Reading(ReadingCommand),
}

/// Commands that work on the reading store.
#[derive(Subcommand)]
enum ReadingCommand {
    /// Start a new khatam target.
    Start {
        name: String,
        #[arg(long, default_value_t = 1)]
        page: u16,
    },
    /// Move the active target to a page.
    Read { page: u16 },
    /// Deactivate the active target.
    Reset,
    /// Progress statistics for the active target.
    Stats,
    /// Pages read per day over the last weeks.
    Heatmap {
        #[arg(long, default_value_t = 4, value_parser = clap::value_parser!(i64).range(1..=520))]
        weeks: i64,
    },
    /// Toggle a bookmark on a page.
    Bookmark { page: u16, label: Option<String> },
    /// Add a note to a page, or a journal entry without `--page`.
    Note {
        text: String,
        #[arg(long)]
        page: Option<u16>,
    },
}

async fn open_cache(config: &Config) -> Result<ResourceCache> {
    let registry = config.registry()?;
    match DiskCache::open(&config.cache_dir).await {
        Ok(disk) => Ok(ResourceCache::new(registry, Arc::new(disk) as Arc<dyn PageCache>)),
        Err(e) => {
            warn!(dir = %config.cache_dir.display(), error = %e, "offline cache unavailable");
            Ok(ResourceCache::without_cache(registry))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Download { edition } => {
            let cache = open_cache(&config).await?;
            let fetcher = HttpFetcher::new(&config.download)?;
            let downloader = EditionDownloader::new(cache, fetcher, &config.download);

            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let mut last = None;
            let result = downloader
                .download(
                    edition.as_deref(),
                    |percent| {
                        if last != Some(percent) {
                            last = Some(percent);
                            println!("[PROGRESS] {percent}%");
                        }
                    },
                    &cancel,
                )
                .await;

            match result {
                Ok(report) => println!(
                    "Done: {} fetched, {} already cached, {} failed.",
                    report.fetched, report.skipped, report.failed
                ),
                Err(DownloadError::Cancelled) => {
                    println!("Cancelled. Pages downloaded so far stay cached; run again to resume.")
                }
                Err(e) => bail!("download failed: {e}. Cached pages are kept; run again to retry."),
            }
        }
        Command::Status => {
            let cache = open_cache(&config).await?;
            for edition in cache.registry().all() {
                let count = cache.cached_count(Some(&edition.id)).await;
                let full = cache.is_fully_cached(Some(&edition.id)).await;
                println!(
                    "{:<12} {:>3}/{} {}",
                    edition.id,
                    count,
                    edition.total_units,
                    if full { "complete" } else { "" }
                );
            }
        }
        Command::Clear { edition } => {
            let cache = open_cache(&config).await?;
            let removed = cache.delete_all(edition.as_deref()).await?;
            println!("Removed {removed} cached pages.");
        }
        Command::Resolve { page, edition } => {
            let cache = open_cache(&config).await?;
            match cache.resolve(page, edition.as_deref()).await {
                PageSource::Cached(data) => println!("cached ({} bytes)", data.len()),
                PageSource::Remote(url) => println!("{url}"),
            }
        }
        Command::Reading(command) => run_reading(command, &config).await?,
    }

    Ok(())
}

async fn run_reading(command: ReadingCommand, config: &Config) -> Result<()> {
    let store = StateManager::new(&config.db_path).await?;
    let events = EventBus::default();
    let tracker = ReadingTracker::new(store.clone(), events.clone());
    let annotations = Annotations::new(store.clone(), events.clone());
    let mut completions = events.subscribe();

    match command {
        ReadingCommand::Start { name, page } => {
            let target = tracker.start_target(&name, page).await?;
            println!("Started khatam for {} at page {}.", target.user_name, target.current_page);
        }
        ReadingCommand::Read { page } => {
            let target = tracker.advance(page).await?;
            println!("Now on page {}.", target.current_page);
        }
        ReadingCommand::Reset => match tracker.reset_target().await? {
            Some(target) => println!("Target reset at page {}.", target.current_page),
            None => println!("No active target."),
        },
        ReadingCommand::Stats => {
            let Some(target) = tracker.active_target().await? else {
                bail!("no active target; start one with `mushaf start <name>`");
            };
            let log = tracker.log().await?;
            let stats = calculate_khatam_analytics(&target, &log, tracker.clock().now());
            println!("Page:            {}/{TOTAL_PAGES}", target.current_page);
            println!("Pages read:      {}", stats.total_pages_read);
            println!("Days active:     {}", stats.total_days_active);
            println!("Pages per day:   {:.1}", stats.avg_pages_per_day);
            println!("Streak:          {} days", stats.streak);
            println!(
                "Finish in:       {} days ({})",
                stats.estimated_days_left,
                stats.estimated_completion_date.with_timezone(&Local).format("%Y-%m-%d")
            );
        }
        ReadingCommand::Heatmap { weeks } => {
            let today = tracker.clock().today();
            let from = today - Duration::weeks(weeks) + Duration::days(1);
            let log = tracker.log().await?;
            for cell in heatmap(&log, from, today) {
                let bar = "#".repeat(usize::from(cell.level));
                println!("{} {:>3} {bar}", cell.date, cell.pages_read);
            }
        }
        ReadingCommand::Bookmark { page, label } => {
            if annotations.is_bookmarked(page).await? {
                annotations.remove_bookmark(page).await?;
                println!("Removed bookmark on page {page}.");
            } else {
                annotations.add_bookmark(page, label).await?;
                println!("Bookmarked page {page}.");
            }
        }
        ReadingCommand::Note { text, page } => {
            let note = annotations.add_note(page, &text).await?;
            println!("Saved note {}.", note.id);
        }
    }

    while let Ok(event) = completions.try_recv() {
        if let TrackerEvent::Completed(target) = event {
            println!("Khatam complete, {}! Reset the target to start another.", target.user_name);
        }
    }

    store.close().await?;
    Ok(())
}
