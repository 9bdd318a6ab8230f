//! Command-line interface for shelfrate.
//!
//! Provides the enrichment run plus a few diagnostics: probing a catalog id
//! against every storefront, scoring a title/author pair, and showing the
//! state files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::adapters::extract::PartialRating;
use crate::adapters::{AudibleAdapter, AudiobookshelfClient, GoodreadsAdapter, HttpFetcher, MediaLibrary, PageFetcher};
use crate::config::{self, ResolvedConfig};
use crate::core::{write_env_file, Orchestrator, RunContext, RunSettings, StateStore};
use crate::matching::score;

/// shelfrate - audiobook library rating enrichment
#[derive(Parser, Debug)]
#[command(name = "shelfrate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich due library items with catalog ratings
    Run {
        /// Library ids to process (comma-separated)
        #[arg(short, long, env = "LIBRARY_IDS", value_delimiter = ',')]
        library: Vec<String>,

        /// Match and merge without writing anything to the media server
        #[arg(long)]
        dry_run: bool,

        /// Maximum items per library
        #[arg(short, long, env = "BATCH_SIZE")]
        batch_size: Option<usize>,
    },

    /// Run every extraction layer for one catalog id on every storefront
    Probe {
        /// Primary catalog id
        id: String,
    },

    /// Score a candidate title/author against a local title/author
    Score {
        /// Local title
        title: String,

        /// Candidate title
        candidate_title: String,

        /// Local author (repeatable)
        #[arg(short, long)]
        author: Vec<String>,

        /// Candidate author
        #[arg(short, long)]
        candidate_author: Option<String>,
    },

    /// Show state file counts
    Status,

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Log file for this invocation; only the run command writes one
    pub fn log_file_path(&self) -> Option<PathBuf> {
        match self.command {
            Commands::Run { .. } => {
                let cfg = config::config().ok()?;
                let name = format!("run_{}.log", Local::now().format("%Y-%m-%d_%H-%M-%S"));
                Some(cfg.logs_dir().join(name))
            }
            _ => None,
        }
    }

    /// Execute the CLI command
    pub async fn execute(self, log_file: Option<PathBuf>) -> Result<()> {
        match self.command {
            Commands::Run {
                library,
                dry_run,
                batch_size,
            } => run_enrichment(library, dry_run, batch_size, log_file.as_deref()).await,
            Commands::Probe { id } => probe(&id).await,
            Commands::Score {
                title,
                candidate_title,
                author,
                candidate_author,
            } => show_score(&title, &author, &candidate_title, candidate_author.as_deref()),
            Commands::Status => show_status(),
            Commands::Config => show_config(),
        }
    }
}

fn request_timeout(cfg: &ResolvedConfig) -> Duration {
    Duration::from_secs(cfg.limits.request_timeout_secs)
}

fn primary_adapter(cfg: &ResolvedConfig, fetcher: Arc<dyn PageFetcher>) -> AudibleAdapter {
    AudibleAdapter::new(fetcher, cfg.regions.clone(), cfg.matching.clone())
}

/// Run the enrichment over all configured libraries
async fn run_enrichment(
    library_ids: Vec<String>,
    dry_run: bool,
    batch_size: Option<usize>,
    log_file: Option<&Path>,
) -> Result<()> {
    let mut cfg = config::config()?.clone();
    if !library_ids.is_empty() {
        cfg.library_ids = library_ids;
    }
    if dry_run {
        cfg.dry_run = true;
    }
    if let Some(size) = batch_size {
        cfg.batch_size = size;
    }
    if cfg.library_ids.is_empty() {
        anyhow::bail!("No library ids configured (set LIBRARY_IDS or media.library_ids)");
    }

    let (url, token) = cfg.media_credentials()?;
    let timeout = request_timeout(&cfg);
    let library = Arc::new(AudiobookshelfClient::new(url, token, timeout)?);
    library
        .ping()
        .await
        .context("Media server connection check failed")?;
    info!(url = %url, "Connected to media server");

    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(timeout)?);
    let primary = Arc::new(primary_adapter(&cfg, fetcher.clone()));
    let secondary = Arc::new(GoodreadsAdapter::new(
        fetcher,
        cfg.secondary_base_url.clone(),
        cfg.matching.clone(),
    ));

    let orchestrator = Orchestrator::new(library, primary, secondary, RunSettings::from_config(&cfg));
    let mut ctx = RunContext::new(StateStore::open(&cfg), Local::now().date_naive());

    let started = Instant::now();
    let result = orchestrator.run(&mut ctx).await;

    let log_name = log_file
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string());
    write_env_file(
        &cfg.summary_env_path(),
        &ctx.stats,
        started.elapsed(),
        log_name.as_deref(),
    )?;

    println!("{}", ctx.stats.report_line());
    result
}

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "-".to_string())
}

fn fmt_rating(rating: &PartialRating) -> String {
    format!(
        "overall {} | performance {} | story {} | votes {}",
        fmt_value(rating.overall),
        fmt_value(rating.performance),
        fmt_value(rating.story),
        rating
            .count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string())
    )
}

/// Probe one catalog id on every storefront
async fn probe(id: &str) -> Result<()> {
    let cfg = config::config()?;
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(request_timeout(cfg))?);
    let adapter = primary_adapter(cfg, fetcher);

    let probes = adapter
        .probe(id.trim())
        .await
        .map_err(|blocked| anyhow::anyhow!("Blocked while probing: {}", blocked))?;

    for probe in probes {
        println!("=== {} ({}) ===", probe.region, probe.host);
        println!(
            "Status: {}",
            probe
                .status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "request failed".to_string())
        );
        if let Some(url) = &probe.final_url {
            println!("Final URL: {}", url);
        }
        if let Some(outcome) = probe.outcome {
            println!("Outcome: {:?}", outcome);
        }
        if probe.redirected {
            println!("Redirected: final URL no longer contains {}", id.trim());
        }
        for warning in &probe.warnings {
            println!("Warning: {}", warning);
        }
        for (layer, rating) in &probe.layers {
            println!("  {:<16} {}", layer.label(), fmt_rating(rating));
        }
        if !probe.layers.is_empty() {
            println!("  {:<16} {}", "combined", fmt_rating(&probe.combined));
        }
        for (region, alternate) in &probe.alternates {
            println!("  alternate {}: {}", region, alternate);
        }
        match &probe.search_fallback {
            Some(rating) => println!("  {:<16} {}", "search fallback", fmt_rating(rating)),
            None => println!("  {:<16} no result", "search fallback"),
        }
        println!();
    }

    Ok(())
}

/// Print the match score of a candidate
fn show_score(title: &str, authors: &[String], candidate_title: &str, candidate_author: Option<&str>) -> Result<()> {
    let cfg = config::config()?;
    let tuning = &cfg.matching;
    let result = score(title, authors, candidate_title, candidate_author, tuning);

    println!("Title score:     {:.3}", result.title_score);
    println!("Combined score:  {:.3}", result.combined_score);
    println!("Author accepted: {}", result.author_accepted);
    println!("Volumes match:   {}", result.volume_numbers_compatible);
    println!(
        "Accepted (primary {:.2}):   {}",
        tuning.primary_accept,
        result.is_accepted(tuning.primary_accept)
    );
    println!(
        "Accepted (secondary {:.2}): {}",
        tuning.secondary_accept,
        result.is_accepted(tuning.secondary_accept)
    );

    Ok(())
}

/// Show state file counts
fn show_status() -> Result<()> {
    let cfg = config::config()?;
    let counts = StateStore::open(cfg).counts();

    println!("State home:        {}", cfg.home.display());
    println!("History entries:   {}", counts.history);
    println!("Failure counters:  {}", counts.failed);
    println!("Missing (primary): {}", counts.missing_primary);
    println!("Missing (second.): {}", counts.missing_secondary);

    let summary = cfg.summary_env_path();
    if let Ok(content) = std::fs::read_to_string(&summary) {
        println!();
        println!("Last run ({}):", summary.display());
        for line in content.lines() {
            println!("  {}", line);
        }
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  History:  {}", cfg.history_path().display());
    println!("  Reports:  {}", cfg.reports_dir().display());
    println!("  Logs:     {}", cfg.logs_dir().display());
    println!();
    println!("Media server:");
    println!("  URL:       {}", cfg.media_url.as_deref().unwrap_or("(not set)"));
    println!("  Token:     {}", if cfg.api_token.is_some() { "(set)" } else { "(not set)" });
    println!("  Libraries: {}", cfg.library_ids.join(", "));
    println!();
    println!("Schedule:");
    println!("  Refresh days: {}", cfg.refresh_days);
    println!("  Batch size:   {}", cfg.batch_size);
    println!("  Dry run:      {}", cfg.dry_run);
    println!();
    println!("Storefronts:");
    for region in &cfg.regions {
        println!("  {:<4} {} ({})", region.code, region.host, region.language_codes.join(", "));
    }
    println!("Secondary catalog: {}", cfg.secondary_base_url);
    println!();
    println!("Limits:");
    println!("  Base sleep:        {}s", cfg.limits.base_sleep_secs);
    println!("  Search penalty:    {}s", cfg.limits.search_penalty_secs);
    println!("  Recovery pause:    {}s", cfg.limits.recovery_pause_secs);
    println!("  Max fail attempts: {}", cfg.limits.max_fail_attempts);
    println!("  Max block signals: {}", cfg.limits.max_consecutive_blocks);

    Ok(())
}
