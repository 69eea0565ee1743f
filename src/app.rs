use crate::cli::Cli;
use crate::config::{IngestConfig, SubjectlessPolicy};
use crate::dedupe::{DedupeReport, Deduplicator};
use crate::gmail::GmailClient;
use crate::ingest::{IngestEngine, IngestSummary};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = IngestConfig::load(cli.config.as_deref())?;
    apply_cli(&mut config, &cli);
    config.validate()?;
    init_tracing(&config.log_level);
    info!(dest = %config.dest_root.display(), "Using destination root");

    if cli.dedupe_only {
        return dedupe_only(&config).await;
    }

    let token = config
        .access_token
        .clone()
        .ok_or_else(|| anyhow!("no access token; set MAILSIFT_ACCESS_TOKEN or GMAIL_ACCESS_TOKEN"))?;
    let client = GmailClient::new(&config.api_base, &config.user_id, &token)?;
    let query = config.query.clone();
    let engine = IngestEngine::new(Arc::new(client), config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing in-flight messages");
            on_signal.cancel();
        }
    });

    let summary = engine
        .run(&query, &cancel)
        .await
        .context("ingestion run failed")?;
    print_summary(&summary);

    Ok(())
}

pub fn apply_cli(config: &mut IngestConfig, cli: &Cli) {
    if let Some(query) = &cli.query {
        config.query = query.clone();
    }
    if let Some(user_id) = &cli.user_id {
        config.user_id = user_id.clone();
    }
    if let Some(dest) = &cli.dest {
        config.dest_root = dest.clone();
    }
    if let Some(concurrency) = cli.concurrency {
        config.concurrency = concurrency;
    }
    if cli.no_dedupe {
        config.dedupe = false;
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if cli.shared_inbox {
        config.subjectless = SubjectlessPolicy::Shared;
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn dedupe_only(config: &IngestConfig) -> Result<()> {
    if !config.dest_root.is_dir() {
        warn!(dest = %config.dest_root.display(), "Destination directory not found; nothing to clean");
        return Ok(());
    }

    let root = config.dest_root.clone();
    let dedup = Deduplicator::new(config.keep).dry_run(config.dry_run);
    let report = tokio::task::spawn_blocking(move || dedup.run(&root))
        .await
        .context("dedupe task panicked")??;

    println!("\n{}", "=".repeat(80));
    print_dedupe(&report);
    println!("{}", "=".repeat(80));
    Ok(())
}

fn print_summary(summary: &IngestSummary) {
    println!("\n{}", "=".repeat(80));
    println!(
        "Found {} messages, ingested {}, failed {}{}",
        summary.found,
        summary.ingested.len(),
        summary.failed.len(),
        if summary.cancelled {
            format!(", {} not started (cancelled)", summary.not_started)
        } else {
            String::new()
        }
    );
    println!(
        "Wrote {} files in {:.1}s",
        summary.files_written(),
        (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0
    );

    for msg in &summary.ingested {
        println!(
            "   {} -> {} ({} files)",
            msg.message_id,
            msg.folder.name,
            msg.report.files_written()
        );
    }
    for (id, error) in &summary.failed {
        println!("   {id} FAILED: {error}");
    }

    if let Some(report) = &summary.dedupe {
        println!();
        print_dedupe(report);
    }
    if let Some(error) = &summary.dedupe_error {
        println!();
        println!("Dedupe FAILED: {error}");
    }
    println!("{}", "=".repeat(80));
}

fn print_dedupe(report: &DedupeReport) {
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };
    println!(
        "Scanned {} folders, {} duplicate groups",
        report.scanned,
        report.groups.len()
    );
    for path in &report.removed {
        println!("   {verb} {}", path.display());
    }
    for path in &report.delete_failures {
        println!("   Could not delete {}", path.display());
    }
    for path in &report.hash_failures {
        println!("   Could not hash {}", path.display());
    }
}
