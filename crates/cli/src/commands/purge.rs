use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use clap::Args;
use console::style;
use dialoguer::Confirm;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use bucketeer_core::bulk::DEFAULT_BATCH_SIZE;
use bucketeer_core::{BulkDeleteReport, DeleteMatching, ObjectKey};

use crate::config::AppConfig;
use crate::progress;

/// Failed keys printed before the summary is truncated.
const MAX_FAILED_SHOWN: usize = 20;

#[derive(Args)]
pub struct PurgeArgs {
    /// Only consider keys under this prefix
    #[arg(long, default_value = "")]
    prefix: String,

    /// Only delete keys fully matching this regular expression
    #[arg(long)]
    pattern: Option<String>,

    /// Keys per delete request (1-1000)
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Print matching keys without deleting anything
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    yes: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Override the configured bucket
    #[arg(long)]
    bucket: Option<String>,
}

pub async fn run(args: PurgeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let storage = config.open_storage()?;
    let target = args
        .bucket
        .clone()
        .unwrap_or_else(|| storage.container().name().to_string());

    let mut options = DeleteMatching::new()
        .prefix(args.prefix.as_str())
        .batch_size(args.batch_size);
    if let Some(pattern) = &args.pattern {
        options = options.pattern(pattern.as_str());
    }

    if args.dry_run {
        let matched = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&matched);
        let options = options.before_delete(move |key: &ObjectKey| {
            println!("{key}");
            counter.fetch_add(1, Ordering::Relaxed);
            false
        });
        storage
            .delete_matching_objects(&options, args.bucket.as_deref())
            .await?;
        println!(
            "\n{} objects would be deleted from {target}",
            matched.load(Ordering::Relaxed)
        );
        return Ok(());
    }

    if !args.yes {
        let prompt = format!(
            "Delete objects in '{target}' (prefix: {}, pattern: {})?",
            display_or_any(&args.prefix),
            display_or_any(args.pattern.as_deref().unwrap_or("")),
        );
        if !Confirm::new().with_prompt(prompt).default(false).interact()? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current batch");
            interrupt.cancel();
        }
    });

    let spinner = progress::create_spinner(&format!("Deleting from {target}..."));
    let queued = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&queued);
    let pb = spinner.clone();
    let options = options
        .cancellation(token)
        .before_delete(move |_: &ObjectKey| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            pb.set_message(format!("Deleting from {target}... {n} objects queued"));
            true
        });

    let report = storage
        .delete_matching_objects(&options, args.bucket.as_deref())
        .await;
    spinner.finish_and_clear();
    let report = report?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }

    if !report.is_complete() {
        anyhow::bail!("purge interrupted before all matching objects were processed");
    }
    if !report.failed().is_empty() {
        anyhow::bail!("{} objects could not be deleted", report.failed().len());
    }
    Ok(())
}

fn display_or_any(value: &str) -> &str {
    if value.is_empty() { "any" } else { value }
}

fn print_summary(report: &BulkDeleteReport) {
    println!(
        "{} {} objects in {} requests",
        style("Deleted").green().bold(),
        report.deleted().len(),
        report.batches()
    );
    if report.failed().is_empty() {
        return;
    }
    println!(
        "{} {} objects ({} not found)",
        style("Failed").red().bold(),
        report.failed().len(),
        report.not_found().count()
    );
    for (key, reason) in report.failed().iter().take(MAX_FAILED_SHOWN) {
        println!("  - {key}: {reason}");
    }
    if report.failed().len() > MAX_FAILED_SHOWN {
        println!("  ... and {} more", report.failed().len() - MAX_FAILED_SHOWN);
    }
}
