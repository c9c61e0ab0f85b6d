use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};

use stride_config::SyncConfig;
use stride_infra::net::{default_http_client, ApiClient};
use stride_persistence::{ActivityStore, DbState, RedbActivityStore};
use stride_pipeline::sync::{HttpActivityProvider, PassEvent, PassOptions, SyncEngine};

pub struct SyncOverrides {
    pub batch_size: Option<usize>,
    pub request_delay: Option<f64>,
    pub recheck_all: bool,
}

pub async fn cmd_sync(
    root: Utf8PathBuf,
    api_url: String,
    overrides: SyncOverrides,
) -> Result<()> {
    let mut config = SyncConfig::from_env(root, api_url)?;
    if let Some(batch_size) = overrides.batch_size {
        anyhow::ensure!(batch_size > 0, "--batch-size must be positive");
        config.batch_size = batch_size;
    }
    if let Some(delay) = overrides.request_delay {
        anyhow::ensure!(delay >= 0.0, "--request-delay must be non-negative");
        config.request_delay = Duration::from_secs_f64(delay);
    }
    if overrides.recheck_all {
        config.always_recheck_all_activities = true;
    }

    println!(":: Synchronizing activities...");
    println!("   Remote: {}", config.api_url);
    println!("   Target: {}", config.download_dir);

    let client = default_http_client().context("Failed to build HTTP client")?;
    let api = ApiClient::new(
        client,
        &config.api_url,
        config.api_token.clone(),
        config.request_delay,
        config.max_fetch_attempts,
    )?;
    let engine = SyncEngine::with_components(
        Box::new(HttpActivityProvider::new(api)),
        Arc::new(RedbActivityStore::new()),
        config.download_dir.clone(),
        config.state_dir.clone(),
        PassOptions {
            batch_size: config.batch_size,
            check_for_activity_changes: config.check_for_activity_changes,
            always_recheck_all_activities: config.always_recheck_all_activities,
            filter: config.filter.clone(),
        },
    );

    let (tx, mut rx) = tokio::sync::mpsc::channel(100);
    let now = chrono::Utc::now();
    let engine_handle = tokio::spawn(async move { engine.run_pass(now, Some(tx)).await });

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let mut processed = 0u64;
    let mut written = 0u64;
    let mut failed = 0u64;
    while let Some(event) = rx.recv().await {
        match event {
            PassEvent::PageFetched { start, count } => {
                pb.set_message(format!("Listed {count} activities (offset {start})"));
            }
            PassEvent::OutputWritten { id, kind } => {
                written += 1;
                pb.set_message(format!("Saved {kind} for activity {id} ({written} files)"));
            }
            PassEvent::OutputFailed { .. } => failed += 1,
            PassEvent::ActivityProcessed { .. } => processed += 1,
        }
    }

    let report = engine_handle.await??;
    pb.finish_with_message(format!("Pass complete ({processed} activities)"));

    println!("\n:: Sync Result");
    println!("   Scan:            {}", if report.full_scan { "full history" } else { "incremental" });
    println!("   Listed:          {}", report.stats.listed);
    println!("   New:             {}", report.stats.new);
    println!("   Modified:        {}", report.stats.modified);
    println!("   Incomplete:      {}", report.stats.incomplete);
    println!("   Unchanged:       {}", report.stats.unchanged);
    println!("   Excluded:        {}", report.stats.excluded);
    println!("   Deferred:        {}", report.stats.deferred);
    println!(
        "   Files written:   {} ({})",
        report.stats.outputs_written,
        format_size(report.stats.bytes_written, DECIMAL)
    );
    if report.stats.outputs_failed > 0 || failed > 0 {
        println!(
            "   Files failed:    {} (left incomplete, retried next pass)",
            report.stats.outputs_failed
        );
    }
    if let Some(cursor) = report.checkpoint.last_incremental_cursor {
        println!("   Cursor:          {}", cursor.to_rfc3339());
    }

    Ok(())
}

pub fn cmd_status(root: Utf8PathBuf, state_dir: Option<Utf8PathBuf>) -> Result<()> {
    let state_dir = state_dir.unwrap_or_else(|| root.join(stride_config::DEFAULT_STATE_DIR_NAME));
    let store = RedbActivityStore::new();

    println!(":: Record Store");
    println!("   State dir: {state_dir}");

    match store.validate(&state_dir)? {
        DbState::Missing => {
            println!("   Status:    No store yet (run `sync` first)");
            return Ok(());
        }
        DbState::Valid => println!("   Status:    Valid"),
        DbState::Busy => {
            println!("   Status:    Busy (another process has it open)");
            return Ok(());
        }
        DbState::Corrupt => {
            println!("   Status:    Corrupt (will be rebuilt on the next sync)");
            return Ok(());
        }
        DbState::NewerSchema { found, supported } => {
            println!("   Status:    Newer schema {found} (this build supports {supported})");
            return Ok(());
        }
    }

    let records = store.scan_all(&state_dir)?;
    let complete = records.iter().filter(|r| r.is_complete()).count();
    println!("   Activities: {}", records.len());
    println!("   Complete:   {complete}");
    println!("   Incomplete: {}", records.len() - complete);

    let checkpoint = store.load_checkpoint(&state_dir)?;
    match checkpoint.last_full_scan_time {
        Some(t) => println!("   Last full scan: {}", t.to_rfc3339()),
        None => println!("   Last full scan: never"),
    }
    match checkpoint.last_incremental_cursor {
        Some(t) => println!("   Cursor:         {}", t.to_rfc3339()),
        None => println!("   Cursor:         none"),
    }

    Ok(())
}
