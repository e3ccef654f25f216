pub mod classifier;
pub mod config;
pub mod error;
pub mod http_client;
pub mod manifest;
pub mod municipality;
pub mod orchestrator;
pub mod rate_limiter;
pub mod report;
pub mod robots;
pub mod seed_crawler;
pub mod seed_detector;
pub mod util;

use anyhow::{Context, Result};
use config::Config;
use http_client::HttpClient;
use manifest::ManifestStore;
use orchestrator::RunTotals;
use rate_limiter::RateLimiter;
use robots::RobotsCache;
use seed_crawler::SharedDeps;
use std::sync::Arc;

/// Runs one full crawl: load municipalities, select seeds, crawl them with
/// a bounded worker pool, then write the denial report (§4.8, §4.9, §4.12).
pub async fn run(config: Config) -> Result<RunTotals> {
    let started_at = std::time::Instant::now();
    let municipalities = municipality::load_municipalities(&config.input)?;

    let mut tasks = Vec::new();
    for m in &municipalities {
        tasks.extend(municipality::select_seeds(m, config.threshold));
    }
    tracing::info!(
        municipalities = municipalities.len(),
        seeds = tasks.len(),
        workers = config.workers,
        "starting crawl"
    );

    let client = HttpClient::new(&config.user_agent, config.timeout)?;
    let robots = RobotsCache::new(client.clone(), client.user_agent().to_string(), config.respect_robots);
    let rate_limiter = RateLimiter::new(config.global_min_delay);
    let (manifest, writer_handle) =
        ManifestStore::open(&config.manifest_path, config.resume, config.overwrite_manifest)
            .map_err(anyhow::Error::from)?;

    let report_dir = config.report_dir.clone();
    let deps = Arc::new(SharedDeps {
        client,
        robots,
        rate_limiter,
        manifest,
        config,
    });

    let run_fut = orchestrator::run(deps.clone(), tasks);
    tokio::pin!(run_fut);

    let totals = tokio::select! {
        totals = &mut run_fut => totals,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, waiting for in-flight seeds to finish");
            run_fut.await
        }
    };

    report::write(&report_dir, &deps.manifest).context("writing denial report")?;

    let malformed = deps.manifest.malformed_line_count();
    let write_failures = deps.manifest.write_failure_count();
    let denials_recorded = deps.manifest.denials_snapshot().len();

    match Arc::try_unwrap(deps) {
        Ok(shared) => shared.manifest.close(writer_handle).await,
        Err(_) => tracing::warn!("shared deps still referenced at shutdown; skipping graceful manifest close"),
    }

    tracing::info!(
        seeds_total = totals.seeds_total,
        seeds_done = totals.seeds_done,
        seeds_skipped = totals.seeds_skipped,
        seeds_failed = totals.seeds_failed,
        pages_fetched = totals.pages_fetched,
        files_downloaded = totals.files_downloaded,
        denials_recorded = denials_recorded,
        manifest_malformed_lines = malformed,
        manifest_write_failures = write_failures,
        elapsed_secs = started_at.elapsed().as_secs_f64(),
        "crawl run complete"
    );

    if write_failures > 0 {
        anyhow::bail!("manifest writer reported {write_failures} failed writes");
    }
    Ok(totals)
}
