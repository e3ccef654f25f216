//! Bounded worker pool over the seed queue (§4.8).

use crate::municipality::SeedTask;
use crate::seed_crawler::{crawl_seed, SeedOutcome, SeedStatus, SharedDeps};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Default)]
pub struct RunTotals {
    pub seeds_total: usize,
    pub seeds_done: usize,
    pub seeds_skipped: usize,
    pub seeds_failed: usize,
    pub pages_fetched: usize,
    pub files_downloaded: usize,
}

/// Runs every seed task with at most `deps.config.workers` crawls in flight
/// at once. A slow or stuck seed never blocks the others; each acquires its
/// own semaphore permit and releases it on completion.
pub async fn run(deps: Arc<SharedDeps>, tasks: Vec<SeedTask>) -> RunTotals {
    let permits = Arc::new(Semaphore::new(deps.config.workers));
    let mut joins: JoinSet<SeedOutcome> = JoinSet::new();
    let mut totals = RunTotals {
        seeds_total: tasks.len(),
        ..RunTotals::default()
    };

    for task in tasks {
        let deps = deps.clone();
        let permits = permits.clone();
        joins.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            crawl_seed(&deps, &task).await
        });
    }

    while let Some(result) = joins.join_next().await {
        match result {
            Ok(outcome) => {
                totals.pages_fetched += outcome.pages_fetched;
                totals.files_downloaded += outcome.files_downloaded;
                match outcome.status {
                    SeedStatus::Done => totals.seeds_done += 1,
                    SeedStatus::Skipped => totals.seeds_skipped += 1,
                    SeedStatus::Failed => totals.seeds_failed += 1,
                }
            }
            Err(join_err) => {
                totals.seeds_failed += 1;
                tracing::error!(error = %join_err, "seed crawl task panicked");
            }
        }
    }

    totals
}
