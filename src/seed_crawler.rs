//! Bounded-breadth traversal of a single seed (§4.7).

use crate::classifier::{extract_links, normalize, MinuteScore};
use crate::config::Config;
use crate::error::CrawlError;
use crate::http_client::{is_html, Fetched, HttpClient, Validator};
use crate::manifest::{LinkKind, ManifestEvent, ManifestRecord, ManifestStore, SkipReason};
use crate::municipality::SeedTask;
use crate::rate_limiter::RateLimiter;
use crate::robots::{path_prefix, RobotsCache};
use crate::seed_detector::{self, ChangeDecision, SkipReasonKind};
use crate::util::{last_segment, resolve_collision, safe_filename, sha256_hex};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Collaborators shared across every seed crawl in the run (§4.8, §5).
pub struct SharedDeps {
    pub client: HttpClient,
    pub robots: RobotsCache,
    pub rate_limiter: RateLimiter,
    pub manifest: ManifestStore,
    pub config: Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStatus {
    Done,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct SeedOutcome {
    pub pages_fetched: usize,
    pub files_downloaded: usize,
    pub status: SeedStatus,
}

impl SeedOutcome {
    fn skipped() -> Self {
        Self {
            pages_fetched: 0,
            files_downloaded: 0,
            status: SeedStatus::Skipped,
        }
    }

    fn failed() -> Self {
        Self {
            pages_fetched: 0,
            files_downloaded: 0,
            status: SeedStatus::Failed,
        }
    }
}

enum Visit {
    Denied,
    Fetched(Fetched),
    Failed(CrawlError),
}

/// Rate-limits, then fetches `url`. Assumes the caller has already checked
/// robots for this exact URL (used for retries of a seed already cleared).
async fn rate_limited_get(deps: &SharedDeps, url: &Url) -> Result<Fetched, CrawlError> {
    let host = url.host_str().unwrap_or_default().to_string();
    let delay = deps.robots.crawl_delay(url).await.map(Duration::from_secs);
    deps.rate_limiter.wait(&host, delay).await;
    deps.client.get(url.as_str()).await
}

/// Robots-checks, rate-limits, then fetches `url` (used for frontier links,
/// which have not been individually robots-checked yet).
async fn visit(deps: &SharedDeps, url: &Url, depth: usize) -> Visit {
    tracing::debug!(url = url.as_str(), depth, phase = "visit", "visiting frontier link");
    if deps.config.respect_robots && !deps.robots.allowed(url).await {
        return Visit::Denied;
    }
    match rate_limited_get(deps, url).await {
        Ok(f) => Visit::Fetched(f),
        Err(e) => Visit::Failed(e),
    }
}

async fn record_denial(deps: &SharedDeps, task: &SeedTask, url: &Url) {
    let host = url.host_str().unwrap_or_default().to_string();
    let prefix = path_prefix(url.path());
    if deps.robots.record_denial_once(&host, &prefix, url.as_str()) {
        emit(
            deps,
            task,
            ManifestEvent::RobotsDenied {
                url: url.to_string(),
                host,
                path_prefix: prefix,
            },
        )
        .await;
    }
}

async fn emit(deps: &SharedDeps, task: &SeedTask, event: ManifestEvent) {
    deps.manifest
        .append(ManifestRecord::new(&task.prefecture, &task.city, &task.seed_url, event))
        .await;
}

async fn emit_error(deps: &SharedDeps, task: &SeedTask, url: &str, err: &CrawlError) {
    emit(
        deps,
        task,
        ManifestEvent::Error {
            url: url.to_string(),
            phase: err.phase().to_string(),
            message: err.to_string(),
        },
    )
    .await;
}

fn in_scope(config: &Config, seed: &Url, link: &Url) -> bool {
    if config.same_domain_only && link.host_str() != seed.host_str() {
        return false;
    }
    if config.same_path_prefix_only && !link.path().starts_with(seed.path()) {
        return false;
    }
    true
}

/// Crawls one seed end to end, emitting manifest events as it goes (§4.7).
/// Never returns an error: per §7, all per-URL and seed-level faults are
/// recorded and swallowed so resume can retry the seed on a future run.
pub async fn crawl_seed(deps: &SharedDeps, task: &SeedTask) -> SeedOutcome {
    tracing::info!(seed_url = %task.seed_url, phase = "seed_start", "starting seed crawl");
    emit(deps, task, ManifestEvent::SeedStarted).await;

    let seed_url = match Url::parse(&task.seed_url) {
        Ok(u) => u,
        Err(e) => {
            emit(
                deps,
                task,
                ManifestEvent::Error {
                    url: task.seed_url.clone(),
                    phase: "parse".to_string(),
                    message: e.to_string(),
                },
            )
            .await;
            return SeedOutcome::failed();
        }
    };

    if deps.config.respect_robots && !deps.robots.allowed(&seed_url).await {
        record_denial(deps, task, &seed_url).await;
        emit(
            deps,
            task,
            ManifestEvent::SeedSkipped {
                reason: SkipReason::RobotsDenied,
            },
        )
        .await;
        return SeedOutcome::skipped();
    }

    let prior = deps
        .manifest
        .completed_validator(&task.prefecture, &task.city, &task.seed_url);

    let seed_fetch = match resolve_seed_fetch(deps, task, &seed_url, prior.as_ref()).await {
        Outcome::Skip(reason) => {
            emit(deps, task, ManifestEvent::SeedSkipped { reason: reason.into() }).await;
            return SeedOutcome::skipped();
        }
        Outcome::Fetched(f) => f,
        Outcome::Failed => return SeedOutcome::failed(),
    };

    let validator = seed_detector::validator_from(&seed_fetch);
    let mut visited: HashSet<Url> = HashSet::new();
    visited.insert(normalize(seed_url.as_str(), &seed_url).unwrap_or_else(|| seed_url.clone()));
    let mut frontier: VecDeque<(Url, usize)> = VecDeque::new();
    let mut pages_fetched = 0usize;
    let mut files_downloaded = 0usize;

    process_response(
        deps,
        task,
        &seed_url,
        &seed_url,
        0,
        seed_fetch,
        &mut frontier,
        &mut visited,
        &mut pages_fetched,
        &mut files_downloaded,
    )
    .await;

    while pages_fetched < deps.config.max_pages {
        let Some((url, depth)) = frontier.pop_front() else {
            break;
        };
        match visit(deps, &url, depth).await {
            Visit::Denied => record_denial(deps, task, &url).await,
            Visit::Failed(e) => emit_error(deps, task, url.as_str(), &e).await,
            Visit::Fetched(resp) => {
                process_response(
                    deps,
                    task,
                    &seed_url,
                    &url,
                    depth,
                    resp,
                    &mut frontier,
                    &mut visited,
                    &mut pages_fetched,
                    &mut files_downloaded,
                )
                .await;
            }
        }
    }

    emit(
        deps,
        task,
        ManifestEvent::SeedDone {
            pages_fetched,
            files_downloaded,
            index_validator: validator,
        },
    )
    .await;

    tracing::info!(
        seed_url = %task.seed_url,
        pages_fetched,
        files_downloaded,
        phase = "seed_done",
        "finished seed crawl"
    );

    SeedOutcome {
        pages_fetched,
        files_downloaded,
        status: SeedStatus::Done,
    }
}

enum Outcome {
    Skip(SkipReasonKind),
    Fetched(Fetched),
    Failed,
}

impl From<SkipReasonKind> for SkipReason {
    fn from(value: SkipReasonKind) -> Self {
        match value {
            SkipReasonKind::CompletedUnchanged => SkipReason::CompletedUnchanged,
            SkipReasonKind::NoChangeDetected => SkipReason::NoChangeDetected,
        }
    }
}

/// Implements the branch of §4.5/§4.7 that decides whether to fetch the seed
/// at all, and with which method (plain GET, conditional GET, or skip).
/// Robots has already been cleared for `seed_url` by the caller.
async fn resolve_seed_fetch(
    deps: &SharedDeps,
    task: &SeedTask,
    seed_url: &Url,
    prior: Option<&Validator>,
) -> Outcome {
    let should_bypass_detector =
        deps.config.force_crawl || prior.is_none() || !deps.config.skip_completed_seeds;

    if should_bypass_detector {
        return fetch_plain(deps, task, seed_url).await;
    }

    let prior = prior.expect("checked above");

    if !prior.is_change_checked() {
        if !deps.config.recheck_seeds {
            return Outcome::Skip(SkipReasonKind::CompletedUnchanged);
        }
        return match rate_limited_get(deps, seed_url).await {
            Ok(f) => match seed_detector::decide_from_plain(f, Some(prior)) {
                ChangeDecision::Skip(reason) => Outcome::Skip(reason),
                ChangeDecision::Recrawl(f) => Outcome::Fetched(f),
            },
            Err(e) => {
                emit_error(deps, task, seed_url.as_str(), &e).await;
                Outcome::Failed
            }
        };
    }

    if !deps.config.recheck_seeds {
        return Outcome::Skip(SkipReasonKind::CompletedUnchanged);
    }

    let host = seed_url.host_str().unwrap_or_default().to_string();
    let delay = deps.robots.crawl_delay(seed_url).await.map(Duration::from_secs);
    deps.rate_limiter.wait(&host, delay).await;
    match deps.client.conditional_get(seed_url.as_str(), prior).await {
        Ok(result) => match seed_detector::decide_from_conditional(result, prior) {
            ChangeDecision::Skip(reason) => Outcome::Skip(reason),
            ChangeDecision::Recrawl(f) => Outcome::Fetched(f),
        },
        Err(e) => {
            emit_error(deps, task, seed_url.as_str(), &e).await;
            Outcome::Failed
        }
    }
}

async fn fetch_plain(deps: &SharedDeps, task: &SeedTask, url: &Url) -> Outcome {
    match rate_limited_get(deps, url).await {
        Ok(f) => Outcome::Fetched(f),
        Err(e) => {
            emit_error(deps, task, url.as_str(), &e).await;
            Outcome::Failed
        }
    }
}

/// Handles one fetched response: saves/links an HTML page, or downloads a
/// direct-hit payload. `pages_fetched` is only incremented for HTML pages;
/// files are tracked separately via `files_downloaded`.
#[allow(clippy::too_many_arguments)]
async fn process_response(
    deps: &SharedDeps,
    task: &SeedTask,
    seed_url: &Url,
    page_url: &Url,
    depth: usize,
    resp: Fetched,
    frontier: &mut VecDeque<(Url, usize)>,
    visited: &mut HashSet<Url>,
    pages_fetched: &mut usize,
    files_downloaded: &mut usize,
) {
    if !is_html(resp.content_type.as_deref(), &resp.final_url) {
        maybe_download(deps, task, page_url, page_url, &resp, files_downloaded).await;
        return;
    }

    *pages_fetched += 1;
    save_page(deps, task, page_url, &resp.body).await;

    let body = String::from_utf8_lossy(&resp.body).to_string();
    for link in extract_links(&body, page_url) {
        if deps.config.classifier.is_minute_file(link.url.as_str()) {
            if deps.config.classifier.looks_like_minute(link.url.as_str(), &link.anchor_text) >= MinuteScore::Hint {
                maybe_download_link(deps, task, page_url, &link.url, files_downloaded).await;
            }
            continue;
        }

        if !in_scope(&deps.config, seed_url, &link.url) {
            continue;
        }
        if depth + 1 > deps.config.max_depth {
            continue;
        }
        if !visited.insert(link.url.clone()) {
            continue;
        }
        frontier.push_back((link.url.clone(), depth + 1));
    }
}

async fn save_page(deps: &SharedDeps, task: &SeedTask, url: &Url, body: &[u8]) {
    if deps.config.no_download {
        return;
    }
    let dir = deps
        .config
        .outdir
        .join(&task.prefecture)
        .join(&task.city)
        .join("pages");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        emit_error(
            deps,
            task,
            url.as_str(),
            &CrawlError::Filesystem {
                path: dir.display().to_string(),
                source: e,
            },
        )
        .await;
        return;
    }

    let sha = sha256_hex(body);
    let mut name = safe_filename(&last_segment(url), &sha);
    if !name.ends_with(".html") && !name.ends_with(".htm") {
        name.push_str(".html");
    }
    let path = resolve_collision(&dir, &name, &sha);

    match write_atomic(&path, body).await {
        Ok(()) => {
            emit(
                deps,
                task,
                ManifestEvent::PageSaved {
                    url: url.to_string(),
                    path: path.display().to_string(),
                    content_sha256: sha,
                },
            )
            .await;
        }
        Err(e) => emit_error(deps, task, url.as_str(), &e).await,
    }
}

/// Link discovered on a page and classified as a minute file (§4.4/§4.7).
async fn maybe_download_link(
    deps: &SharedDeps,
    task: &SeedTask,
    page_url: &Url,
    link_url: &Url,
    files_downloaded: &mut usize,
) {
    emit(
        deps,
        task,
        ManifestEvent::LinkFound {
            page_url: page_url.to_string(),
            target_url: link_url.to_string(),
            link_kind: LinkKind::File,
        },
    )
    .await;

    if !should_attempt_download(deps, link_url) {
        return;
    }

    match visit(deps, link_url, 0).await {
        Visit::Denied => record_denial(deps, task, link_url).await,
        Visit::Failed(e) => emit_error(deps, task, link_url.as_str(), &e).await,
        Visit::Fetched(resp) => download_file(deps, task, link_url, &resp, files_downloaded).await,
    }
}

/// The seed URL itself resolved to a payload (§4.7: "If response is a file
/// (direct hit on seed), treat as payload"). Synthesizes the preceding
/// `link_found` the manifest invariant requires, then downloads in place
/// using the response already in hand (no second fetch).
async fn maybe_download(
    deps: &SharedDeps,
    task: &SeedTask,
    page_url: &Url,
    link_url: &Url,
    resp: &Fetched,
    files_downloaded: &mut usize,
) {
    emit(
        deps,
        task,
        ManifestEvent::LinkFound {
            page_url: page_url.to_string(),
            target_url: link_url.to_string(),
            link_kind: LinkKind::File,
        },
    )
    .await;
    if !should_attempt_download(deps, link_url) {
        return;
    }
    download_file(deps, task, link_url, resp, files_downloaded).await;
}

/// Applies `--no-download`/`--no-download-files`/`--force-download` and
/// claims the URL in the manifest's downloaded-set, all before any network
/// call, so two seeds racing for the same file never both fetch it (§4.7).
fn should_attempt_download(deps: &SharedDeps, url: &Url) -> bool {
    if deps.config.no_download || deps.config.no_download_files {
        return false;
    }
    if deps.config.force_download {
        deps.manifest.try_claim_download(url.as_str());
        return true;
    }
    if deps.manifest.is_downloaded(url.as_str()) {
        return false;
    }
    deps.manifest.try_claim_download(url.as_str())
}

async fn download_file(
    deps: &SharedDeps,
    task: &SeedTask,
    url: &Url,
    resp: &Fetched,
    files_downloaded: &mut usize,
) {
    let dir = deps
        .config
        .outdir
        .join(&task.prefecture)
        .join(&task.city)
        .join("files");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        emit_error(
            deps,
            task,
            url.as_str(),
            &CrawlError::Filesystem {
                path: dir.display().to_string(),
                source: e,
            },
        )
        .await;
        return;
    }

    let sha = sha256_hex(&resp.body);
    let base_name = safe_filename(&last_segment(url), &sha);
    let path = resolve_collision(&dir, &base_name, &sha);

    match write_atomic(&path, &resp.body).await {
        Ok(()) => {
            *files_downloaded += 1;
            emit(
                deps,
                task,
                ManifestEvent::DownloadedFile {
                    url: url.to_string(),
                    path: path.display().to_string(),
                    size: resp.body.len() as u64,
                    content_sha256: sha,
                },
            )
            .await;
        }
        Err(e) => emit_error(deps, task, url.as_str(), &e).await,
    }
}

/// Writes to a temp file in the same directory, fsyncs, then renames into
/// place atomically (§4.7).
async fn write_atomic(final_path: &Path, body: &[u8]) -> Result<(), CrawlError> {
    let dir = final_path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        final_path.file_name().and_then(|n| n.to_str()).unwrap_or("download")
    ));

    let to_err = |source: std::io::Error| CrawlError::Filesystem {
        path: tmp_path.display().to_string(),
        source,
    };

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(to_err)?;
    use tokio::io::AsyncWriteExt;
    file.write_all(body).await.map_err(to_err)?;
    file.sync_all().await.map_err(to_err)?;
    drop(file);

    tokio::fs::rename(&tmp_path, final_path)
        .await
        .map_err(|source| CrawlError::Filesystem {
            path: final_path.display().to_string(),
            source,
        })
}
