//! Append-only JSONL event log and its derived in-memory indices (§4.6).

use crate::error::CrawlError;
use crate::http_client::Validator;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    File,
    Page,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    CompletedUnchanged,
    NoChangeDetected,
    RobotsDenied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestEvent {
    SeedStarted,
    SeedDone {
        pages_fetched: usize,
        files_downloaded: usize,
        index_validator: Validator,
    },
    PageSaved {
        url: String,
        path: String,
        content_sha256: String,
    },
    LinkFound {
        page_url: String,
        target_url: String,
        link_kind: LinkKind,
    },
    DownloadedFile {
        url: String,
        path: String,
        size: u64,
        content_sha256: String,
    },
    RobotsDenied {
        url: String,
        host: String,
        path_prefix: String,
    },
    Error {
        url: String,
        phase: String,
        message: String,
    },
    SeedSkipped {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestRecord {
    pub timestamp: String,
    pub prefecture: String,
    pub city: String,
    pub seed_url: String,
    #[serde(flatten)]
    pub event: ManifestEvent,
}

impl ManifestRecord {
    pub fn new(prefecture: &str, city: &str, seed_url: &str, event: ManifestEvent) -> Self {
        let timestamp = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default();
        Self {
            timestamp,
            prefecture: prefecture.to_string(),
            city: city.to_string(),
            seed_url: seed_url.to_string(),
            event,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DenialRecord {
    pub prefecture: String,
    pub city: String,
    pub host: String,
    pub path_prefix: String,
    pub url: String,
}

type SeedKey = (String, String, String);

/// Derived indices built at startup (and kept live during the run) that let
/// the rest of the engine answer resume questions without re-reading the file.
#[derive(Default)]
pub struct ManifestIndex {
    pub completed_seeds: HashMap<SeedKey, Validator>,
    pub downloaded_urls: HashSet<String>,
    pub saved_pages: HashMap<String, String>,
}

pub struct ManifestStore {
    tx: mpsc::Sender<ManifestRecord>,
    index: Arc<RwLock<ManifestIndex>>,
    denials: Arc<Mutex<Vec<DenialRecord>>>,
    malformed_lines: Arc<AtomicUsize>,
    write_failures: Arc<AtomicUsize>,
}

impl ManifestStore {
    /// Opens (and, in resume mode, replays) the manifest file, then spawns
    /// the single writer task. Returns the store plus its writer's join handle.
    pub fn open(path: &Path, resume: bool, overwrite: bool) -> Result<(Self, JoinHandle<()>), CrawlError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CrawlError::Filesystem {
                path: parent.display().to_string(),
                source,
            })?;
        }

        if overwrite && path.exists() {
            std::fs::remove_file(path).map_err(|source| CrawlError::Filesystem {
                path: path.display().to_string(),
                source,
            })?;
        }

        let mut index = ManifestIndex::default();
        let mut denials = Vec::new();
        let mut malformed = 0usize;

        if resume && path.exists() {
            let file = std::fs::File::open(path).map_err(|source| CrawlError::Filesystem {
                path: path.display().to_string(),
                source,
            })?;
            for line in BufReader::new(file).lines() {
                let Ok(line) = line else {
                    malformed += 1;
                    continue;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ManifestRecord>(&line) {
                    Ok(record) => apply_to_index(&mut index, &mut denials, &record),
                    Err(err) => {
                        tracing::warn!(error = %err, "ignoring malformed manifest line");
                        malformed += 1;
                    }
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| CrawlError::Filesystem {
                path: path.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel::<ManifestRecord>(1024);
        let index = Arc::new(RwLock::new(index));
        let denials = Arc::new(Mutex::new(denials));
        let write_failures = Arc::new(AtomicUsize::new(0));

        let writer_handle = spawn_writer(file, rx, index.clone(), denials.clone(), write_failures.clone());

        Ok((
            Self {
                tx,
                index,
                denials,
                malformed_lines: Arc::new(AtomicUsize::new(malformed)),
                write_failures,
            },
            writer_handle,
        ))
    }

    /// Enqueues an event for the writer task. Blocks (backpressure) if the
    /// writer's queue is full (§5).
    pub async fn append(&self, record: ManifestRecord) {
        if self.tx.send(record).await.is_err() {
            tracing::error!("manifest writer task has shut down; dropping event");
        }
    }

    pub fn malformed_line_count(&self) -> usize {
        self.malformed_lines.load(Ordering::Relaxed)
    }

    pub fn write_failure_count(&self) -> usize {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn completed_validator(&self, prefecture: &str, city: &str, seed_url: &str) -> Option<Validator> {
        let key = (prefecture.to_string(), city.to_string(), seed_url.to_string());
        self.index.read().completed_seeds.get(&key).cloned()
    }

    pub fn is_downloaded(&self, url: &str) -> bool {
        self.index.read().downloaded_urls.contains(url)
    }

    /// Atomically checks and claims `url` for download: returns `true` the
    /// first time it is claimed, `false` if another worker already has it.
    /// Prevents two concurrent seeds from downloading the same URL twice.
    pub fn try_claim_download(&self, url: &str) -> bool {
        self.index.write().downloaded_urls.insert(url.to_string())
    }

    pub fn denials_snapshot(&self) -> Vec<DenialRecord> {
        self.denials.lock().clone()
    }

    /// Drops the sender so the writer task observes channel closure, then
    /// waits for it to drain and exit (best-effort flush on shutdown, §5).
    pub async fn close(self, handle: JoinHandle<()>) {
        drop(self.tx);
        let _ = handle.await;
    }
}

fn apply_to_index(index: &mut ManifestIndex, denials: &mut Vec<DenialRecord>, record: &ManifestRecord) {
    let key = (
        record.prefecture.clone(),
        record.city.clone(),
        record.seed_url.clone(),
    );
    match &record.event {
        ManifestEvent::SeedDone { index_validator, .. } => {
            index.completed_seeds.insert(key, index_validator.clone());
        }
        ManifestEvent::DownloadedFile { url, .. } => {
            index.downloaded_urls.insert(url.clone());
        }
        ManifestEvent::PageSaved { url, path, .. } => {
            index.saved_pages.insert(url.clone(), path.clone());
        }
        ManifestEvent::RobotsDenied { url, host, path_prefix } => {
            denials.push(DenialRecord {
                prefecture: record.prefecture.clone(),
                city: record.city.clone(),
                host: host.clone(),
                path_prefix: path_prefix.clone(),
                url: url.clone(),
            });
        }
        _ => {}
    }
}

fn spawn_writer(
    mut file: std::fs::File,
    mut rx: mpsc::Receiver<ManifestRecord>,
    index: Arc<RwLock<ManifestIndex>>,
    denials: Arc<Mutex<Vec<DenialRecord>>>,
    write_failures: Arc<AtomicUsize>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(record) = rx.blocking_recv() {
            {
                let mut idx = index.write();
                let mut den = denials.lock();
                apply_to_index(&mut idx, &mut den, &record);
            }
            match serde_json::to_string(&record) {
                Ok(line) => {
                    if let Err(err) = writeln!(file, "{line}").and_then(|_| file.sync_data()) {
                        tracing::error!(error = %err, "failed to write manifest event");
                        write_failures.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to serialize manifest event");
                    write_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    })
}
