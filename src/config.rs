//! CLI surface (§6) and the layered `Config` every collaborator shares.
//!
//! Precedence, lowest to highest (§3, §4.10): built-in constant, then
//! `CRAWLER_*` environment variable, then the matching CLI flag.

use crate::classifier::ClassifierConfig;
use crate::error::CrawlError;
use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_INPUT: &str = "data/minute_link_list.json";
const DEFAULT_OUTDIR: &str = "data/minutes_out";
const DEFAULT_THRESHOLD: u64 = 5;
const DEFAULT_MAX_DEPTH: usize = 2;
const DEFAULT_MAX_PAGES: usize = 200;
const DEFAULT_WORKERS: usize = 8;
const DEFAULT_DELAY: f64 = 0.5;
const DEFAULT_TIMEOUT: u64 = 20;
const DEFAULT_USER_AGENT: &str = "minutes-crawler/0.1 (+https://example.com/bot)";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser, Debug)]
#[command(name = "minutes-crawler")]
#[command(about = "Polite, resumable crawler for municipal meeting-minutes documents")]
pub struct Cli {
    #[arg(long)]
    pub input: Option<String>,
    #[arg(long)]
    pub outdir: Option<String>,
    #[arg(long)]
    pub manifest: Option<String>,
    #[arg(long)]
    pub report_dir: Option<String>,

    #[arg(long)]
    pub threshold: Option<u64>,
    #[arg(long)]
    pub max_depth: Option<usize>,
    #[arg(long)]
    pub max_pages: Option<usize>,
    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub delay: Option<f64>,
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub user_agent: Option<String>,

    #[arg(long)]
    pub no_download: bool,
    #[arg(long)]
    pub no_download_files: bool,
    #[arg(long)]
    pub force_download: bool,

    /// Resume from the existing manifest (default). Mutually exclusive with --no-resume.
    #[arg(long, overrides_with = "no_resume")]
    pub resume: bool,
    #[arg(long, overrides_with = "resume")]
    pub no_resume: bool,
    #[arg(long)]
    pub overwrite_manifest: bool,

    /// Skip seeds already marked `seed_done` (default). Mutually exclusive with --no-skip-completed-seeds.
    #[arg(long, overrides_with = "no_skip_completed_seeds")]
    pub skip_completed_seeds: bool,
    #[arg(long, overrides_with = "skip_completed_seeds")]
    pub no_skip_completed_seeds: bool,
    #[arg(long)]
    pub force_crawl: bool,

    /// Conditional-GET completed seeds before skipping (default). Mutually exclusive with --no-recheck-seeds.
    #[arg(long, overrides_with = "no_recheck_seeds")]
    pub recheck_seeds: bool,
    #[arg(long, overrides_with = "recheck_seeds")]
    pub no_recheck_seeds: bool,

    /// Honor robots.txt (default). Mutually exclusive with --no-respect-robots.
    #[arg(long, overrides_with = "no_respect_robots")]
    pub respect_robots: bool,
    #[arg(long, overrides_with = "respect_robots")]
    pub no_respect_robots: bool,

    /// Restrict the frontier to the seed's host (default). Mutually exclusive with --no-same-domain-only.
    #[arg(long, overrides_with = "no_same_domain_only")]
    pub same_domain_only: bool,
    #[arg(long, overrides_with = "same_domain_only")]
    pub no_same_domain_only: bool,
    #[arg(long)]
    pub same_path_prefix_only: bool,

    #[arg(long)]
    pub keywords: Option<String>,
    #[arg(long)]
    pub file_exts: Option<String>,
    #[arg(long)]
    pub url_hints: Option<String>,

    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Resolves one knob: CLI value if given, else `CRAWLER_<var>` if set and
/// parseable, else `default`.
fn layered<T: FromStr>(cli_value: Option<T>, var: &str, default: T) -> T {
    cli_value.unwrap_or_else(|| {
        std::env::var(var)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default)
    })
}

/// Same as [`layered`] for `String`-shaped values, which can't fail to parse.
fn layered_string(cli_value: Option<String>, var: &str, default: &str) -> String {
    cli_value.unwrap_or_else(|| std::env::var(var).unwrap_or_else(|_| default.to_string()))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub outdir: PathBuf,
    pub manifest_path: PathBuf,
    pub report_dir: PathBuf,

    pub threshold: u64,
    pub max_depth: usize,
    pub max_pages: usize,
    pub workers: usize,

    pub global_min_delay: Duration,
    pub timeout: Duration,
    pub user_agent: String,

    pub no_download: bool,
    pub no_download_files: bool,
    pub force_download: bool,

    pub resume: bool,
    pub overwrite_manifest: bool,

    pub skip_completed_seeds: bool,
    pub force_crawl: bool,
    pub recheck_seeds: bool,

    pub respect_robots: bool,

    pub same_domain_only: bool,
    pub same_path_prefix_only: bool,

    pub classifier: ClassifierConfig,

    pub log_filter: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self, CrawlError> {
        let input = layered_string(cli.input.clone(), "CRAWLER_INPUT", DEFAULT_INPUT);
        let outdir_raw = layered_string(cli.outdir.clone(), "CRAWLER_OUTDIR", DEFAULT_OUTDIR);
        let threshold = layered(cli.threshold, "CRAWLER_THRESHOLD", DEFAULT_THRESHOLD);
        let max_depth = layered(cli.max_depth, "CRAWLER_MAX_DEPTH", DEFAULT_MAX_DEPTH);
        let max_pages = layered(cli.max_pages, "CRAWLER_MAX_PAGES", DEFAULT_MAX_PAGES);
        let workers = layered(cli.workers, "CRAWLER_WORKERS", DEFAULT_WORKERS);
        let delay = layered(cli.delay, "CRAWLER_DELAY", DEFAULT_DELAY);
        let timeout = layered(cli.timeout, "CRAWLER_TIMEOUT", DEFAULT_TIMEOUT);
        let user_agent = layered_string(cli.user_agent.clone(), "CRAWLER_USER_AGENT", DEFAULT_USER_AGENT);
        let log_filter = layered_string(cli.log_filter.clone(), "CRAWLER_LOG_FILTER", DEFAULT_LOG_FILTER);

        if threshold == 0 {
            return Err(CrawlError::Config("--threshold must be >= 1".into()));
        }
        if workers == 0 {
            return Err(CrawlError::Config("--workers must be >= 1".into()));
        }
        if max_pages == 0 {
            return Err(CrawlError::Config("--max-pages must be >= 1".into()));
        }

        let outdir = PathBuf::from(&outdir_raw);
        let manifest_path = cli
            .manifest
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| outdir.join("manifest.jsonl"));
        let report_dir = cli
            .report_dir
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| outdir.join("reports"));

        // Each pair defaults to the first flag's sense unless its negation was
        // explicitly passed; `overrides_with` above guarantees they can't both be true.
        let resume = !cli.no_resume;
        let skip_completed_seeds = !cli.no_skip_completed_seeds;
        let recheck_seeds = !cli.no_recheck_seeds;
        let respect_robots = !cli.no_respect_robots;
        let same_domain_only = !cli.no_same_domain_only;

        if cli.force_crawl && cli.no_recheck_seeds {
            tracing::debug!("--force-crawl and --no-recheck-seeds both set; force-crawl wins");
        }

        let mut classifier = ClassifierConfig::default();
        if let Some(list) = &cli.keywords {
            classifier.keywords = split_csv(list);
        }
        if let Some(list) = &cli.file_exts {
            classifier.file_exts = split_csv(list)
                .into_iter()
                .map(|s| s.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        if let Some(list) = &cli.url_hints {
            classifier.url_hints = split_csv(list);
        }

        Ok(Self {
            input: PathBuf::from(&input),
            outdir,
            manifest_path,
            report_dir,
            threshold,
            max_depth,
            max_pages,
            workers,
            global_min_delay: Duration::from_secs_f64(delay.max(0.0)),
            timeout: Duration::from_secs(timeout),
            user_agent,
            no_download: cli.no_download,
            no_download_files: cli.no_download_files,
            force_download: cli.force_download,
            resume,
            overwrite_manifest: cli.overwrite_manifest,
            skip_completed_seeds,
            force_crawl: cli.force_crawl,
            recheck_seeds,
            respect_robots,
            same_domain_only,
            same_path_prefix_only: cli.same_path_prefix_only,
            classifier,
            log_filter,
        })
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli::parse_from(["minutes-crawler"])
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut cli = base_cli();
        cli.threshold = Some(0);
        assert!(Config::from_cli(cli).is_err());
    }

    #[test]
    fn uses_built_in_default_when_no_env_or_cli_value() {
        let cli = base_cli();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn cli_value_wins_over_default() {
        let mut cli = base_cli();
        cli.workers = Some(3);
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.workers, 3);
    }

    #[test]
    fn defaults_manifest_and_report_dir_under_outdir() {
        let cli = base_cli();
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.manifest_path, config.outdir.join("manifest.jsonl"));
        assert_eq!(config.report_dir, config.outdir.join("reports"));
    }

    #[test]
    fn no_resume_flag_overrides_default_resume() {
        let mut cli = base_cli();
        cli.no_resume = true;
        cli.resume = false;
        let config = Config::from_cli(cli).unwrap();
        assert!(!config.resume);
    }

    #[test]
    fn keyword_override_replaces_defaults() {
        let mut cli = base_cli();
        cli.keywords = Some("foo,bar".into());
        let config = Config::from_cli(cli).unwrap();
        assert_eq!(config.classifier.keywords, vec!["foo".to_string(), "bar".to_string()]);
    }
}
