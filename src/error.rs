use thiserror::Error;

/// Top-level error taxonomy (§7). Only `Config` and `ManifestWrite` are fatal;
/// everything else is recorded as a manifest `error` event and swallowed by the caller.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout fetching {url}")]
    Timeout { url: String },

    #[error("too many redirects fetching {url}")]
    TooManyRedirects { url: String },

    #[error("unexpected status {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("failed to parse content at {url}: {message}")]
    Parse { url: String, message: String },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest write failed: {0}")]
    ManifestWrite(String),
}

impl CrawlError {
    /// Maps a fatal error to the process exit code from §6. Non-fatal kinds
    /// are never passed here; they are recorded as manifest events instead.
    pub fn exit_code(&self) -> i32 {
        match self {
            CrawlError::Config(_) => 1,
            CrawlError::ManifestWrite(_) => 2,
            _ => 0,
        }
    }

    pub fn phase(&self) -> &'static str {
        match self {
            CrawlError::Config(_) => "config",
            CrawlError::Network { .. } => "fetch",
            CrawlError::Timeout { .. } => "fetch",
            CrawlError::TooManyRedirects { .. } => "fetch",
            CrawlError::HttpStatus { .. } => "fetch",
            CrawlError::Parse { .. } => "parse",
            CrawlError::Filesystem { .. } => "filesystem",
            CrawlError::ManifestWrite(_) => "manifest",
        }
    }
}
