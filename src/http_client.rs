use crate::error::CrawlError;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;

/// A fetched page or file: status, the final URL after redirects, and the raw body.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

/// Validators used for conditional GET / seed-change detection (§3, §4.5).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Validator {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub content_sha256: Option<String>,
}

impl Validator {
    pub fn is_change_checked(&self) -> bool {
        self.etag.is_some() || self.last_modified.is_some() || self.content_sha256.is_some()
    }
}

pub enum ConditionalResult {
    Unchanged,
    Changed(Fetched),
}

/// Single process-wide HTTP client (§4.1). Connect+read timeout, fixed UA,
/// bounded redirects, no cookie jar.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(false)
            .build()?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Plain GET. Succeeds for {200, 206, 304}; anything else is `HttpStatus`.
    pub async fn get(&self, url: &str) -> Result<Fetched, CrawlError> {
        let resp = self.send(url, None).await?;
        self.finish(url, resp).await
    }

    /// Conditional GET using `If-None-Match` / `If-Modified-Since` (§4.1, §4.5).
    pub async fn conditional_get(
        &self,
        url: &str,
        validator: &Validator,
    ) -> Result<ConditionalResult, CrawlError> {
        let resp = self.send(url, Some(validator)).await?;
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(ConditionalResult::Unchanged);
        }
        let fetched = self.finish(url, resp).await?;
        Ok(ConditionalResult::Changed(fetched))
    }

    async fn send(
        &self,
        url: &str,
        validator: Option<&Validator>,
    ) -> Result<reqwest::Response, CrawlError> {
        let mut req = self.client.get(url);
        if let Some(v) = validator {
            if let Some(etag) = &v.etag {
                req = req.header(header::IF_NONE_MATCH, etag);
            }
            if let Some(lm) = &v.last_modified {
                req = req.header(header::IF_MODIFIED_SINCE, lm);
            }
        }
        req.send().await.map_err(|source| {
            if source.is_timeout() {
                CrawlError::Timeout {
                    url: url.to_string(),
                }
            } else if source.is_redirect() {
                CrawlError::TooManyRedirects {
                    url: url.to_string(),
                }
            } else {
                CrawlError::Network {
                    url: url.to_string(),
                    source,
                }
            }
        })
    }

    async fn finish(&self, url: &str, resp: reqwest::Response) -> Result<Fetched, CrawlError> {
        let status = resp.status();
        if !matches!(
            status,
            StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::NOT_MODIFIED
        ) {
            return Err(CrawlError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let last_modified = resp
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = resp
            .bytes()
            .await
            .map_err(|source| CrawlError::Network {
                url: url.to_string(),
                source,
            })?
            .to_vec();
        Ok(Fetched {
            status,
            final_url,
            content_type,
            etag,
            last_modified,
            body,
        })
    }
}

/// True when the response should be treated as an HTML page rather than a
/// binary payload, per §4.1: Content-Type prefix `application/` or `image/`,
/// or extension match on the final URL, rules out HTML.
pub fn is_html(content_type: Option<&str>, final_url: &str) -> bool {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        if ct.starts_with("application/") || ct.starts_with("image/") {
            return false;
        }
        if ct.starts_with("text/html") || ct.starts_with("application/xhtml") {
            return true;
        }
    }
    let path = final_url.split(['?', '#']).next().unwrap_or(final_url);
    matches!(
        path.rsplit('.').next(),
        Some("html") | Some("htm") | None
    ) && !crate::classifier::is_minute_file(final_url)
}
