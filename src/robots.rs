//! Per-host robots.txt cache (§4.2). First reference to a host performs a
//! single-flight fetch; concurrent lookups for the same host await the same
//! in-flight fetch via `tokio::sync::OnceCell`.

use crate::http_client::HttpClient;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use url::Url;

#[derive(Debug, Clone, Default)]
struct RobotsRecord {
    allow_rules: Vec<String>,
    disallow_rules: Vec<String>,
    crawl_delay: Option<u64>,
}

pub struct RobotsCache {
    client: HttpClient,
    user_agent: String,
    enabled: bool,
    entries: RwLock<HashMap<String, Arc<OnceCell<Arc<RobotsRecord>>>>>,
    seen_denials: Mutex<HashSet<(String, String, String)>>,
}

impl RobotsCache {
    pub fn new(client: HttpClient, user_agent: String, enabled: bool) -> Self {
        Self {
            client,
            user_agent,
            enabled,
            entries: RwLock::new(HashMap::new()),
            seen_denials: Mutex::new(HashSet::new()),
        }
    }

    /// `allowed(url) -> bool` (§4.2). Always true when robots enforcement is disabled.
    pub async fn allowed(&self, url: &Url) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(host) = url.host_str() else {
            return true;
        };
        let record = self.record_for(url.scheme(), host).await;
        let allowed = path_allowed(url.path(), &record, &self.user_agent);
        tracing::debug!(host, path = url.path(), allowed, phase = "robots_check", "checked robots rules");
        allowed
    }

    /// `crawl_delay() -> seconds?` for the matched UA group (§4.2). Returns
    /// `None` when the host hasn't been fetched yet or robots is disabled.
    pub async fn crawl_delay(&self, url: &Url) -> Option<u64> {
        if !self.enabled {
            return None;
        }
        let host = url.host_str()?;
        let entry = self.entries.read().await.get(host).cloned()?;
        entry.get().and_then(|r| r.crawl_delay)
    }

    /// Records a denial exactly once per `(host, path_prefix, url)` triple.
    /// Returns `true` the first time this triple is seen, `false` on repeats.
    pub fn record_denial_once(&self, host: &str, path_prefix: &str, url: &str) -> bool {
        let key = (host.to_string(), path_prefix.to_string(), url.to_string());
        self.seen_denials.lock().insert(key)
    }

    async fn record_for(&self, scheme: &str, host: &str) -> Arc<RobotsRecord> {
        let cell = {
            let mut entries = self.entries.write().await;
            entries
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };
        cell.get_or_init(|| async { Arc::new(self.fetch(scheme, host).await) })
            .await
            .clone()
    }

    async fn fetch(&self, scheme: &str, host: &str) -> RobotsRecord {
        let robots_url = format!("{scheme}://{host}/robots.txt");
        tracing::debug!(host, phase = "robots_fetch", "fetching robots.txt");
        match self.client.get(&robots_url).await {
            Ok(fetched) => {
                let text = String::from_utf8_lossy(&fetched.body);
                parse_robots(&text, &self.user_agent)
            }
            // Network error or non-2xx (incl. 404, 5xx): treat host as fully
            // permissive (§4.2).
            Err(e) => {
                tracing::info!(host, phase = "robots_fetch", error = %e, "robots.txt fetch failed, treating host as permissive");
                RobotsRecord::default()
            }
        }
    }
}

/// Parses `robots.txt`, keeping only directives for the group matching
/// `user_agent`, falling back to `*` when no specific group exists.
fn parse_robots(text: &str, user_agent: &str) -> RobotsRecord {
    let mut groups: Vec<(Vec<String>, Vec<String>, Vec<String>, Option<u64>)> = Vec::new();
    // Each parsed group: (user_agents, allows, disallows, crawl_delay).
    let mut current: Option<(Vec<String>, Vec<String>, Vec<String>, Option<u64>)> = None;
    let mut in_ua_block = false;

    for raw_line in text.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        match key.as_str() {
            "user-agent" => {
                if in_ua_block {
                    if let Some((uas, _, _, _)) = current.as_mut() {
                        uas.push(value.to_ascii_lowercase());
                    }
                } else {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some((vec![value.to_ascii_lowercase()], Vec::new(), Vec::new(), None));
                    in_ua_block = true;
                }
            }
            "allow" => {
                in_ua_block = false;
                if let Some((_, allows, _, _)) = current.as_mut() {
                    if !value.is_empty() {
                        allows.push(value);
                    }
                }
            }
            "disallow" => {
                in_ua_block = false;
                if let Some((_, _, disallows, _)) = current.as_mut() {
                    disallows.push(value);
                }
            }
            "crawl-delay" => {
                in_ua_block = false;
                if let Some((_, _, _, delay)) = current.as_mut() {
                    *delay = value.parse::<f64>().ok().map(|s| s.ceil() as u64);
                }
            }
            _ => {
                in_ua_block = false;
            }
        }
    }
    if let Some(group) = current.take() {
        groups.push(group);
    }

    let ua_lower = user_agent.to_ascii_lowercase();
    let specific = groups
        .iter()
        .find(|(uas, ..)| uas.iter().any(|ua| ua_lower.contains(ua.as_str()) || ua.as_str() == ua_lower));
    let wildcard = groups.iter().find(|(uas, ..)| uas.iter().any(|ua| ua == "*"));
    let chosen = specific.or(wildcard);

    match chosen {
        Some((_, allows, disallows, delay)) => RobotsRecord {
            allow_rules: allows.clone(),
            disallow_rules: disallows.clone(),
            crawl_delay: *delay,
        },
        None => RobotsRecord::default(),
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Standard longest-match precedence: the most specific matching directive
/// wins; `Allow` overrides `Disallow` only when at least as specific (§4.2).
fn path_allowed(path: &str, record: &RobotsRecord, _user_agent: &str) -> bool {
    let best_allow = record
        .allow_rules
        .iter()
        .filter(|rule| path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max();
    let best_disallow = record
        .disallow_rules
        .iter()
        .filter(|rule| !rule.is_empty() && path.starts_with(rule.as_str()))
        .map(|rule| rule.len())
        .max();

    match (best_allow, best_disallow) {
        (Some(a), Some(d)) => a >= d,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

/// First non-empty path segment, defaulting to `/` (§4.2).
pub fn path_prefix(path: &str) -> String {
    match path.trim_start_matches('/').split('/').next() {
        Some(seg) if !seg.is_empty() => format!("/{seg}"),
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disallow_blocks_matching_prefix() {
        let record = parse_robots("User-agent: *\nDisallow: /private/\n", "crawler-bot");
        assert!(!path_allowed("/private/minutes.pdf", &record, "crawler-bot"));
        assert!(path_allowed("/public/minutes.pdf", &record, "crawler-bot"));
    }

    #[test]
    fn allow_overrides_disallow_when_more_specific() {
        let record = parse_robots(
            "User-agent: *\nDisallow: /private/\nAllow: /private/public/\n",
            "crawler-bot",
        );
        assert!(path_allowed("/private/public/doc.pdf", &record, "crawler-bot"));
        assert!(!path_allowed("/private/secret.pdf", &record, "crawler-bot"));
    }

    #[test]
    fn crawl_delay_is_parsed() {
        let record = parse_robots("User-agent: *\nCrawl-delay: 2\n", "crawler-bot");
        assert_eq!(record.crawl_delay, Some(2));
    }

    #[test]
    fn path_prefix_defaults_to_root() {
        assert_eq!(path_prefix("/"), "/");
        assert_eq!(path_prefix(""), "/");
        assert_eq!(path_prefix("/private/minutes.pdf"), "/private");
    }
}
