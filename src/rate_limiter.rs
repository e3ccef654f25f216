//! Per-host rate limiting (§4.3). Two requests to the same host never issue
//! closer than the effective delay; different hosts proceed independently.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::sleep;

pub struct RateLimiter {
    global_min_delay: Duration,
    last_request_at: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(global_min_delay: Duration) -> Self {
        Self {
            global_min_delay,
            last_request_at: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until a request to `host` may proceed, then reserves the slot.
    /// `robots_delay` is the host's `Crawl-delay`, if known.
    pub async fn wait(&self, host: &str, robots_delay: Option<Duration>) {
        let effective = self.global_min_delay.max(robots_delay.unwrap_or_default());
        loop {
            let wait_for = {
                let mut last = self.last_request_at.lock();
                let now = Instant::now();
                match last.get(host) {
                    Some(&prev) => {
                        let earliest = prev + effective;
                        if now >= earliest {
                            last.insert(host.to_string(), now);
                            None
                        } else {
                            Some(earliest - now)
                        }
                    }
                    None => {
                        last.insert(host.to_string(), now);
                        None
                    }
                }
            };
            match wait_for {
                None => {
                    tracing::debug!(host, phase = "rate_limit", "slot reserved, no wait needed");
                    return;
                }
                Some(d) => {
                    tracing::debug!(host, phase = "rate_limit", wait_ms = d.as_millis() as u64, "waiting for rate limit slot");
                    sleep(d).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_minimum_gap_per_host() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.wait("a.example", None).await;
        limiter.wait("a.example", None).await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn different_hosts_do_not_block_each_other() {
        let limiter = RateLimiter::new(Duration::from_millis(200));
        limiter.wait("a.example", None).await;
        let start = Instant::now();
        limiter.wait("b.example", None).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn robots_crawl_delay_can_exceed_global_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(10));
        let start = Instant::now();
        limiter.wait("a.example", Some(Duration::from_millis(60))).await;
        limiter.wait("a.example", Some(Duration::from_millis(60))).await;
        assert!(start.elapsed() >= Duration::from_millis(60));
    }
}
