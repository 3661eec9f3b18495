//! Fetch engine module
//!
//! This module provides the HTTP primitive every source adapter goes through:
//! - robots.txt compliance, with `Crawl-delay` raising the host delay
//! - a per-host gate so concurrent workers never exceed a host's rate
//! - manual redirect handling with loop detection
//! - retries with exponential backoff and jitter for transient failures
//! - typed errors for timeouts, rejections, network faults and anti-bot pages

mod classify;
mod engine;
mod gate;
mod retry;

pub use classify::{classify_status, detect_block};
pub use engine::{build_http_client, FetchEngine};
pub use gate::HostGate;
pub use retry::{backoff_delay, RetryPolicy};

use crate::config::{Config, SourceConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct Body {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub text: String,
}

/// Per-request options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_redirects: u32,
    pub user_agent: String,
    /// Minimum gap between two requests to the same host
    pub min_host_delay: Duration,
    pub respect_robots: bool,
    pub retry: RetryPolicy,
    /// How long an in-flight request may run after cancellation
    pub stop_grace: Duration,
    pub cancel: CancellationToken,
}

impl FetchOptions {
    /// Options with the built-in defaults
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_redirects: 10,
            user_agent: user_agent.into(),
            min_host_delay: Duration::from_secs(1),
            respect_robots: true,
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            stop_grace: Duration::from_secs(30),
            cancel: CancellationToken::new(),
        }
    }

    /// Options for one source, with its overrides applied over `[fetch]`
    pub fn for_source(config: &Config, source: &SourceConfig, cancel: CancellationToken) -> Self {
        let fetch = &config.fetch;
        Self {
            timeout: Duration::from_secs(fetch.timeout_secs),
            max_redirects: fetch.max_redirects,
            user_agent: config.user_agent.header_value(),
            min_host_delay: source.effective_min_delay(fetch),
            respect_robots: fetch.respect_robots,
            retry: RetryPolicy::new(
                source.effective_max_retries(fetch),
                source.effective_retry_delay(fetch),
            ),
            stop_grace: Duration::from_secs(fetch.stop_grace_secs),
            cancel,
        }
    }
}
