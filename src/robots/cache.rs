//! Per-host robots.txt cache with a 24 hour lifetime

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
        }
    }

    /// Checks if the cached robots.txt is older than 24 hours
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Host-keyed robots cache shared by the fetch engine
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: HashMap<String, CachedRobots>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh entry for the host, if any
    pub fn get(&self, host: &str) -> Option<&ParsedRobots> {
        self.entries
            .get(host)
            .filter(|cached| !cached.is_stale())
            .map(|cached| &cached.content)
    }

    pub fn insert(&mut self, host: impl Into<String>, robots: ParsedRobots) {
        self.entries.insert(host.into(), CachedRobots::new(robots));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
