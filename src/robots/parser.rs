//! Robots.txt parser implementation
//!
//! Matching is delegated to the robotstxt crate; `Crawl-delay` is read by hand
//! since that crate ignores it.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt data
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content
    content: String,
    /// Set when robots.txt was missing or could not be fetched
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// `url` may be absolute or a bare path.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, product_token(user_agent), url)
    }

    /// Gets the crawl delay that applies to the given user agent
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        if self.allow_all {
            return None;
        }

        let agent = product_token(user_agent).to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut for_agent: Option<f64> = None;
        let mut for_wildcard: Option<f64> = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !group_open {
                        group.clear();
                        group_open = true;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_open = false;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if delay < 0.0 || !delay.is_finite() {
                        continue;
                    }
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        for_agent = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        for_wildcard = Some(delay);
                    }
                }
                _ => group_open = false,
            }
        }

        for_agent.or(for_wildcard).map(Duration::from_secs_f64)
    }
}

/// Strips the version and comment from a User-Agent header value
///
/// `JurisHarvest/1.0 (+https://...)` matches robots groups named `JurisHarvest`.
fn product_token(user_agent: &str) -> &str {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .next()
        .unwrap_or(user_agent)
}
