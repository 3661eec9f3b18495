//! Robots.txt handling module
//!
//! Fetches, parses and caches robots.txt per host. A missing or unreachable
//! robots.txt never blocks a harvest.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Fetches robots.txt for the origin of `url`
///
/// Any status other than 200, and any transport failure, yields
/// [`ParsedRobots::allow_all`].
pub async fn fetch_robots(
    client: &Client,
    url: &Url,
    user_agent: &str,
    timeout: Duration,
) -> ParsedRobots {
    let Some(robots_url) = crate::url::robots_url(url) else {
        return ParsedRobots::allow_all();
    };

    let response = client
        .get(robots_url.clone())
        .header(header::USER_AGENT, user_agent)
        .timeout(timeout)
        .send()
        .await;

    match response {
        Ok(resp) if resp.status() == StatusCode::OK => match resp.text().await {
            Ok(body) => {
                tracing::debug!("Loaded robots.txt from {}", robots_url);
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                tracing::debug!("Unreadable robots.txt at {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(resp) => {
            tracing::debug!("No robots.txt at {} (HTTP {})", robots_url, resp.status());
            ParsedRobots::allow_all()
        }
        Err(e) => {
            tracing::debug!("Failed to fetch robots.txt at {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
