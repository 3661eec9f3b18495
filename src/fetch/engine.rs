//! The rate-limited, retrying fetch primitive shared by all adapters

use crate::fetch::classify::{classify_status, classify_transport, detect_block};
use crate::fetch::gate::HostGate;
use crate::fetch::{Body, FetchOptions};
use crate::robots::{fetch_robots, ParsedRobots, RobotsCache};
use crate::url::{host_key, resolve_link};
use crate::FetchError;
use reqwest::{header, redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

/// Builds the HTTP client used by the engine
///
/// Redirects are followed by hand so each hop passes through the host gate.
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP fetch engine
///
/// Holds the shared client, the per-host gate and the robots cache. One
/// engine serves every source in every cycle.
#[derive(Debug)]
pub struct FetchEngine {
    client: Client,
    gate: HostGate,
    robots: Mutex<RobotsCache>,
}

impl FetchEngine {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(user_agent)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            gate: HostGate::new(),
            robots: Mutex::new(RobotsCache::new()),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Requests sent to a host so far, including retries and redirect hops
    pub async fn request_count(&self, url: &Url) -> u64 {
        match host_key(url) {
            Some(host) => self.gate.request_count(&host).await,
            None => 0,
        }
    }

    /// Fetches a page, retrying transient failures
    ///
    /// 4xx responses, anti-bot pages, robots denials and redirect failures
    /// are returned at once. Timeouts, network errors and 5xx responses are
    /// retried up to `options.retry.max_retries` times with growing delays.
    /// Once `options.cancel` fires, an in-flight request gets
    /// `options.stop_grace` to finish before `Cancelled` is returned.
    pub async fn fetch(&self, url: &Url, options: &FetchOptions) -> Result<Body, FetchError> {
        if options.cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }

        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                result = self.fetch_once(url, options) => result,
                _ = async {
                    options.cancel.cancelled().await;
                    tokio::time::sleep(options.stop_grace).await;
                } => Err(FetchError::Cancelled { url: url.to_string() }),
            };

            match result {
                Err(e) if e.is_transient() && attempt < options.retry.max_retries => {
                    let delay = options.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Transient fetch failure, retrying: {}",
                        e
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = options.cancel.cancelled() => {
                            return Err(FetchError::Cancelled { url: url.to_string() });
                        }
                    }
                }
                other => return other,
            }
        }
    }

    /// One attempt, following redirects
    async fn fetch_once(&self, url: &Url, options: &FetchOptions) -> Result<Body, FetchError> {
        let mut current = url.clone();
        let mut visited = HashSet::new();
        visited.insert(current.to_string());

        for hop in 0..=options.max_redirects {
            let host = host_key(&current).ok_or_else(|| FetchError::NetworkError {
                url: current.to_string(),
                message: "URL has no host".to_string(),
            })?;

            if options.respect_robots {
                let robots = self.robots_for(&host, &current, options).await;
                if !robots.is_allowed(current.as_str(), &options.user_agent) {
                    debug!(url = %current, "Skipping URL disallowed by robots.txt");
                    return Err(FetchError::Disallowed {
                        url: current.to_string(),
                    });
                }
            }

            let response = {
                let _slot = self.gate.acquire(&host, options.min_host_delay).await;
                debug!(url = %current, hop, "GET");
                self.client
                    .get(current.clone())
                    .header(header::USER_AGENT, options.user_agent.as_str())
                    .timeout(options.timeout)
                    .send()
                    .await
                    .map_err(|e| classify_transport(current.as_str(), &e))?
            };

            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| resolve_link(&current, loc))
                    .ok_or_else(|| FetchError::NetworkError {
                        url: current.to_string(),
                        message: format!("HTTP {} without a usable Location", status.as_u16()),
                    })?;

                if !visited.insert(location.to_string()) {
                    return Err(FetchError::RedirectLoop {
                        url: location.to_string(),
                    });
                }
                if hop == options.max_redirects {
                    break;
                }
                current = location;
                continue;
            }

            if !status.is_success() {
                return Err(classify_status(current.as_str(), status));
            }

            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let text = response
                .text()
                .await
                .map_err(|e| classify_transport(current.as_str(), &e))?;

            if let Some(signature) = detect_block(&text) {
                return Err(FetchError::Blocked {
                    url: current.to_string(),
                    signature: signature.to_string(),
                });
            }

            return Ok(Body {
                url: current,
                status: status.as_u16(),
                content_type,
                text,
            });
        }

        Err(FetchError::RedirectLimit {
            url: url.to_string(),
        })
    }

    /// Returns the cached robots.txt for a host, fetching it when missing or stale
    async fn robots_for(&self, host: &str, url: &Url, options: &FetchOptions) -> ParsedRobots {
        if let Some(robots) = self.robots.lock().await.get(host) {
            return robots.clone();
        }

        let robots = fetch_robots(&self.client, url, &options.user_agent, options.timeout).await;
        self.gate
            .set_robots_delay(host, robots.crawl_delay(&options.user_agent))
            .await;
        self.robots.lock().await.insert(host, robots.clone());
        robots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> FetchOptions {
        FetchOptions {
            min_host_delay: Duration::from_millis(1),
            retry: RetryPolicy::new(2, Duration::from_millis(20)),
            ..FetchOptions::new("TestBot/1.0")
        }
    }

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_owned(), "text/html; charset=utf-8")
    }

    async fn server_without_robots() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(html("<html><body>ok</body></html>"))
            .expect(1)
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/page", server.uri())).unwrap();
        let body = engine.fetch(&url, &options()).await.unwrap();

        assert_eq!(body.status, 200);
        assert!(body.text.contains("ok"));
        assert!(body.content_type.unwrap().starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_rejected_not_retried() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/gone", server.uri())).unwrap();
        let err = engine.fetch(&url, &options()).await.unwrap_err();

        assert!(matches!(err, FetchError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_retried_then_surfaced() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/flaky", server.uri())).unwrap();
        let err = engine.fetch(&url, &options()).await.unwrap_err();

        assert!(matches!(err, FetchError::Unavailable { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_blocked_page() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/captcha"))
            .respond_with(html(r#"<div class="g-recaptcha"></div>"#))
            .expect(1)
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/captcha", server.uri())).unwrap();
        let err = engine.fetch(&url, &options()).await.unwrap_err();

        assert!(matches!(err, FetchError::Blocked { .. }));
    }

    #[tokio::test]
    async fn test_robots_disallowed_never_requested() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/private/doc"))
            .respond_with(html("secret"))
            .expect(0)
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/private/doc", server.uri())).unwrap();
        let err = engine.fetch(&url, &options()).await.unwrap_err();

        assert!(matches!(err, FetchError::Disallowed { .. }));
    }

    #[tokio::test]
    async fn test_redirect_followed() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(html("moved here"))
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/old", server.uri())).unwrap();
        let body = engine.fetch(&url, &options()).await.unwrap();

        assert_eq!(body.url.path(), "/new");
        assert_eq!(body.text, "moved here");
    }

    #[tokio::test]
    async fn test_redirect_loop_detected() {
        let server = server_without_robots().await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
            .mount(&server)
            .await;

        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let url = Url::parse(&format!("{}/a", server.uri())).unwrap();
        let err = engine.fetch(&url, &options()).await.unwrap_err();

        assert!(matches!(err, FetchError::RedirectLoop { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let engine = FetchEngine::new("TestBot/1.0").unwrap();
        let opts = options();
        opts.cancel.cancel();

        let url = Url::parse("http://127.0.0.1:9/never").unwrap();
        let err = engine.fetch(&url, &opts).await.unwrap_err();
        assert!(matches!(err, FetchError::Cancelled { .. }));
    }
}
