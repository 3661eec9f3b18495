//! Error classification for HTTP responses

use crate::FetchError;
use reqwest::StatusCode;

/// Markers that anti-bot interstitials put in place of real content
const BLOCK_SIGNATURES: &[&str] = &[
    "g-recaptcha",
    "hcaptcha",
    "cf-challenge",
    "cf_chl_",
    "attention required! | cloudflare",
    "checking your browser before accessing",
    "captcha-container",
];

/// Maps a non-success, non-redirect status to a fetch error
pub fn classify_status(url: &str, status: StatusCode) -> FetchError {
    let url = url.to_string();
    let status = status.as_u16();
    if (400..500).contains(&status) {
        FetchError::Rejected { url, status }
    } else {
        FetchError::Unavailable { url, status }
    }
}

/// Maps a transport failure to a fetch error
pub fn classify_transport(url: &str, error: &reqwest::Error) -> FetchError {
    let url = url.to_string();
    if error.is_timeout() {
        FetchError::Timeout { url }
    } else {
        FetchError::NetworkError {
            url,
            message: error.to_string(),
        }
    }
}

/// Returns the first anti-bot marker found in the body
pub fn detect_block(body: &str) -> Option<&'static str> {
    let lowered = body.to_lowercase();
    BLOCK_SIGNATURES
        .iter()
        .copied()
        .find(|signature| lowered.contains(signature))
}
