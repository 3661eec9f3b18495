//! URL handling module for Juris-Harvest
//!
//! Natural-key normalization, per-host gating keys and link resolution.

mod domain;
mod normalize;

pub use domain::{host_key, resolve_link, robots_url};
pub use normalize::normalize_url;
