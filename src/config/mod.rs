//! Configuration module for Juris-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use juris_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvest runs on {}", config.schedule.day_of_week);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AlertConfig, CategoryRuleConfig, Config, EnrichmentConfig, FetchConfig, OutputConfig,
    ProcessorConfig, RetentionConfig, ScheduleConfig, SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
