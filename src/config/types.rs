use crate::processor::Category;
use crate::sources::SourceId;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Juris-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Returns the enabled source entries in declaration order
    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Builds the User-Agent header value
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Fetch engine defaults shared by all sources
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub max_redirects: u32,
    pub min_host_delay_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_concurrent_sources: usize,
    pub stop_grace_secs: u64,
    pub respect_robots: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 10,
            min_host_delay_ms: 1000,
            max_retries: 3,
            retry_delay_ms: 2000,
            max_concurrent_sources: 2,
            stop_grace_secs: 30,
            respect_robots: true,
        }
    }
}

/// One configured publication source
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    pub id: SourceId,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the site's default base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Maximum documents harvested per cycle
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Maximum listing pages walked per cycle
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub retry_delay_ms: Option<u64>,

    #[serde(default)]
    pub min_delay_ms: Option<u64>,
}

impl SourceConfig {
    pub fn new(id: SourceId) -> Self {
        Self {
            id,
            enabled: true,
            base_url: None,
            limit: default_limit(),
            max_pages: default_max_pages(),
            max_retries: None,
            retry_delay_ms: None,
            min_delay_ms: None,
        }
    }

    pub fn effective_max_retries(&self, fetch: &FetchConfig) -> u32 {
        self.max_retries.unwrap_or(fetch.max_retries)
    }

    pub fn effective_retry_delay(&self, fetch: &FetchConfig) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(fetch.retry_delay_ms))
    }

    pub fn effective_min_delay(&self, fetch: &FetchConfig) -> Duration {
        Duration::from_millis(self.min_delay_ms.unwrap_or(fetch.min_host_delay_ms))
    }
}

/// Weekly harvest slot and whole-cycle retry policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ScheduleConfig {
    pub day_of_week: String,
    pub time: String,
    /// `UTC` or a fixed `±HH:MM` offset
    pub timezone: String,
    pub max_retries: u32,
    pub retry_delay_minutes: u64,
    pub health_check_interval_minutes: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            day_of_week: "monday".to_string(),
            time: "02:00".to_string(),
            timezone: "-03:00".to_string(),
            max_retries: 3,
            retry_delay_minutes: 30,
            health_check_interval_minutes: 1440,
        }
    }
}

/// Storage retention policy
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub days_to_keep: u32,
    pub day_of_week: String,
    pub time: String,
    /// Directory receiving a database snapshot before each purge
    pub backup_dir: Option<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days_to_keep: 90,
            day_of_week: "sunday".to_string(),
            time: "01:00".to_string(),
            backup_dir: None,
        }
    }
}

/// Alert thresholds and delivery channels
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AlertConfig {
    pub min_success_rate: f64,
    pub max_error_count: u32,
    pub email_recipients: Vec<String>,
    /// HTTP relay that turns a JSON payload into an email
    pub email_relay_url: Option<String>,
    pub webhook_url: Option<String>,
    pub notify_on_success: bool,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.7,
            max_error_count: 10,
            email_recipients: Vec::new(),
            email_relay_url: None,
            webhook_url: None,
            notify_on_success: false,
        }
    }
}

/// External text-analysis collaborator
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Share of the final quality score taken from the collaborator
    pub weight: f64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key_env: "ENRICHMENT_API_KEY".to_string(),
            timeout_secs: 20,
            weight: 0.5,
        }
    }
}

/// Processing rule overrides
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProcessorConfig {
    /// Documents with fewer words after cleaning are rejected as empty
    pub min_words: usize,
    #[serde(rename = "category-rule")]
    pub category_rules: Vec<CategoryRuleConfig>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            min_words: 5,
            category_rules: Vec::new(),
        }
    }
}

/// Replaces the built-in keyword list for one category
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryRuleConfig {
    pub category: Category,
    pub keywords: Vec<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Path of the JSONL training export
    #[serde(default = "default_export_path")]
    pub export_path: String,

    /// Minimum quality score for exported documents
    #[serde(default = "default_export_min_quality")]
    pub export_min_quality: f64,
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    50
}

fn default_max_pages() -> u32 {
    5
}

fn default_export_path() -> String {
    "training_data.jsonl".to_string()
}

fn default_export_min_quality() -> f64 {
    0.7
}
