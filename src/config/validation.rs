use crate::config::types::{
    AlertConfig, Config, EnrichmentConfig, FetchConfig, OutputConfig, ProcessorConfig,
    RetentionConfig, ScheduleConfig, SourceConfig, UserAgentConfig,
};
use crate::scheduler::calendar::WeeklySlot;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound for schedule delays and intervals, in minutes (one week)
const MAX_SCHEDULE_MINUTES: u64 = 7 * 24 * 60;

/// Upper bound for `days-to-keep` (one hundred years)
const MAX_DAYS_TO_KEEP: u32 = 36_500;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_fetch_config(&config.fetch)?;
    validate_sources(&config.sources)?;
    validate_schedule_config(&config.schedule)?;
    validate_retention_config(&config.retention)?;
    validate_alert_config(&config.alerts)?;
    validate_enrichment_config(&config.enrichment)?;
    validate_processor_config(&config.processor)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "fetch.timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.retry_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "fetch.retry_delay_ms must be > 0".to_string(),
        ));
    }

    if config.max_concurrent_sources < 1 || config.max_concurrent_sources > 16 {
        return Err(ConfigError::Validation(format!(
            "fetch.max_concurrent_sources must be between 1 and 16, got {}",
            config.max_concurrent_sources
        )));
    }

    Ok(())
}

fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        if !seen.insert(source.id) {
            return Err(ConfigError::Validation(format!(
                "Source '{}' is configured more than once",
                source.id
            )));
        }

        if source.limit == 0 {
            return Err(ConfigError::Validation(format!(
                "Source '{}' must have limit >= 1",
                source.id
            )));
        }

        if source.max_pages == 0 {
            return Err(ConfigError::Validation(format!(
                "Source '{}' must have max_pages >= 1",
                source.id
            )));
        }

        if source.retry_delay_ms == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Source '{}' retry_delay_ms must be > 0",
                source.id
            )));
        }

        if let Some(base) = &source.base_url {
            let url = Url::parse(base).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid base_url '{}': {}", base, e))
            })?;

            if url.scheme() != "https" && url.scheme() != "http" {
                return Err(ConfigError::Validation(format!(
                    "base_url '{}' must use an HTTP(S) scheme",
                    base
                )));
            }
        }
    }

    Ok(())
}

fn validate_schedule_config(config: &ScheduleConfig) -> Result<(), ConfigError> {
    WeeklySlot::parse(&config.day_of_week, &config.time, &config.timezone)?;

    for (name, minutes) in [
        ("retry_delay_minutes", config.retry_delay_minutes),
        ("health_check_interval_minutes", config.health_check_interval_minutes),
    ] {
        if minutes == 0 || minutes > MAX_SCHEDULE_MINUTES {
            return Err(ConfigError::Validation(format!(
                "schedule.{} must be within [1, {}], got {}",
                name, MAX_SCHEDULE_MINUTES, minutes
            )));
        }
    }

    Ok(())
}

fn validate_retention_config(config: &RetentionConfig) -> Result<(), ConfigError> {
    if config.days_to_keep == 0 || config.days_to_keep > MAX_DAYS_TO_KEEP {
        return Err(ConfigError::Validation(format!(
            "retention.days_to_keep must be within [1, {}], got {}",
            MAX_DAYS_TO_KEEP, config.days_to_keep
        )));
    }

    // Timezone is shared with [schedule] and checked there
    WeeklySlot::parse(&config.day_of_week, &config.time, "UTC")?;

    Ok(())
}

fn validate_alert_config(config: &AlertConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.min_success_rate) {
        return Err(ConfigError::Validation(format!(
            "alerts.min_success_rate must be within [0, 1], got {}",
            config.min_success_rate
        )));
    }

    for recipient in &config.email_recipients {
        validate_email(recipient)?;
    }

    for (name, value) in [
        ("email_relay_url", &config.email_relay_url),
        ("webhook_url", &config.webhook_url),
    ] {
        if let Some(url) = value {
            Url::parse(url)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
        }
    }

    Ok(())
}

fn validate_enrichment_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&config.weight) {
        return Err(ConfigError::Validation(format!(
            "enrichment.weight must be within [0, 1], got {}",
            config.weight
        )));
    }

    if !config.enabled {
        return Ok(());
    }

    match &config.endpoint {
        Some(endpoint) => {
            Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidUrl(format!("Invalid enrichment endpoint: {}", e))
            })?;
        }
        None => {
            return Err(ConfigError::Validation(
                "enrichment is enabled but no endpoint is configured".to_string(),
            ));
        }
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "enrichment.timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_processor_config(config: &ProcessorConfig) -> Result<(), ConfigError> {
    for rule in &config.category_rules {
        if rule.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "category rule for {} needs at least one keyword",
                rule.category
            )));
        }
    }
    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.export_path.is_empty() {
        return Err(ConfigError::Validation(
            "export_path cannot be empty".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&config.export_min_quality) {
        return Err(ConfigError::Validation(format!(
            "export_min_quality must be within [0, 1], got {}",
            config.export_min_quality
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation("email cannot be empty".to_string()));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() || domain.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
