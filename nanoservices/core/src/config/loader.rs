use std::path::Path;
use std::time::Duration;

use crate::config::types::SyncConfig;
use crate::tables::CONTACT_BASE_COLUMNS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { key: key.to_string(), reason: reason.into() }
}

/// Load a sync config from a YAML file, applying environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<SyncConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Parse a sync config from a YAML string. No env overrides, no validation.
pub fn parse_config(yaml: &str) -> Result<SyncConfig, ConfigError> {
    let config: SyncConfig = serde_yaml::from_str(yaml)?;
    Ok(config)
}

/// Secrets come from the environment when set there.
pub fn apply_env_overrides(config: &mut SyncConfig) {
    apply_env_with(config, |key| std::env::var(key).ok());
}

fn apply_env_with(config: &mut SyncConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(token) = get("RAPIDPRO_TOKEN") {
        config.rapidpro.token = token;
    }
    if let Some(token) = get("CONTENTREPO_TOKEN") {
        config.content_repo.token = token;
    }
    if let Some(path) = get("BQ_KEY_PATH") {
        config.warehouse.key_path = path;
    }
}

/// Parse "250ms", "30s", "5m" or "2h". A bare number is seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let split = value.find(|c: char| !c.is_ascii_digit()).unwrap_or(value.len());
    let (digits, unit) = value.split_at(split);
    let n: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(n)),
        "" | "s" => Some(Duration::from_secs(n)),
        "m" => Some(Duration::from_secs(n.checked_mul(60)?)),
        "h" => Some(Duration::from_secs(n.checked_mul(3600)?)),
        _ => None,
    }
}

fn duration_field(key: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| invalid(key, format!("'{value}' is not a duration")))
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rapidpro.url.trim().is_empty() {
            return Err(invalid("rapidpro.url", "must not be empty"));
        }
        if self.content_repo.url.trim().is_empty() {
            return Err(invalid("content_repo.url", "must not be empty"));
        }
        if self.warehouse.dataset.trim().is_empty() {
            return Err(invalid("warehouse.dataset", "must not be empty"));
        }
        let offset = self.watermark_offset()?;
        if chrono::Duration::from_std(offset).is_err() {
            return Err(invalid("watermark_offset", format!("'{}' is too large", self.watermark_offset)));
        }
        self.max_retry_wait()?;
        self.poll_interval()?;
        self.job_timeout()?;

        for field in &self.contact_fields {
            if CONTACT_BASE_COLUMNS.iter().any(|(name, _)| *name == field.name) {
                return Err(invalid(
                    "contact_fields",
                    format!("'{}' collides with a built-in contact column", field.name),
                ));
            }
        }
        Ok(())
    }

    pub fn watermark_offset(&self) -> Result<Duration, ConfigError> {
        duration_field("watermark_offset", &self.watermark_offset)
    }

    pub fn max_retry_wait(&self) -> Result<Duration, ConfigError> {
        duration_field("rapidpro.max_retry_wait", &self.rapidpro.max_retry_wait)
    }

    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        duration_field("warehouse.poll_interval", &self.warehouse.poll_interval)
    }

    pub fn job_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("warehouse.job_timeout", &self.warehouse.job_timeout)
    }
}
