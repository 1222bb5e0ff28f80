//! Runtime configuration for hosts embedding the core.
//!
//! Loaded from a JSON document or from `RELADEN_*` environment variables.
//! Endpoint URLs are normalized on load; credentials are never logged.

use serde::{Deserialize, Serialize};

use crate::scheduler::{GeneratorError, HttpConversationGenerator, SchedulerOptions};
use crate::sync::{CloudError, RestCloudTables, SyncOptions};
use crate::util::{normalize_endpoint, normalize_text_option};

const DEFAULT_SYNC_INTERVAL_MS: u64 = 60_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ReladenConfig {
    /// Local database file; hosts pick a per-user default when unset
    pub database_path: Option<String>,
    pub scheduler: SchedulerOptions,
    pub sync: SyncConfig,
    pub generator: GeneratorConfig,
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncConfig {
    pub cloud_url: Option<String>,
    pub anon_key: Option<String>,
    pub access_token: Option<String>,
    /// Period of background sync passes in long-running hosts
    pub interval_ms: u64,
    pub min_interval_ms: i64,
    pub max_attempts: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let options = SyncOptions::default();
        Self {
            cloud_url: None,
            anon_key: None,
            access_token: None,
            interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            min_interval_ms: options.min_interval_ms,
            max_attempts: options.max_attempts,
        }
    }
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("cloud_url", &self.cloud_url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("interval_ms", &self.interval_ms)
            .field("min_interval_ms", &self.min_interval_ms)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl SyncConfig {
    pub const fn options(&self) -> SyncOptions {
        SyncOptions {
            min_interval_ms: self.min_interval_ms,
            max_attempts: self.max_attempts,
        }
    }

    /// Whether a cloud endpoint is configured at all.
    pub const fn is_configured(&self) -> bool {
        self.cloud_url.is_some() && self.anon_key.is_some()
    }

    /// Cloud client, or `None` when sync is not configured.
    pub fn cloud_tables(&self) -> Result<Option<RestCloudTables>, CloudError> {
        match (&self.cloud_url, &self.anon_key) {
            (Some(url), Some(key)) => {
                RestCloudTables::new(url.as_str(), key.as_str(), self.access_token.clone())
                    .map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct GeneratorConfig {
    pub endpoint: Option<String>,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for GeneratorConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("GeneratorConfig")
            .field("endpoint", &self.endpoint)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl GeneratorConfig {
    /// HTTP generator client, or `None` when no endpoint is configured.
    pub fn client(&self) -> Result<Option<HttpConversationGenerator>, GeneratorError> {
        self.endpoint
            .as_deref()
            .map(|endpoint| HttpConversationGenerator::new(endpoint, self.access_token.clone()))
            .transpose()
    }
}

impl ReladenConfig {
    /// Parse and normalize a JSON configuration document.
    pub fn from_json(payload: &str) -> Result<Self, String> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| format!("invalid configuration JSON: {error}"))?;
        config.normalized()
    }

    /// Build from `RELADEN_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let text = |name: &str| normalize_text_option(lookup(name));
        let mut config = Self {
            database_path: text("RELADEN_DB_PATH"),
            ..Self::default()
        };

        config.sync.cloud_url = text("RELADEN_CLOUD_URL");
        config.sync.anon_key = text("RELADEN_CLOUD_ANON_KEY");
        config.sync.access_token = text("RELADEN_CLOUD_TOKEN");
        if let Some(value) = text("RELADEN_SYNC_INTERVAL_MS") {
            config.sync.interval_ms = parse_number("RELADEN_SYNC_INTERVAL_MS", &value)?;
        }

        config.generator.endpoint = text("RELADEN_GENERATOR_URL");
        config.generator.access_token = text("RELADEN_GENERATOR_TOKEN");

        if let Some(value) = text("RELADEN_SCHEDULER_ENABLED") {
            config.scheduler.enabled = parse_flag("RELADEN_SCHEDULER_ENABLED", &value)?;
        }
        if let Some(value) = text("RELADEN_SCHEDULER_INTERVAL_MS") {
            config.scheduler.base_interval_ms =
                parse_number("RELADEN_SCHEDULER_INTERVAL_MS", &value)?;
        }
        if let Some(value) = text("RELADEN_UTC_OFFSET_MINUTES") {
            config.scheduler.utc_offset_minutes =
                Some(parse_number("RELADEN_UTC_OFFSET_MINUTES", &value)?);
        }

        config.normalized()
    }

    fn normalized(mut self) -> Result<Self, String> {
        self.database_path = normalize_text_option(self.database_path);

        self.sync.cloud_url = normalize_url(self.sync.cloud_url, "sync.cloudUrl")?;
        self.sync.anon_key = normalize_text_option(self.sync.anon_key);
        self.sync.access_token = normalize_text_option(self.sync.access_token);
        if self.sync.cloud_url.is_some() != self.sync.anon_key.is_some() {
            return Err("sync.cloudUrl and sync.anonKey must be set together".to_string());
        }

        self.generator.endpoint = normalize_url(self.generator.endpoint, "generator.endpoint")?;
        self.generator.access_token = normalize_text_option(self.generator.access_token);

        if self.scheduler.lease_name.trim().is_empty() {
            return Err("scheduler.leaseName must not be empty".to_string());
        }
        if self.scheduler.jitter_percent > 100 {
            return Err("scheduler.jitterPercent must be at most 100".to_string());
        }
        Ok(self)
    }
}

fn normalize_url(value: Option<String>, field: &str) -> Result<Option<String>, String> {
    normalize_text_option(value)
        .map(|url| normalize_endpoint(&url).map_err(|error| format!("{field}: {error}")))
        .transpose()
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("{name} must be a number, got '{value}'"))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("{name} must be true or false, got '{value}'")),
    }
}
