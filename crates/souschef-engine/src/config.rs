use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::gemini::DEFAULT_GEMINI_API_BASE;
use crate::media::DEFAULT_MEDIA_ATTEMPTS;
use crate::generator::PLAN_STAGE1_ATTEMPTS;
use crate::vector::DEFAULT_BIGQUERY_API_BASE;

pub const DEFAULT_DATA_DIR: &str = ".souschef";
pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 90;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 800;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOverrides {
    pub text: Option<String>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub embedding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigQueryConfig {
    pub api_base: String,
    pub project: String,
    /// `dataset.table` or `project.dataset.table`.
    pub table: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub provider: String,
    pub models: ModelOverrides,
    pub gemini_api_base: String,
    pub voice: String,
    pub request_timeout: Duration,
    pub media_attempts: usize,
    pub retry_backoff: Duration,
    pub plan_attempts: usize,
    pub require_verification: bool,
    pub bigquery: Option<BigQueryConfig>,
    pub catalog_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            provider: DEFAULT_PROVIDER.to_string(),
            models: ModelOverrides::default(),
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            media_attempts: DEFAULT_MEDIA_ATTEMPTS,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
            plan_attempts: PLAN_STAGE1_ATTEMPTS,
            require_verification: true,
            bigquery: None,
            catalog_path: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let provider = lookup("SOUSCHEF_PROVIDER")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or(defaults.provider);
        let require_verification = match lookup("SOUSCHEF_REQUIRE_VERIFICATION") {
            Some(value) => parse_flag(&value),
            None => provider != "dryrun",
        };
        let bigquery = match (
            lookup("SOUSCHEF_BQ_PROJECT").or_else(|| lookup("GOOGLE_CLOUD_PROJECT")),
            lookup("SOUSCHEF_BQ_TABLE"),
        ) {
            (Some(project), Some(table)) => Some(BigQueryConfig {
                api_base: lookup("SOUSCHEF_BQ_API_BASE")
                    .unwrap_or_else(|| DEFAULT_BIGQUERY_API_BASE.to_string()),
                project,
                table,
                access_token: lookup("SOUSCHEF_BQ_ACCESS_TOKEN").unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            data_dir: lookup("SOUSCHEF_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            provider,
            models: ModelOverrides {
                text: lookup("SOUSCHEF_TEXT_MODEL"),
                image: lookup("SOUSCHEF_IMAGE_MODEL"),
                audio: lookup("SOUSCHEF_AUDIO_MODEL"),
                embedding: lookup("SOUSCHEF_EMBEDDING_MODEL"),
            },
            gemini_api_base: lookup("GEMINI_API_BASE").unwrap_or(defaults.gemini_api_base),
            voice: lookup("SOUSCHEF_VOICE").unwrap_or(defaults.voice),
            request_timeout: lookup("SOUSCHEF_REQUEST_TIMEOUT")
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.request_timeout),
            media_attempts: defaults.media_attempts,
            retry_backoff: lookup("SOUSCHEF_MEDIA_BACKOFF_MS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            plan_attempts: defaults.plan_attempts,
            require_verification,
            bigquery,
            catalog_path: lookup("SOUSCHEF_CATALOG").map(PathBuf::from),
        }
    }

    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("storage.json")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}

/// API key from the environment, used when none is stored.
pub fn env_api_key() -> Option<String> {
    non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config.data_dir, PathBuf::from(".souschef"));
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.request_timeout, Duration::from_secs(90));
        assert_eq!(config.media_attempts, 3);
        assert_eq!(config.plan_attempts, 3);
        assert!(config.require_verification);
        assert!(config.bigquery.is_none());
        assert_eq!(config.storage_path(), PathBuf::from(".souschef/storage.json"));
    }

    #[test]
    fn reads_overrides_and_bigquery_settings() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SOUSCHEF_DATA_DIR", "/tmp/kitchen"),
            ("SOUSCHEF_PROVIDER", "DryRun"),
            ("SOUSCHEF_REQUEST_TIMEOUT", "12.5"),
            ("SOUSCHEF_MEDIA_BACKOFF_MS", "0"),
            ("SOUSCHEF_TEXT_MODEL", "gemini-2.5-pro"),
            ("SOUSCHEF_BQ_PROJECT", "kitchen-prod"),
            ("SOUSCHEF_BQ_TABLE", "recipes.catalog"),
        ]));
        assert_eq!(config.provider, "dryrun");
        assert!(!config.require_verification);
        assert_eq!(config.request_timeout, Duration::from_millis(12_500));
        assert_eq!(config.retry_backoff, Duration::ZERO);
        assert_eq!(config.models.text.as_deref(), Some("gemini-2.5-pro"));
        let bigquery = config
            .bigquery
            .as_ref()
            .unwrap_or_else(|| panic!("bigquery config missing"));
        assert_eq!(bigquery.project, "kitchen-prod");
        assert_eq!(bigquery.api_base, DEFAULT_BIGQUERY_API_BASE);
        assert_eq!(config.events_path(), PathBuf::from("/tmp/kitchen/events.jsonl"));
    }

    #[test]
    fn verification_flag_can_be_forced() {
        let config = EngineConfig::from_lookup(lookup(&[("SOUSCHEF_REQUIRE_VERIFICATION", "off")]));
        assert!(!config.require_verification);
        let config = EngineConfig::from_lookup(lookup(&[
            ("SOUSCHEF_PROVIDER", "dryrun"),
            ("SOUSCHEF_REQUIRE_VERIFICATION", "1"),
        ]));
        assert!(config.require_verification);
    }
}
