//! Persistent application configuration model and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Where collection files live.
    pub storage: StorageConfig,
    #[serde(default)]
    /// Catalog API endpoint and request pacing.
    pub catalog: CatalogConfig,
    #[serde(default)]
    /// Batch enrichment behavior.
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    /// Prompt summary budget.
    pub summary: SummaryConfig,
    #[serde(default)]
    /// Text generation endpoint.
    pub generation: GenerationConfig,
    #[serde(default)]
    /// Extra corrections layered over the built-in year override table.
    pub year_overrides: Vec<YearOverrideConfig>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_collection_file")]
    pub collection_file: String,
    #[serde(default = "default_enriched_file")]
    pub enriched_file: String,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Minimum spacing between any two catalog requests.
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,
    /// Pause after each successfully fetched collection page.
    #[serde(default = "default_page_interval_ms")]
    pub page_interval_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_catalog_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SummaryConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Fixed sampling seed; the OS seeds the sampler when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// One `[[year_overrides]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct YearOverrideConfig {
    pub artist: String,
    pub title: String,
    pub year: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no config directory available on this platform")]
    NoConfigDir,
    #[error("failed to access config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize default config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection_file: default_collection_file(),
            enriched_file: default_enriched_file(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_catalog_base_url(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            request_interval_ms: default_request_interval_ms(),
            page_interval_ms: default_page_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_catalog_timeout_ms(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            progress_interval: default_progress_interval(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            seed: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_generation_model(),
            request_timeout_ms: default_generation_timeout_ms(),
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl GenerationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_collection_file() -> String {
    "vinyl_collection.csv".to_string()
}

fn default_enriched_file() -> String {
    "enriched_collection.csv".to_string()
}

fn default_catalog_base_url() -> String {
    "https://api.discogs.com".to_string()
}

fn default_user_agent() -> String {
    "VinylRecommender/1.0".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_request_interval_ms() -> u64 {
    1_000
}

fn default_page_interval_ms() -> u64 {
    1_500
}

fn default_error_backoff_ms() -> u64 {
    2_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_catalog_timeout_ms() -> u64 {
    15_000
}

fn default_progress_interval() -> usize {
    10
}

fn default_max_items() -> usize {
    150
}

fn default_generation_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_generation_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_generation_timeout_ms() -> u64 {
    60_000
}

/// Clamps numeric settings into ranges the pipeline can work with.
pub fn sanitize_config(config: Config) -> Config {
    let catalog = CatalogConfig {
        page_size: config.catalog.page_size.clamp(1, 100),
        request_interval_ms: config.catalog.request_interval_ms.min(60_000),
        page_interval_ms: config.catalog.page_interval_ms.min(60_000),
        error_backoff_ms: config.catalog.error_backoff_ms.min(60_000),
        max_attempts: config.catalog.max_attempts.clamp(1, 10),
        request_timeout_ms: config.catalog.request_timeout_ms.clamp(1_000, 120_000),
        base_url: config.catalog.base_url.trim().trim_end_matches('/').to_string(),
        user_agent: config.catalog.user_agent,
    };
    let generation = GenerationConfig {
        base_url: config
            .generation
            .base_url
            .trim()
            .trim_end_matches('/')
            .to_string(),
        request_timeout_ms: config.generation.request_timeout_ms.clamp(1_000, 600_000),
        model: config.generation.model,
    };

    Config {
        enrichment: EnrichmentConfig {
            progress_interval: config.enrichment.progress_interval.max(1),
        },
        summary: SummaryConfig {
            max_items: config.summary.max_items.max(1),
            seed: config.summary.seed,
        },
        storage: config.storage,
        year_overrides: config.year_overrides,
        catalog,
        generation,
    }
}

/// Default config location under the platform config directory.
pub fn default_config_file() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("vinyl_recommender").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Loads `config_file`, writing defaults first when it does not exist yet.
/// A file that fails to parse falls back to defaults.
pub fn load_or_create(config_file: &Path) -> Result<Config, ConfigError> {
    let io_error = |source| ConfigError::Io {
        path: config_file.to_path_buf(),
        source,
    };
    if !config_file.exists() {
        if let Some(parent) = config_file.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(config_file, toml::to_string(&Config::default())?).map_err(io_error)?;
    }
    let config_content = std::fs::read_to_string(config_file).map_err(io_error)?;
    Ok(sanitize_config(
        toml::from_str::<Config>(&config_content).unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::{load_or_create, sanitize_config, Config};

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let serialized =
            toml::to_string(&Config::default()).expect("default config should serialize");
        let parsed: Config = toml::from_str(&serialized).expect("config should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let parsed: Config = toml::from_str(
            r#"
            [summary]
            seed = 7

            [[year_overrides]]
            artist = "Can"
            title = "Tago Mago"
            year = 1971
            "#,
        )
        .expect("config should parse");
        assert_eq!(parsed.summary.seed, Some(7));
        assert_eq!(parsed.summary.max_items, 150);
        assert_eq!(parsed.catalog.page_size, 100);
        assert_eq!(parsed.year_overrides.len(), 1);
    }

    #[test]
    fn test_sanitize_config_clamps_out_of_range_values() {
        let mut config = Config::default();
        config.catalog.page_size = 10_000;
        config.catalog.max_attempts = 0;
        config.catalog.base_url = "https://api.discogs.com/ ".to_string();
        config.summary.max_items = 0;
        config.enrichment.progress_interval = 0;

        let sanitized = sanitize_config(config);
        assert_eq!(sanitized.catalog.page_size, 100);
        assert_eq!(sanitized.catalog.max_attempts, 1);
        assert_eq!(sanitized.catalog.base_url, "https://api.discogs.com");
        assert_eq!(sanitized.summary.max_items, 1);
        assert_eq!(sanitized.enrichment.progress_interval, 1);
    }

    #[test]
    fn test_load_or_create_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_file = dir.path().join("nested").join("config.toml");

        let config = load_or_create(&config_file).expect("config should load");
        assert!(config_file.exists());
        assert_eq!(config, sanitize_config(Config::default()));
    }

    #[test]
    fn test_load_or_create_falls_back_to_defaults_on_invalid_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "this is = = not toml").expect("write");

        let config = load_or_create(&config_file).expect("config should load");
        assert_eq!(config.summary.max_items, 150);
    }
}
