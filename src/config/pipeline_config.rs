use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_CONFIG_PATH: &str = "src/configs/pipeline.toml";
pub const ENV_PREFIX: &str = "BOOKSALES";

/// Upper bound on the retention window, in days.
pub const MAX_RETENTION_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub retention: RetentionSection,
    pub clock: ClockSection,
    pub storage: StorageSection,
    pub ledger: LedgerSection,
    pub sink: SinkSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionSection {
    pub days: i64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self { days: 1095 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockSection {
    pub utc_offset_hours: i32,
}

impl Default for ClockSection {
    fn default() -> Self {
        // KST
        Self { utc_offset_hours: 9 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub ledger_prefix: String,
    pub integrated_key: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            ledger_prefix: "ledgers".to_string(),
            integrated_key: "integrated/daily_sales.parquet".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// First date the missing-date planner checks, `YYYY-MM-DD`.
    pub start_date: String,
    pub inventory_key: String,
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            start_date: "2025-01-01".to_string(),
            inventory_key: "inventory/stock.parquet".to_string(),
        }
    }
}

impl LedgerSection {
    pub fn start(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.start_date, "%Y-%m-%d")
            .with_context(|| format!("Invalid ledger start_date: {}", self.start_date))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSection {
    pub url: Option<String>,
    pub sales_table: String,
    pub inventory_table: String,
    pub chunk_size: usize,
    pub bookstores: Vec<String>,
    pub env_url: String,
    pub env_service_key: String,
}

impl Default for SinkSection {
    fn default() -> Self {
        Self {
            url: None,
            sales_table: "daily_sales".to_string(),
            inventory_table: "inventory".to_string(),
            chunk_size: 500,
            // 영풍 is opt-in
            bookstores: vec!["교보".to_string(), "YES24".to_string(), "알라딘".to_string()],
            env_url: "SUPABASE_URL".to_string(),
            env_service_key: "SUPABASE_SERVICE_ROLE_KEY".to_string(),
        }
    }
}

impl SinkSection {
    /// REST base url from config, else from the configured env var.
    pub fn resolve_url(&self) -> Result<String> {
        match &self.url {
            Some(url) if !url.is_empty() => Ok(url.trim_end_matches('/').to_string()),
            _ => env::var(&self.env_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .with_context(|| format!("Missing environment variable: {}", self.env_url)),
        }
    }

    pub fn resolve_service_key(&self) -> Result<String> {
        env::var(&self.env_service_key)
            .with_context(|| format!("Missing environment variable: {}", self.env_service_key))
    }
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Optional file at `path` overlaid with `BOOKSALES__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::with_name(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load pipeline config from {}", path))?;

        let config: PipelineConfig = settings
            .try_deserialize()
            .context("Failed to deserialize pipeline config")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_RETENTION_DAYS).contains(&self.retention.days) {
            return Err(anyhow!(
                "retention.days must be between 1 and {}, got {}",
                MAX_RETENTION_DAYS,
                self.retention.days
            ));
        }

        if !(-12..=14).contains(&self.clock.utc_offset_hours) {
            return Err(anyhow!("clock.utc_offset_hours out of range: {}", self.clock.utc_offset_hours));
        }

        if self.sink.chunk_size == 0 {
            return Err(anyhow!("sink.chunk_size cannot be zero"));
        }

        if self.storage.integrated_key.is_empty() {
            return Err(anyhow!("storage.integrated_key cannot be empty"));
        }

        self.ledger.start()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.retention.days, 1095);
        assert_eq!(config.clock.utc_offset_hours, 9);
        assert_eq!(config.sink.chunk_size, 500);
        assert_eq!(config.sink.bookstores, vec!["교보", "YES24", "알라딘"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [retention]
            days = 30

            [sink]
            bookstores = ["교보", "YES24"]
            "#,
        )
        .unwrap();

        assert_eq!(config.retention.days, 30);
        assert_eq!(config.sink.bookstores, vec!["교보", "YES24"]);
        assert_eq!(config.sink.sales_table, "daily_sales");
        assert_eq!(config.storage.ledger_prefix, "ledgers");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.sink.chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.ledger.start_date = "yesterday".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.retention.days = i64::MAX;
        assert!(config.validate().is_err());
        config.retention.days = MAX_RETENTION_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides_file() {
        unsafe {
            env::set_var("BOOKSALES__RETENTION__DAYS", "400");
        }

        let config = PipelineConfig::load("does/not/exist").unwrap();
        assert_eq!(config.retention.days, 400);
        assert_eq!(config.clock.utc_offset_hours, 9);

        unsafe {
            env::remove_var("BOOKSALES__RETENTION__DAYS");
        }
    }

    #[test]
    fn test_sink_credentials_from_env() {
        unsafe {
            env::set_var("TEST_BOOKSALES_SINK_URL", "https://example.supabase.co/");
            env::set_var("TEST_BOOKSALES_SINK_KEY", "service-key");
        }

        let mut sink = SinkSection::default();
        sink.env_url = "TEST_BOOKSALES_SINK_URL".to_string();
        sink.env_service_key = "TEST_BOOKSALES_SINK_KEY".to_string();
        assert_eq!(sink.resolve_url().unwrap(), "https://example.supabase.co");
        assert_eq!(sink.resolve_service_key().unwrap(), "service-key");

        sink.env_service_key = "TEST_BOOKSALES_SINK_KEY_MISSING".to_string();
        assert!(sink.resolve_service_key().is_err());

        unsafe {
            env::remove_var("TEST_BOOKSALES_SINK_URL");
            env::remove_var("TEST_BOOKSALES_SINK_KEY");
        }
    }
}
