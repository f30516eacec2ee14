use crate::config::SinkSection;
use crate::models::{InventoryRecord, UpsertRecord};
use crate::sink::SalesSink;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Serialize;
use wreq::Client;

pub const SALES_CONFLICT_TARGET: &str = "isbn,sale_date,bookstore";
pub const INVENTORY_CONFLICT_TARGET: &str = "isbn";

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: String,
    pub sales_table: String,
    pub inventory_table: String,
}

impl SupabaseConfig {
    /// Resolve url and service key; a missing credential is fatal.
    pub fn from_section(section: &SinkSection) -> Result<Self> {
        let config = Self {
            url: section.resolve_url()?,
            service_key: section.resolve_service_key()?,
            sales_table: section.sales_table.clone(),
            inventory_table: section.inventory_table.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(anyhow!("Sink url must be http(s): {}", self.url));
        }
        if self.service_key.is_empty() {
            return Err(anyhow!("Sink service key cannot be empty"));
        }
        Ok(())
    }

    pub fn upsert_url(&self, table: &str, conflict_target: &str) -> String {
        format!("{}/rest/v1/{}?on_conflict={}", self.url, table, conflict_target)
    }
}

/// PostgREST upsert client.
pub struct SupabaseSink {
    client: Client,
    config: SupabaseConfig,
}

impl SupabaseSink {
    pub fn new(config: SupabaseConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder().build()?;
        Ok(SupabaseSink { client, config })
    }

    async fn upsert<T: Serialize + Sync>(&self, table: &str, conflict_target: &str, rows: &[T]) -> Result<()> {
        let url = self.config.upsert_url(table, conflict_target);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.config.service_key)
            .header("Authorization", format!("Bearer {}", self.config.service_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await
            .with_context(|| format!("Upsert request to {} failed", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("HTTP error {} from {}: {}", status, table, body));
        }
        Ok(())
    }
}

#[async_trait]
impl SalesSink for SupabaseSink {
    async fn upsert_sales(&self, chunk: &[UpsertRecord]) -> Result<()> {
        self.upsert(&self.config.sales_table, SALES_CONFLICT_TARGET, chunk).await
    }

    async fn upsert_inventory(&self, chunk: &[InventoryRecord]) -> Result<()> {
        self.upsert(&self.config.inventory_table, INVENTORY_CONFLICT_TARGET, chunk).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn config() -> SupabaseConfig {
        SupabaseConfig {
            url: "https://project.supabase.co".to_string(),
            service_key: "service-key".to_string(),
            sales_table: "daily_sales".to_string(),
            inventory_table: "inventory".to_string(),
        }
    }

    #[test]
    fn test_upsert_url_carries_conflict_target() {
        assert_eq!(
            config().upsert_url("daily_sales", SALES_CONFLICT_TARGET),
            "https://project.supabase.co/rest/v1/daily_sales?on_conflict=isbn,sale_date,bookstore"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut bad = config();
        bad.url = "project.supabase.co".to_string();
        assert!(SupabaseSink::new(bad).is_err());

        let mut bad = config();
        bad.service_key.clear();
        assert!(bad.validate().is_err());
        assert!(SupabaseSink::new(config()).is_ok());
    }

    #[test]
    fn test_missing_service_key_is_fatal() {
        let mut section = SinkSection::default();
        section.url = Some("https://project.supabase.co".to_string());
        section.env_service_key = "TEST_SUPABASE_KEY_NOT_SET".to_string();
        assert!(SupabaseConfig::from_section(&section).is_err());
    }

    #[tokio::test]
    #[ignore] // Run with --ignored flag for integration tests
    async fn test_upsert_against_live_store() {
        if env::var("SUPABASE_INTEGRATION_TEST").is_err() {
            return;
        }
        let config = SupabaseConfig::from_section(&SinkSection::default()).unwrap();
        let sink = SupabaseSink::new(config).unwrap();
        let record = UpsertRecord {
            isbn: "9790000000001".to_string(),
            sale_date: "2026-01-10".to_string(),
            bookstore: "교보".to_string(),
            quantity: 1,
            price: 0,
        };
        assert!(sink.upsert_sales(&[record]).await.is_ok());
    }
}
