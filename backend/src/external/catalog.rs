//! Part catalog: resolves a scanned barcode to a part number, name and list price
//!
//! Two sources are supported, a CSV export of the part master and the part
//! master's HTTP API.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, AppResult};

/// Catalog entry for one barcode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartInfo {
    pub part_no: String,
    pub name: String,
    pub unit_price: Decimal,
}

#[async_trait]
pub trait PartCatalog: Send + Sync {
    /// Look up a barcode; `None` when the catalog does not know it
    async fn lookup(&self, barcode: &str) -> AppResult<Option<PartInfo>>;

    /// Drop anything cached so the next lookup reads the source again
    async fn reload(&self) -> AppResult<()> {
        Ok(())
    }
}

/// Catalog used when no part master is configured
#[derive(Debug, Clone, Default)]
pub struct NoCatalog;

#[async_trait]
impl PartCatalog for NoCatalog {
    async fn lookup(&self, _barcode: &str) -> AppResult<Option<PartInfo>> {
        Ok(None)
    }
}

// ============================================================================
// CSV
// ============================================================================

#[derive(Debug, Deserialize)]
struct CsvRow {
    barcode: String,
    part_no: String,
    name: String,
    #[serde(with = "rust_decimal::serde::str")]
    unit_price: Decimal,
}

/// Part master export with `barcode,part_no,name,unit_price` columns.
///
/// The file is parsed on the first lookup and kept until [`PartCatalog::reload`].
pub struct CsvPartCatalog {
    path: PathBuf,
    entries: RwLock<Option<HashMap<String, PartInfo>>>,
}

impl CsvPartCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(None),
        }
    }

    async fn load(&self) -> AppResult<HashMap<String, PartInfo>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Catalog(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        parse_csv(&bytes)
    }
}

fn parse_csv(bytes: &[u8]) -> AppResult<HashMap<String, PartInfo>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut entries = HashMap::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row.map_err(|e| AppError::Catalog(format!("malformed part master row: {}", e)))?;
        entries.insert(
            row.barcode,
            PartInfo {
                part_no: row.part_no,
                name: row.name,
                unit_price: row.unit_price,
            },
        );
    }
    Ok(entries)
}

#[async_trait]
impl PartCatalog for CsvPartCatalog {
    async fn lookup(&self, barcode: &str) -> AppResult<Option<PartInfo>> {
        if let Some(entries) = self.entries.read().await.as_ref() {
            return Ok(entries.get(barcode).cloned());
        }

        let mut cache = self.entries.write().await;
        if cache.is_none() {
            let entries = self.load().await?;
            tracing::info!(path = %self.path.display(), parts = entries.len(), "Part master loaded");
            *cache = Some(entries);
        }
        Ok(cache.as_ref().and_then(|entries| entries.get(barcode).cloned()))
    }

    async fn reload(&self) -> AppResult<()> {
        *self.entries.write().await = None;
        tracing::debug!(path = %self.path.display(), "Part master cache cleared");
        Ok(())
    }
}

// ============================================================================
// HTTP
// ============================================================================

/// Part master service client (`GET {endpoint}/parts/{barcode}`)
#[derive(Clone)]
pub struct HttpPartCatalog {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpPartCatalog {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Catalog(format!("cannot build HTTP client: {}", e)))?;

        let endpoint = endpoint.into();
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| AppError::Catalog(format!("invalid endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(AppError::Catalog(format!("invalid endpoint {}", endpoint)));
        }

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    /// `{endpoint}/parts/{barcode}` with the barcode encoded as one path segment
    fn part_url(&self, barcode: &str) -> AppResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Catalog(format!("invalid endpoint {}", self.endpoint)))?
            .pop_if_empty()
            .push("parts")
            .push(barcode);
        Ok(url)
    }
}

#[async_trait]
impl PartCatalog for HttpPartCatalog {
    async fn lookup(&self, barcode: &str) -> AppResult<Option<PartInfo>> {
        // Url drops dot segments from a path
        if barcode.is_empty() || barcode == "." || barcode == ".." {
            return Ok(None);
        }
        let url = self.part_url(barcode)?;

        let mut request = self.client.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::Catalog(format!("request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Catalog(format!("API returned {}: {}", status, body)));
        }

        let part: PartInfo = response
            .json()
            .await
            .map_err(|e| AppError::Catalog(format!("failed to parse response: {}", e)))?;

        Ok(Some(part))
    }
}
