//! Sales-archive HTTP integration.
//!
//! Queries the sold-listing archive collaborator for historical card
//! sales. Read-only, no authentication.
//!
//! Endpoint: `GET {base}/v1/sales?query={identity}&days={window}`
//! An empty `sales` array is a legitimate "no data" response.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PriceLookup, RawSaleRecord};
use crate::config::LookupConfig;
use crate::types::CardIdentity;

const SOURCE_NAME: &str = "sales-archive";

// ---------------------------------------------------------------------------
// API response types (archive JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    #[serde(default)]
    sales: Vec<ArchiveSale>,
}

/// One sale as the archive reports it. Only the fields we need.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArchiveSale {
    #[serde(default)]
    sale_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Option<Decimal>,
    #[serde(default)]
    currency: String,
    /// RFC 3339 timestamp or plain date, depending on archive age.
    #[serde(default)]
    sold_at: String,
    #[serde(default)]
    condition_text: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sales-archive collaborator client.
pub struct SalesArchiveClient {
    http: Client,
    base_url: String,
}

impl SalesArchiveClient {
    pub fn new(config: &LookupConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("ARBITER/0.1.0 (card-valuation-agent)")
            .build()
            .context("Failed to build HTTP client for sales archive")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Parse an archive timestamp. Newer records carry RFC 3339, older
    /// ones a plain `YYYY-MM-DD` date.
    fn parse_sold_at(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
        None
    }

    /// Convert an archive sale to a `RawSaleRecord`, dropping records too
    /// malformed to price (missing price, unknown currency, bad date).
    fn to_sale_record(sale: ArchiveSale) -> Option<RawSaleRecord> {
        let price = match sale.price {
            Some(p) if p > Decimal::ZERO => p,
            _ => {
                debug!(sale_id = %sale.sale_id, "archive sale has no usable price, skipping");
                return None;
            }
        };
        let currency = match sale.currency.parse() {
            Ok(c) => c,
            Err(_) => {
                debug!(
                    sale_id = %sale.sale_id,
                    currency = %sale.currency,
                    "archive sale has unknown currency, skipping",
                );
                return None;
            }
        };
        let sold_at = match Self::parse_sold_at(&sale.sold_at) {
            Some(dt) => dt,
            None => {
                debug!(sale_id = %sale.sale_id, raw = %sale.sold_at, "unparseable sale date, skipping");
                return None;
            }
        };

        Some(RawSaleRecord {
            source_id: sale.sale_id,
            title: sale.title,
            price,
            currency,
            sold_at,
            condition_text: sale.condition_text,
        })
    }
}

// ---------------------------------------------------------------------------
// PriceLookup trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PriceLookup for SalesArchiveClient {
    async fn search_sales(
        &self,
        identity: &CardIdentity,
        window_days: u32,
    ) -> Result<Vec<RawSaleRecord>> {
        let query = identity.normalized();
        let url = format!(
            "{}/v1/sales?query={}&days={}",
            self.base_url,
            urlencoding::encode(&query),
            window_days,
        );

        debug!(url = %url, "Fetching archive sales");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Sales archive request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sales archive error {status}: {body}");
        }

        let parsed: ArchiveResponse = resp
            .json()
            .await
            .context("Failed to parse sales archive response")?;

        let total = parsed.sales.len();
        let records: Vec<RawSaleRecord> = parsed
            .sales
            .into_iter()
            .filter_map(Self::to_sale_record)
            .collect();

        if records.len() < total {
            warn!(
                dropped = total - records.len(),
                kept = records.len(),
                query = %query,
                "archive returned malformed sale records",
            );
        }
        debug!(count = records.len(), query = %query, "archive sales fetched");

        Ok(records)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Currency;
    use chrono::Datelike;
    use rust_decimal_macros::dec;

    fn make_sale(price: Option<Decimal>, currency: &str, sold_at: &str) -> ArchiveSale {
        ArchiveSale {
            sale_id: "sale-1".to_string(),
            title: "monkey d. luffy op05-119 alt art".to_string(),
            price,
            currency: currency.to_string(),
            sold_at: sold_at.to_string(),
            condition_text: "PSA 10".to_string(),
        }
    }

    #[test]
    fn test_parse_response_json() {
        let json = r#"{
            "sales": [
                {
                    "saleId": "a1",
                    "title": "Luffy OP05-119",
                    "price": 88.5,
                    "currency": "USD",
                    "soldAt": "2026-07-01T12:30:00Z",
                    "conditionText": "PSA 9"
                },
                { "saleId": "a2", "title": "junk", "currency": "USD", "soldAt": "" }
            ]
        }"#;
        let parsed: ArchiveResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.sales.len(), 2);
        assert_eq!(parsed.sales[0].sale_id, "a1");
        assert_eq!(parsed.sales[0].price, Some(dec!(88.5)));
        assert!(parsed.sales[1].price.is_none());
    }

    #[test]
    fn test_parse_empty_response() {
        let parsed: ArchiveResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.sales.is_empty());
    }

    #[test]
    fn test_parse_sold_at_rfc3339() {
        let dt = SalesArchiveClient::parse_sold_at("2026-07-01T12:30:00Z").unwrap();
        assert_eq!(dt.year(), 2026);
        assert_eq!(dt.month(), 7);
    }

    #[test]
    fn test_parse_sold_at_plain_date() {
        let dt = SalesArchiveClient::parse_sold_at("2026-06-15").unwrap();
        assert_eq!(dt.day(), 15);
    }

    #[test]
    fn test_parse_sold_at_garbage() {
        assert!(SalesArchiveClient::parse_sold_at("last tuesday").is_none());
        assert!(SalesArchiveClient::parse_sold_at("").is_none());
    }

    #[test]
    fn test_to_sale_record_ok() {
        let record =
            SalesArchiveClient::to_sale_record(make_sale(Some(dec!(120)), "USD", "2026-06-15"))
                .unwrap();
        assert_eq!(record.price, dec!(120));
        assert_eq!(record.currency, Currency::Usd);
        assert_eq!(record.condition_text, "PSA 10");
    }

    #[test]
    fn test_to_sale_record_drops_missing_price() {
        assert!(SalesArchiveClient::to_sale_record(make_sale(None, "USD", "2026-06-15")).is_none());
        assert!(
            SalesArchiveClient::to_sale_record(make_sale(Some(Decimal::ZERO), "USD", "2026-06-15"))
                .is_none()
        );
    }

    #[test]
    fn test_to_sale_record_drops_unknown_currency() {
        assert!(
            SalesArchiveClient::to_sale_record(make_sale(Some(dec!(50)), "GBP", "2026-06-15"))
                .is_none()
        );
    }

    #[test]
    fn test_to_sale_record_drops_bad_date() {
        assert!(
            SalesArchiveClient::to_sale_record(make_sale(Some(dec!(50)), "USD", "whenever"))
                .is_none()
        );
    }

    #[test]
    fn test_client_construction() {
        let client = SalesArchiveClient::new(&LookupConfig::default()).unwrap();
        assert_eq!(client.name(), "sales-archive");
        assert!(!client.base_url.ends_with('/'));
    }
}
