//! Price-lookup collaborator integration.
//!
//! Defines the `PriceLookup` trait over historical sale-record sources
//! and provides the sales-archive HTTP implementation. The matcher only
//! sees the trait; tests substitute scripted lookups.

pub mod archive;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::types::{CardIdentity, Currency};

/// One raw sale record as returned by a lookup source, before similarity
/// scoring and bucket classification.
#[derive(Debug, Clone)]
pub struct RawSaleRecord {
    /// Identifier of the sale at the source.
    pub source_id: String,
    /// Identity string the source lists the sale under.
    pub title: String,
    pub price: Decimal,
    pub currency: Currency,
    pub sold_at: DateTime<Utc>,
    /// Free-form condition text ("PSA 10", "near mint", ...).
    pub condition_text: String,
}

/// Abstraction over historical sale-price sources.
///
/// Implementors answer identity queries with raw sale records inside the
/// requested time window. An empty result is valid "no data", not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Fetch sale records for a card identity within `window_days`.
    async fn search_sales(
        &self,
        identity: &CardIdentity,
        window_days: u32,
    ) -> Result<Vec<RawSaleRecord>>;

    /// Source name for logging and identification.
    fn name(&self) -> &str;
}
