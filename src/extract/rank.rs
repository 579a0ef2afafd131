//! Seller-rank condition extractor.
//!
//! Japanese auction houses let sellers declare a structured rank code
//! (the 【ランク】 field). Declared ranks are more reliable than
//! inferred condition text, so they map through a fixed table with a
//! high fixed confidence. Unrecognized codes emit nothing.

use async_trait::async_trait;
use tracing::debug;

use super::SignalExtractor;
use crate::types::{ConditionSignal, Grade, Listing, SignalSource};

/// Declared ranks carry more weight than inferred signals.
const RANK_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Default)]
pub struct RankExtractor;

impl RankExtractor {
    pub fn new() -> Self {
        RankExtractor
    }

    /// Fixed seller-rank table.
    fn grade_for_rank(code: &str) -> Option<Grade> {
        match code.trim().to_uppercase().as_str() {
            "S" => Some(Grade::Mint),
            "A" => Some(Grade::NearMint),
            "B" => Some(Grade::Excellent),
            "C" => Some(Grade::Good),
            "D" => Some(Grade::Played),
            "E" => Some(Grade::Poor),
            _ => None,
        }
    }
}

#[async_trait]
impl SignalExtractor for RankExtractor {
    async fn observe(&self, listing: &Listing) -> Option<ConditionSignal> {
        let code = listing.rank_code.as_deref()?;
        let grade = match Self::grade_for_rank(code) {
            Some(g) => g,
            None => {
                debug!(listing_id = %listing.id, code = %code, "unrecognized seller rank");
                return None;
            }
        };

        Some(ConditionSignal::new(
            SignalSource::Rank,
            grade,
            RANK_CONFIDENCE,
            format!("seller rank {}", code.trim().to_uppercase()),
        ))
    }

    fn source(&self) -> SignalSource {
        SignalSource::Rank
    }
}
