//! Decision engine.
//!
//! Joins a listing's condition assessment with the bucket estimates,
//! builds the full acquisition cost, and classifies the opportunity:
//! profitable, rejected, or insufficient data. Every verdict carries
//! its rationale so a reviewer can audit why a listing was flagged.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::{FeeConfig, PricingConfig};
use crate::types::{
    ConditionAssessment, ConditionBucket, ConfidenceTier, CostBreakdown, Currency, Decision, Grade,
    Listing, PriceEstimate, ValuationResult,
};

// ---------------------------------------------------------------------------
// Bucket selection
// ---------------------------------------------------------------------------

/// Value-order position of a bucket, used to pick the nearest available
/// estimate when the target bucket has no data.
fn ladder_position(bucket: ConditionBucket) -> u8 {
    match bucket {
        ConditionBucket::Raw => 0,
        ConditionBucket::Bgs9 => 1,
        ConditionBucket::Psa9 => 2,
        ConditionBucket::Bgs95 => 3,
        ConditionBucket::Psa10 => 4,
    }
}

// ---------------------------------------------------------------------------
// Decision engine
// ---------------------------------------------------------------------------

pub struct DecisionEngine {
    pricing: PricingConfig,
    fees: FeeConfig,
    /// Whether acquisitions target a grading submission.
    include_grading: bool,
}

impl DecisionEngine {
    pub fn new(pricing: PricingConfig, fees: FeeConfig, include_grading: bool) -> Self {
        Self {
            pricing,
            fees,
            include_grading,
        }
    }

    /// Classify one listing given its assessment and bucket estimates.
    ///
    /// Total function: every input combination maps to a verdict, and
    /// identical inputs always reproduce the identical result.
    pub fn decide(
        &self,
        listing: &Listing,
        assessment: &ConditionAssessment,
        estimates: &BTreeMap<ConditionBucket, PriceEstimate>,
    ) -> ValuationResult {
        let mut rationale: Vec<String> = assessment
            .signals
            .iter()
            .map(|s| format!("signal {s}"))
            .collect();

        let grading = self.grading_applies(&assessment.grade);
        let target = if grading {
            rationale.push("targeting PSA 9 resale after grading submission".to_string());
            ConditionBucket::Psa9
        } else {
            if self.include_grading {
                rationale.push(format!(
                    "grading skipped: {} is below near-mint",
                    assessment.grade,
                ));
            }
            ConditionBucket::Raw
        };

        let cost = self.cost_for(listing, grading);
        let total_cost = cost.total();
        let selected = self.select_estimate(target, estimates, &mut rationale);

        let mut result = ValuationResult {
            listing_id: listing.id.clone(),
            title: listing.title.clone(),
            url: listing.url.clone(),
            grade: assessment.grade,
            assessment_confidence: assessment.confidence,
            conflicted: assessment.conflicted,
            bucket_used: selected.as_ref().map(|e| e.bucket),
            cost,
            total_cost_usd: total_cost,
            resale_estimate_usd: selected.as_ref().map(|e| e.price),
            profit_usd: selected.as_ref().map(|e| e.price - total_cost),
            roi: None,
            sample_count: selected.as_ref().map_or(0, |e| e.sample_count),
            trend: selected.as_ref().map(|e| e.trend),
            decision: Decision::InsufficientData,
            rationale,
        };

        let estimate = match selected {
            Some(estimate) => estimate,
            None => {
                result
                    .rationale
                    .push("no comparable sales in any bucket".to_string());
                return result;
            }
        };

        if total_cost <= Decimal::ZERO {
            result
                .rationale
                .push("acquisition cost is not positive, cannot compute return".to_string());
            return result;
        }

        let roi = estimate.price / total_cost;
        result.roi = Some(roi);

        if assessment.grade == Grade::Unknown {
            result
                .rationale
                .push("condition could not be assessed from any signal".to_string());
            return result;
        }

        if assessment.conflicted {
            result
                .rationale
                .push("condition signals conflict, manual review needed".to_string());
            return result;
        }

        if estimate.tier == ConfidenceTier::Low {
            result.rationale.push(format!(
                "only {} comparable sale(s), below medium confidence",
                estimate.sample_count,
            ));
            return result;
        }

        if roi >= self.pricing.profit_threshold {
            result.decision = Decision::Profitable;
            result.rationale.push(format!(
                "ROI {roi:.2} meets threshold {:.2} at {} confidence",
                self.pricing.profit_threshold, estimate.tier,
            ));
        } else {
            result.decision = Decision::Rejected;
            result.rationale.push(format!(
                "ROI {roi:.2} below threshold {:.2}",
                self.pricing.profit_threshold,
            ));
        }

        debug!(
            listing_id = %listing.id,
            decision = %result.decision,
            roi = %roi,
            "listing classified",
        );

        result
    }

    /// Grading only pays off on cards likely to grade well.
    fn grading_applies(&self, grade: &Grade) -> bool {
        self.include_grading && grade.at_least(&Grade::NearMint)
    }

    /// Full acquisition cost in USD.
    fn cost_for(&self, listing: &Listing, grading: bool) -> CostBreakdown {
        let rate = self.pricing.jpy_to_usd;
        let item_price = listing.currency.to_usd(listing.price, rate);

        CostBreakdown {
            item_price,
            service_fee: item_price * self.fees.service_pct,
            payment_fee: item_price * self.fees.payment_pct,
            shipping: Currency::Jpy.to_usd(self.fees.shipping_flat_jpy, rate),
            grading: if grading {
                self.fees.grading_fee_usd
            } else {
                Decimal::ZERO
            },
        }
    }

    /// The target bucket's estimate, or the nearest available one with a
    /// note explaining the substitution.
    fn select_estimate(
        &self,
        target: ConditionBucket,
        estimates: &BTreeMap<ConditionBucket, PriceEstimate>,
        rationale: &mut Vec<String>,
    ) -> Option<PriceEstimate> {
        if let Some(estimate) = estimates.get(&target) {
            return Some(estimate.clone());
        }

        let target_pos = ladder_position(target);
        let nearest = estimates
            .keys()
            .min_by_key(|b| {
                // Ties resolve toward the cheaper bucket.
                (ladder_position(**b).abs_diff(target_pos), ladder_position(**b))
            })
            .copied()?;

        rationale.push(format!(
            "no comparables in {target} bucket, using nearest bucket {nearest}",
        ));
        estimates.get(&nearest).cloned()
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Order results best-first: ROI, then absolute profit, then assessment
/// confidence. Listings without numbers sink to the bottom.
pub fn rank_results(results: &mut [ValuationResult]) {
    results.sort_by(|a, b| {
        b.roi
            .cmp(&a.roi)
            .then_with(|| b.profit_usd.cmp(&a.profit_usd))
            .then_with(|| b.assessment_confidence.total_cmp(&a.assessment_confidence))
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
