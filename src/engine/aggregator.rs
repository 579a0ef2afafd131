//! Price aggregation.
//!
//! Turns a bucket of comparable samples into a single robust estimate:
//! convert to USD, reject outliers by median absolute deviation, take
//! the median of the survivors, and classify the recent trend. Sample
//! count maps to a confidence tier that gates downstream decisions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::matcher::CompsByBucket;
use crate::config::PricingConfig;
use crate::types::{ComparableSample, ConditionBucket, ConfidenceTier, PriceEstimate, TrendDirection};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Horizon the trend slope is projected over, in days.
const TREND_HORIZON_DAYS: f64 = 30.0;

/// Projected relative move below this magnitude reads as flat.
const TREND_EPSILON: f64 = 0.02;

/// Fewer samples than this cannot support a trend call.
const MIN_TREND_SAMPLES: usize = 3;

/// Sales clustered inside this span carry no date signal.
const MIN_TREND_SPAN_DAYS: f64 = 7.0;

/// Recency weighting scale: a sale this many days old counts half.
const RECENCY_SCALE_DAYS: f64 = 30.0;

// ---------------------------------------------------------------------------
// Statistics helpers
// ---------------------------------------------------------------------------

/// Median of a value set. Even-length sets average the two middles.
fn median(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / dec!(2))
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation around `center`.
fn mad(values: &[Decimal], center: Decimal) -> Option<Decimal> {
    let deviations: Vec<Decimal> = values.iter().map(|v| (*v - center).abs()).collect();
    median(&deviations)
}

/// Direction of the date-weighted price trend across surviving sales.
///
/// Fits a recency-weighted least-squares line through (sale age, price),
/// projects the slope over [`TREND_HORIZON_DAYS`], and compares the move
/// against the median. Too few samples, too narrow a date span, or a
/// move inside [`TREND_EPSILON`] all read as flat.
fn trend_direction(
    sales: &[(Decimal, DateTime<Utc>)],
    median_price: Decimal,
    now: DateTime<Utc>,
) -> TrendDirection {
    if sales.len() < MIN_TREND_SAMPLES {
        return TrendDirection::Flat;
    }

    let median_f = median_price.to_f64().unwrap_or(0.0);
    if median_f <= 0.0 {
        return TrendDirection::Flat;
    }

    // x is negative age in days, so a positive slope means prices are
    // higher toward today. Recent sales weigh more.
    let points: Vec<(f64, f64, f64)> = sales
        .iter()
        .map(|(price, sold_at)| {
            let age = ((now - *sold_at).num_hours() as f64 / 24.0).max(0.0);
            let x = -age;
            let weight = 1.0 / (1.0 + age / RECENCY_SCALE_DAYS);
            let y = price.to_f64().unwrap_or(0.0);
            (x, y, weight)
        })
        .collect();

    let min_x = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    if max_x - min_x < MIN_TREND_SPAN_DAYS {
        return TrendDirection::Flat;
    }

    let w_sum: f64 = points.iter().map(|p| p.2).sum();
    let x_mean = points.iter().map(|p| p.0 * p.2).sum::<f64>() / w_sum;
    let y_mean = points.iter().map(|p| p.1 * p.2).sum::<f64>() / w_sum;

    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y, w) in &points {
        num += w * (x - x_mean) * (y - y_mean);
        den += w * (x - x_mean).powi(2);
    }
    if den <= f64::EPSILON {
        return TrendDirection::Flat;
    }

    let slope = num / den; // USD per day
    let relative_move = slope * TREND_HORIZON_DAYS / median_f;

    if relative_move > TREND_EPSILON {
        TrendDirection::Rising
    } else if relative_move < -TREND_EPSILON {
        TrendDirection::Falling
    } else {
        TrendDirection::Flat
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct PriceAggregator {
    config: PricingConfig,
}

impl PriceAggregator {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Estimate the resale price for one bucket of comparables.
    ///
    /// Returns `None` when no sample survives, which downstream treats
    /// as "no estimate" rather than an error.
    pub fn estimate(
        &self,
        bucket: ConditionBucket,
        samples: &[ComparableSample],
        now: DateTime<Utc>,
    ) -> Option<PriceEstimate> {
        let priced: Vec<(Decimal, DateTime<Utc>)> = samples
            .iter()
            .map(|s| (s.price_usd(self.config.jpy_to_usd), s.sold_at))
            .filter(|(price, _)| *price > Decimal::ZERO)
            .collect();

        if priced.is_empty() {
            return None;
        }

        let prices: Vec<Decimal> = priced.iter().map(|(p, _)| *p).collect();
        let center = median(&prices)?;
        let spread = mad(&prices, center)?;

        // A zero MAD means at least half the samples sit on the median;
        // rejection would be arbitrary, so skip it.
        let survivors: Vec<(Decimal, DateTime<Utc>)> = if spread.is_zero() {
            priced
        } else {
            let limit = spread * self.config.mad_multiplier;
            priced
                .into_iter()
                .filter(|(price, _)| (*price - center).abs() <= limit)
                .collect()
        };

        let surviving_prices: Vec<Decimal> = survivors.iter().map(|(p, _)| *p).collect();
        let price = median(&surviving_prices)?;
        let sample_count = survivors.len();
        let tier = self.tier_for(sample_count);
        let trend = trend_direction(&survivors, price, now);

        debug!(
            %bucket,
            candidates = samples.len(),
            survivors = sample_count,
            price = %price,
            %tier,
            %trend,
            "bucket estimated",
        );

        Some(PriceEstimate {
            bucket,
            price,
            sample_count,
            tier,
            trend,
        })
    }

    /// Estimate every bucket that has comparables.
    pub fn estimate_all(
        &self,
        comps: &CompsByBucket,
        now: DateTime<Utc>,
    ) -> BTreeMap<ConditionBucket, PriceEstimate> {
        comps
            .iter()
            .filter_map(|(bucket, samples)| {
                self.estimate(*bucket, samples, now).map(|e| (*bucket, e))
            })
            .collect()
    }

    fn tier_for(&self, sample_count: usize) -> ConfidenceTier {
        if sample_count >= self.config.high_sample_threshold {
            ConfidenceTier::High
        } else if sample_count >= self.config.medium_sample_threshold {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
