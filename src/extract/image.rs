//! Image-based condition extractor.
//!
//! Sends listing photos to the defect-scan service and converts the
//! returned defect report into a condition signal. The remote call is
//! bounded by the retry policy; any failure or inconclusive scan means
//! the extractor simply contributes nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SignalExtractor;
use crate::config::RetryConfig;
use crate::retry::with_retry;
use crate::types::{ConditionSignal, Grade, Listing, SignalSource};
use crate::vision::{DefectReport, ImageAnalyzer};

/// Centering problems read as less severe than edge or surface damage.
const CENTERING_WEIGHT: f64 = 0.5;

/// Scans below this certainty are treated as inconclusive.
const MIN_CERTAINTY: f64 = 0.2;

// Severity bands, worst observed defect mapped onto the grade ladder.
const NEAR_MINT_MAX: f64 = 0.10;
const EXCELLENT_MAX: f64 = 0.25;
const GOOD_MAX: f64 = 0.45;
const PLAYED_MAX: f64 = 0.65;

/// Overall severity is the worst defect, with centering discounted.
fn severity(report: &DefectReport) -> f64 {
    report
        .edge_wear
        .max(report.surface_damage)
        .max(report.centering_offset * CENTERING_WEIGHT)
}

fn grade_for_severity(severity: f64) -> Grade {
    if severity < NEAR_MINT_MAX {
        Grade::NearMint
    } else if severity < EXCELLENT_MAX {
        Grade::Excellent
    } else if severity < GOOD_MAX {
        Grade::Good
    } else if severity < PLAYED_MAX {
        Grade::Played
    } else {
        Grade::Poor
    }
}

/// More photos mean better coverage of the card, so single-image scans
/// are discounted.
fn image_count_factor(count: usize) -> f64 {
    match count {
        0 => 0.0,
        1 => 0.7,
        2 => 0.85,
        _ => 1.0,
    }
}

pub struct ImageExtractor {
    analyzer: Arc<dyn ImageAnalyzer>,
    retry: RetryConfig,
    timeout: Duration,
}

impl ImageExtractor {
    pub fn new(analyzer: Arc<dyn ImageAnalyzer>, retry: RetryConfig, timeout: Duration) -> Self {
        Self {
            analyzer,
            retry,
            timeout,
        }
    }
}

#[async_trait]
impl SignalExtractor for ImageExtractor {
    async fn observe(&self, listing: &Listing) -> Option<ConditionSignal> {
        if !listing.has_images() {
            return None;
        }

        let report = match with_retry(&self.retry, self.timeout, "image analysis", || {
            self.analyzer.analyze(&listing.image_urls)
        })
        .await
        {
            Ok(report) => report,
            Err(err) => {
                warn!(
                    listing_id = %listing.id,
                    provider = self.analyzer.name(),
                    error = %err,
                    "image analysis unavailable, skipping signal",
                );
                return None;
            }
        };

        if !report.is_conclusive() || report.certainty < MIN_CERTAINTY {
            debug!(
                listing_id = %listing.id,
                certainty = report.certainty,
                images = report.images_analyzed,
                "inconclusive defect scan",
            );
            return None;
        }

        let severity = severity(&report);
        let grade = grade_for_severity(severity);
        let confidence = report.certainty * image_count_factor(report.images_analyzed);

        debug!(
            listing_id = %listing.id,
            severity,
            ?grade,
            confidence,
            "defect scan signal",
        );

        Some(ConditionSignal::new(
            SignalSource::Image,
            grade,
            confidence,
            format!(
                "defect scan: edge {:.2}, surface {:.2}, centering {:.2} over {} image(s)",
                report.edge_wear, report.surface_damage, report.centering_offset, report.images_analyzed,
            ),
        ))
    }

    fn source(&self) -> SignalSource {
        SignalSource::Image
    }
}
