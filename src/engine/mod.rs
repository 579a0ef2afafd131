//! Core engine: runs listings through extraction, fusion, comparable
//! matching, price aggregation, and the final decision.

pub mod aggregator;
pub mod decision;
pub mod fusion;
pub mod matcher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::extract::image::ImageExtractor;
use crate::extract::rank::RankExtractor;
use crate::extract::text::TextExtractor;
use crate::extract::SignalExtractor;
use crate::lookup::PriceLookup;
use crate::types::{ConditionSignal, Listing, ValuationResult};
use crate::vision::ImageAnalyzer;

use aggregator::PriceAggregator;
use decision::DecisionEngine;
use matcher::ComparableMatcher;

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared cancellation flag. Once raised, no new evaluation starts;
/// in-flight evaluations run to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Valuation engine
// ---------------------------------------------------------------------------

/// Wires the extractors, matcher, aggregator, and decision engine into
/// one pipeline and runs it over a listing batch with bounded
/// concurrency.
pub struct ValuationEngine {
    extractors: Vec<Arc<dyn SignalExtractor>>,
    matcher: ComparableMatcher,
    aggregator: PriceAggregator,
    decision: DecisionEngine,
    concurrency: usize,
    cancel: CancelFlag,
}

impl ValuationEngine {
    pub fn new(
        config: &AppConfig,
        lookup: Arc<dyn PriceLookup>,
        analyzer: Arc<dyn ImageAnalyzer>,
    ) -> Self {
        let extractors: Vec<Arc<dyn SignalExtractor>> = vec![
            Arc::new(TextExtractor::new()),
            Arc::new(RankExtractor::new()),
            Arc::new(ImageExtractor::new(
                analyzer,
                config.retry.clone(),
                Duration::from_secs(config.vision.timeout_secs),
            )),
        ];

        let matcher = ComparableMatcher::new(
            lookup,
            config.matcher.clone(),
            config.retry.clone(),
            Duration::from_secs(config.lookup.timeout_secs),
        );

        Self {
            extractors,
            matcher,
            aggregator: PriceAggregator::new(config.pricing.clone()),
            decision: DecisionEngine::new(
                config.pricing.clone(),
                config.fees.clone(),
                config.engine.include_grading,
            ),
            concurrency: config.engine.concurrency.max(1),
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for requesting run cancellation from outside the engine.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Evaluate one listing end to end.
    ///
    /// Never returns an error: per-listing faults (a failed extractor,
    /// a lookup outage) degrade into the verdict, so every listing
    /// yields exactly one result.
    pub async fn evaluate(&self, listing: &Listing) -> ValuationResult {
        debug!(listing_id = %listing.id, title = %listing.title, "evaluating listing");

        let observations =
            futures::future::join_all(self.extractors.iter().map(|e| e.observe(listing))).await;
        let signals: Vec<ConditionSignal> = observations.into_iter().flatten().collect();

        let assessment = fusion::fuse(signals);
        let comps = self.matcher.comparables(&listing.identity).await;
        let estimates = self.aggregator.estimate_all(&comps, Utc::now());

        self.decision.decide(listing, &assessment, &estimates)
    }

    /// Evaluate a batch with bounded concurrency, preserving input order.
    pub async fn evaluate_all(&self, listings: Vec<Listing>) -> Vec<ValuationResult> {
        let total = listings.len();
        info!(total, concurrency = self.concurrency, "starting evaluation run");

        self.matcher.evict_expired().await;

        let cancel = self.cancel.clone();
        let results: Vec<ValuationResult> = stream::iter(listings)
            .take_while(|listing| {
                let keep_going = !cancel.is_cancelled();
                if !keep_going {
                    info!(
                        listing_id = %listing.id,
                        "cancellation requested, no further listings will start",
                    );
                }
                futures::future::ready(keep_going)
            })
            .map(|listing| async move { self.evaluate(&listing).await })
            .buffered(self.concurrency)
            .collect()
            .await;

        info!(
            evaluated = results.len(),
            skipped = total - results.len(),
            cache_hits = self.matcher.cache_hits(),
            cache_misses = self.matcher.cache_misses(),
            "evaluation run complete",
        );

        results
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
