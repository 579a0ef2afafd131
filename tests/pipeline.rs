//! End-to-end pipeline tests.
//!
//! Drives the full valuation engine (extract, fuse, match, aggregate,
//! decide) against scripted collaborators with no network access.
//! Listings and sale histories are fully controllable from test code,
//! so every verdict asserted here is deterministic.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use arbiter::config::AppConfig;
use arbiter::engine::ValuationEngine;
use arbiter::lookup::{PriceLookup, RawSaleRecord};
use arbiter::types::*;
use arbiter::vision::{DefectReport, ImageAnalyzer};

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

/// A scripted sale-history source for deterministic testing.
///
/// Responses are keyed by normalized card identity; identities with no
/// entry get an empty history. All state is in-memory.
struct ScriptedLookup {
    responses: HashMap<String, Vec<RawSaleRecord>>,
    fetches: AtomicUsize,
    /// If set, all queries will return this error.
    force_error: Mutex<Option<String>>,
}

impl ScriptedLookup {
    fn new(responses: HashMap<String, Vec<RawSaleRecord>>) -> Self {
        Self {
            responses,
            fetches: AtomicUsize::new(0),
            force_error: Mutex::new(None),
        }
    }

    /// Force all subsequent queries to return an error.
    fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    /// Number of queries that reached this source (cache misses).
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceLookup for ScriptedLookup {
    async fn search_sales(
        &self,
        identity: &CardIdentity,
        _window_days: u32,
    ) -> Result<Vec<RawSaleRecord>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.force_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        Ok(self
            .responses
            .get(&identity.normalized())
            .cloned()
            .unwrap_or_default())
    }

    fn name(&self) -> &str {
        "scripted-archive"
    }
}

/// A scripted defect-scan service that returns one fixed report.
struct ScriptedAnalyzer {
    report: DefectReport,
}

impl ScriptedAnalyzer {
    fn new(report: DefectReport) -> Self {
        Self { report }
    }
}

#[async_trait]
impl ImageAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, _image_urls: &[String]) -> Result<DefectReport> {
        Ok(self.report.clone())
    }

    fn name(&self) -> &str {
        "scripted-scan"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A scan consistent with a clean, well-kept card.
fn clean_scan() -> DefectReport {
    DefectReport {
        edge_wear: 0.02,
        surface_damage: 0.02,
        centering_offset: 0.05,
        certainty: 0.9,
        images_analyzed: 3,
    }
}

/// A scan showing heavy edge and surface damage.
fn damaged_scan() -> DefectReport {
    DefectReport {
        edge_wear: 0.9,
        surface_damage: 0.85,
        centering_offset: 0.3,
        certainty: 0.7,
        images_analyzed: 3,
    }
}

fn card(name: &str, set_code: &str, number: &str) -> CardIdentity {
    CardIdentity {
        name: name.to_string(),
        set_code: Some(set_code.to_string()),
        number: Some(number.to_string()),
        language: Some("JP".to_string()),
    }
}

/// A proxy-bid listing whose text and rank both read near mint.
fn listing(id: &str, identity: CardIdentity, price_jpy: Decimal) -> Listing {
    Listing {
        id: id.to_string(),
        title: format!("ワンピースカード {} SR 美品", identity.name),
        description: "目立った傷なし。【ランク】A".to_string(),
        price: price_jpy,
        currency: Currency::Jpy,
        image_urls: vec![
            format!("https://img.example.com/{id}/1.jpg"),
            format!("https://img.example.com/{id}/2.jpg"),
            format!("https://img.example.com/{id}/3.jpg"),
        ],
        rank_code: Some("A".to_string()),
        identity,
        scraped_at: Utc::now(),
        url: format!("https://auctions.example.co.jp/{id}"),
    }
}

/// Raw-card sale records at a single USD price, spread over the window.
fn sales(title: &str, count: usize, price: Decimal) -> Vec<RawSaleRecord> {
    (0..count)
        .map(|i| RawSaleRecord {
            source_id: format!("sale-{i}"),
            title: title.to_string(),
            price,
            currency: Currency::Usd,
            sold_at: Utc::now() - Duration::days(3 + i as i64 * 10),
            condition_text: "near mint".to_string(),
        })
        .collect()
}

/// Default config with a unit JPY rate and fast retries.
///
/// At this rate the test listing at 2000 JPY lands on an exactly known
/// landed cost: 2000 item + 100 service + 70 payment + 330 shipping
/// = $2500.
fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.pricing.jpy_to_usd = Decimal::ONE;
    cfg.fees.shipping_flat_jpy = Decimal::new(330, 0);
    cfg.retry.max_attempts = 1;
    cfg.retry.base_delay_ms = 1;
    cfg.retry.max_delay_ms = 1;
    cfg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter::engine::decision::rank_results;
    use arbiter::storage;
    use rust_decimal_macros::dec;

    fn luffy() -> CardIdentity {
        card("Monkey D. Luffy", "OP05", "119")
    }

    fn luffy_sales(count: usize, price: Decimal) -> Vec<RawSaleRecord> {
        sales("Monkey D Luffy OP05-119 One Piece", count, price)
    }

    fn engine_with(
        responses: HashMap<String, Vec<RawSaleRecord>>,
        scan: DefectReport,
    ) -> (ValuationEngine, Arc<ScriptedLookup>) {
        let lookup = Arc::new(ScriptedLookup::new(responses));
        let engine = ValuationEngine::new(
            &test_config(),
            lookup.clone(),
            Arc::new(ScriptedAnalyzer::new(scan)),
        );
        (engine, lookup)
    }

    #[tokio::test]
    async fn test_profitable_flip_end_to_end() {
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        let (engine, _) = engine_with(responses, clean_scan());

        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);

        assert_eq!(result.decision, Decision::Profitable);
        assert_eq!(result.grade, Grade::NearMint);
        assert!(!result.conflicted);
        assert!((result.assessment_confidence - 0.9).abs() < 1e-9);
        assert_eq!(result.bucket_used, Some(ConditionBucket::Raw));
        assert_eq!(result.total_cost_usd, dec!(2500));
        assert_eq!(result.resale_estimate_usd, Some(dec!(6000)));
        assert_eq!(result.profit_usd, Some(dec!(3500)));
        assert_eq!(result.roi, Some(dec!(2.4)));
        assert_eq!(result.sample_count, 8);
        assert_eq!(result.trend, Some(TrendDirection::Flat));
    }

    #[tokio::test]
    async fn test_thin_margin_rejected() {
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(4500)));
        let (engine, _) = engine_with(responses, clean_scan());

        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);

        assert_eq!(result.decision, Decision::Rejected);
        assert_eq!(result.roi, Some(dec!(1.8)));
        assert!(result
            .rationale
            .iter()
            .any(|note| note.contains("below threshold")));
    }

    #[tokio::test]
    async fn test_single_comp_is_insufficient() {
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(1, dec!(6000)));
        let (engine, _) = engine_with(responses, clean_scan());

        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);

        assert_eq!(result.decision, Decision::InsufficientData);
        assert_eq!(result.sample_count, 1);
        assert!(result
            .rationale
            .iter()
            .any(|note| note.contains("below medium confidence")));
    }

    #[tokio::test]
    async fn test_conflicting_signals_need_manual_review() {
        // Text and rank say near mint; the photos show heavy damage.
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        let (engine, _) = engine_with(responses, damaged_scan());

        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);

        assert!(result.conflicted);
        assert_eq!(result.grade, Grade::Poor);
        assert_eq!(result.decision, Decision::InsufficientData);
        assert!(result.rationale.iter().any(|note| note.contains("conflict")));
    }

    #[tokio::test]
    async fn test_lookup_outage_degrades_not_fails() {
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        let (engine, lookup) = engine_with(responses, clean_scan());

        lookup.set_error("archive returned 503");
        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);

        assert_eq!(result.decision, Decision::InsufficientData);
        assert!(result.resale_estimate_usd.is_none());
        assert!(result
            .rationale
            .iter()
            .any(|note| note.contains("no comparable sales")));

        // Failures are not cached: once the source recovers, the next
        // evaluation of the same card queries it again and succeeds.
        lookup.clear_error();
        let result = engine
            .evaluate_all(vec![listing("lst-a", luffy(), dec!(2000))])
            .await
            .remove(0);
        assert_eq!(result.decision, Decision::Profitable);
        assert_eq!(lookup.fetches(), 2);
    }

    #[tokio::test]
    async fn test_batch_keeps_input_order_and_shares_cache() {
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        let (engine, lookup) = engine_with(responses, clean_scan());

        let batch = vec![
            listing("lst-a", luffy(), dec!(2000)),
            listing("lst-b", luffy(), dec!(4000)),
            listing("lst-c", luffy(), dec!(8000)),
        ];
        let results = engine.evaluate_all(batch).await;

        assert_eq!(results.len(), 3);
        let ids: Vec<&str> = results.iter().map(|r| r.listing_id.as_str()).collect();
        assert_eq!(ids, vec!["lst-a", "lst-b", "lst-c"]);
        // One identity, one fetch; the batch shares the cached comps.
        assert_eq!(lookup.fetches(), 1);
    }

    #[tokio::test]
    async fn test_rerun_reproduces_identical_results() {
        let zoro = card("Roronoa Zoro", "OP01", "025");
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        responses.insert(
            zoro.normalized(),
            sales("Roronoa Zoro OP01-025 One Piece", 5, dec!(3200)),
        );
        let (engine, _) = engine_with(responses, clean_scan());

        let batch = vec![
            listing("lst-a", luffy(), dec!(2000)),
            listing("lst-b", zoro, dec!(2000)),
        ];

        let first = engine.evaluate_all(batch.clone()).await;
        let second = engine.evaluate_all(batch).await;

        let first_json = serde_json::to_string(&first).unwrap();
        let second_json = serde_json::to_string(&second).unwrap();
        assert_eq!(first_json, second_json);
    }

    #[tokio::test]
    async fn test_ranked_report_roundtrip() {
        let zoro = card("Roronoa Zoro", "OP01", "025");
        let nami = card("Nami", "OP03", "040");
        let mut responses = HashMap::new();
        responses.insert(luffy().normalized(), luffy_sales(8, dec!(6000)));
        responses.insert(
            zoro.normalized(),
            sales("Roronoa Zoro OP01-025 One Piece", 8, dec!(4500)),
        );
        responses.insert(
            nami.normalized(),
            sales("Nami OP03-040 One Piece", 1, dec!(3000)),
        );
        let (engine, _) = engine_with(responses, clean_scan());

        let batch = vec![
            listing("lst-nami", nami, dec!(2000)),
            listing("lst-zoro", zoro, dec!(2000)),
            listing("lst-luffy", luffy(), dec!(2000)),
        ];
        let mut results = engine.evaluate_all(batch).await;
        rank_results(&mut results);

        // Best ROI first regardless of input order.
        assert_eq!(results[0].listing_id, "lst-luffy");
        assert_eq!(results[0].decision, Decision::Profitable);

        let report =
            RunReport::from_results(uuid::Uuid::new_v4(), Utc::now(), Utc::now(), results);
        assert_eq!(report.listings_evaluated, 3);
        assert_eq!(report.profitable, 1);
        assert_eq!(report.rejected, 1);
        assert_eq!(report.insufficient_data, 1);

        let mut path = std::env::temp_dir();
        path.push(format!("arbiter_pipeline_{}.json", report.run_id));
        let path = path.to_string_lossy().to_string();

        storage::save_report(&report, &path).unwrap();
        let loaded = storage::load_report(&path).unwrap().unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.profitable, 1);
        assert_eq!(loaded.results.len(), 3);
        storage::delete_report(&path).unwrap();
    }
}
