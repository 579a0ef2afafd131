//! Shared types for the ARBITER valuation engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that extractor, matcher,
//! aggregator, and decision modules can depend on them without
//! circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Card identity & listing
// ---------------------------------------------------------------------------

/// Normalized identity of a collectible card, resolved by the scraping
/// collaborator from the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardIdentity {
    pub name: String,
    /// Set/edition code, e.g. "OP05".
    pub set_code: Option<String>,
    /// Collector number within the set, e.g. "119".
    pub number: Option<String>,
    /// Language variant, e.g. "JP".
    pub language: Option<String>,
}

impl CardIdentity {
    /// Canonical lowercase form used for cache keys and lookup queries.
    pub fn normalized(&self) -> String {
        let mut parts = vec![self.name.trim().to_lowercase()];
        if let Some(set) = &self.set_code {
            parts.push(set.trim().to_lowercase());
        }
        if let Some(num) = &self.number {
            parts.push(num.trim().to_lowercase());
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

impl fmt::Display for CardIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(set) = &self.set_code {
            write!(f, " [{set}")?;
            if let Some(num) = &self.number {
                write!(f, "-{num}")?;
            }
            write!(f, "]")?;
        }
        if let Some(lang) = &self.language {
            write!(f, " ({lang})")?;
        }
        Ok(())
    }
}

/// One scraped marketplace listing. Created by the external scraping
/// collaborator; never mutated by the valuation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Asking/current price in `currency`.
    pub price: Decimal,
    pub currency: Currency,
    pub image_urls: Vec<String>,
    /// Seller-declared rank code if the marketplace exposes one.
    pub rank_code: Option<String>,
    /// Card identity resolved by the scraper's text analysis.
    pub identity: CardIdentity,
    pub scraped_at: DateTime<Utc>,
    pub url: String,
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({} {} | {} imgs | {})",
            self.id,
            self.title,
            self.price,
            self.currency,
            self.image_urls.len(),
            self.identity,
        )
    }
}

impl Listing {
    /// Whether the listing carries any image references.
    pub fn has_images(&self) -> bool {
        !self.image_urls.is_empty()
    }

    /// Helper to build a test/sample listing with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Listing {
            id: "lst-001".to_string(),
            title: "ワンピースカード ルフィ SR 美品".to_string(),
            description: "目立った傷なし。【ランク】A".to_string(),
            price: Decimal::new(2000, 0),
            currency: Currency::Jpy,
            image_urls: vec!["https://img.example.com/lst-001/1.jpg".to_string()],
            rank_code: Some("A".to_string()),
            identity: CardIdentity {
                name: "Monkey D. Luffy".to_string(),
                set_code: Some("OP05".to_string()),
                number: Some("119".to_string()),
                language: Some("JP".to_string()),
            },
            scraped_at: Utc::now(),
            url: "https://auctions.example.co.jp/lst-001".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Currencies handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Jpy,
    Usd,
}

impl Currency {
    /// Convert an amount in this currency to USD using the supplied
    /// JPY-to-USD rate. USD amounts pass through unchanged.
    pub fn to_usd(&self, amount: Decimal, jpy_to_usd: Decimal) -> Decimal {
        match self {
            Currency::Jpy => amount * jpy_to_usd,
            Currency::Usd => amount,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::Jpy => write!(f, "JPY"),
            Currency::Usd => write!(f, "USD"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "JPY" | "YEN" | "¥" => Ok(Currency::Jpy),
            "USD" | "$" => Ok(Currency::Usd),
            _ => Err(anyhow::anyhow!("Unknown currency: {s}")),
        }
    }
}

/// Ordered condition grade bands, best to worst, plus `Unknown` for
/// listings where no signal could be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Grade {
    Mint,
    NearMint,
    Excellent,
    VeryGood,
    Good,
    LightPlayed,
    Played,
    HeavilyPlayed,
    Poor,
    Unknown,
}

impl Grade {
    /// All real bands in ladder order, best first. `Unknown` is not a band.
    pub const BANDS: &'static [Grade] = &[
        Grade::Mint,
        Grade::NearMint,
        Grade::Excellent,
        Grade::VeryGood,
        Grade::Good,
        Grade::LightPlayed,
        Grade::Played,
        Grade::HeavilyPlayed,
        Grade::Poor,
    ];

    /// Ladder position, higher is better. `Unknown` has no position.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Grade::Mint => Some(9),
            Grade::NearMint => Some(8),
            Grade::Excellent => Some(7),
            Grade::VeryGood => Some(6),
            Grade::Good => Some(5),
            Grade::LightPlayed => Some(4),
            Grade::Played => Some(3),
            Grade::HeavilyPlayed => Some(2),
            Grade::Poor => Some(1),
            Grade::Unknown => None,
        }
    }

    /// Band distance between two grades. `None` if either is `Unknown`.
    pub fn distance(&self, other: &Grade) -> Option<u8> {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => Some(a.abs_diff(b)),
            _ => None,
        }
    }

    /// Whether this grade is strictly worse (lower on the ladder) than
    /// the other. `Unknown` compares worse than any real band.
    pub fn is_worse_than(&self, other: &Grade) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a < b,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    /// Whether this grade is at least as good as the other.
    pub fn at_least(&self, other: &Grade) -> bool {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => a >= b,
            _ => false,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Mint => write!(f, "Mint"),
            Grade::NearMint => write!(f, "Near Mint"),
            Grade::Excellent => write!(f, "Excellent"),
            Grade::VeryGood => write!(f, "Very Good"),
            Grade::Good => write!(f, "Good"),
            Grade::LightPlayed => write!(f, "Light Played"),
            Grade::Played => write!(f, "Played"),
            Grade::HeavilyPlayed => write!(f, "Heavily Played"),
            Grade::Poor => write!(f, "Poor"),
            Grade::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Which extractor produced a condition signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    Text,
    Image,
    Rank,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalSource::Text => write!(f, "text"),
            SignalSource::Image => write!(f, "image"),
            SignalSource::Rank => write!(f, "rank"),
        }
    }
}

/// Grouping key for comparable sales: raw cards or graded-authority tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConditionBucket {
    Raw,
    Psa9,
    Psa10,
    Bgs9,
    Bgs95,
}

impl ConditionBucket {
    pub const ALL: &'static [ConditionBucket] = &[
        ConditionBucket::Raw,
        ConditionBucket::Psa9,
        ConditionBucket::Psa10,
        ConditionBucket::Bgs9,
        ConditionBucket::Bgs95,
    ];

    /// Classify a sale record's free-form condition text into a bucket.
    /// Anything that is not a recognized graded-authority tier is `Raw`.
    pub fn from_condition_text(text: &str) -> ConditionBucket {
        let t = text.to_lowercase().replace([' ', '-', '_'], "");
        if t.contains("psa10") {
            ConditionBucket::Psa10
        } else if t.contains("psa9") {
            ConditionBucket::Psa9
        } else if t.contains("bgs9.5") || t.contains("bgs95") {
            ConditionBucket::Bgs95
        } else if t.contains("bgs9") {
            ConditionBucket::Bgs9
        } else {
            ConditionBucket::Raw
        }
    }
}

impl fmt::Display for ConditionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionBucket::Raw => write!(f, "Raw"),
            ConditionBucket::Psa9 => write!(f, "PSA 9"),
            ConditionBucket::Psa10 => write!(f, "PSA 10"),
            ConditionBucket::Bgs9 => write!(f, "BGS 9"),
            ConditionBucket::Bgs95 => write!(f, "BGS 9.5"),
        }
    }
}

/// Price trend direction over the comparable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrendDirection {
    Rising,
    Flat,
    Falling,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Flat => write!(f, "flat"),
            TrendDirection::Falling => write!(f, "falling"),
        }
    }
}

/// Estimate confidence from surviving sample count. Ordered so that
/// tier comparisons read naturally (`tier >= Medium`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceTier::Low => write!(f, "low"),
            ConfidenceTier::Medium => write!(f, "medium"),
            ConfidenceTier::High => write!(f, "high"),
        }
    }
}

/// Final verdict for one listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    Profitable,
    Rejected,
    InsufficientData,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Profitable => write!(f, "PROFITABLE"),
            Decision::Rejected => write!(f, "REJECTED"),
            Decision::InsufficientData => write!(f, "INSUFFICIENT DATA"),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition signals & assessment
// ---------------------------------------------------------------------------

/// One condition observation from a single extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSignal {
    pub source: SignalSource,
    pub grade: Grade,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Free-form evidence note, e.g. the matched phrase.
    pub note: String,
}

impl ConditionSignal {
    /// Build a signal, clamping confidence into [0, 1].
    pub fn new(source: SignalSource, grade: Grade, confidence: f64, note: impl Into<String>) -> Self {
        ConditionSignal {
            source,
            grade,
            confidence: confidence.clamp(0.0, 1.0),
            note: note.into(),
        }
    }
}

impl fmt::Display for ConditionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({:.0}%) \"{}\"",
            self.source,
            self.grade,
            self.confidence * 100.0,
            self.note,
        )
    }
}

/// Fused condition verdict for one listing. Replaced wholly whenever the
/// signal set changes; individual fields are never patched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionAssessment {
    pub grade: Grade,
    pub confidence: f64,
    pub signals: Vec<ConditionSignal>,
    pub conflicted: bool,
}

impl ConditionAssessment {
    /// The zero-signal assessment.
    pub fn unknown() -> Self {
        ConditionAssessment {
            grade: Grade::Unknown,
            confidence: 0.0,
            signals: Vec::new(),
            conflicted: false,
        }
    }

    /// Highest confidence among contributing signals, 0.0 when empty.
    pub fn max_signal_confidence(&self) -> f64 {
        self.signals.iter().map(|s| s.confidence).fold(0.0, f64::max)
    }

    /// Whether the assessment gives the decision engine anything to work
    /// with (a real grade without unresolved conflicts).
    pub fn is_resolved(&self) -> bool {
        self.grade != Grade::Unknown && !self.conflicted
    }
}

impl fmt::Display for ConditionAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.0}%, {} signals{})",
            self.grade,
            self.confidence * 100.0,
            self.signals.len(),
            if self.conflicted { ", CONFLICTED" } else { "" },
        )
    }
}

// ---------------------------------------------------------------------------
// Comparables & price estimates
// ---------------------------------------------------------------------------

/// One historical sale record matched against the target card identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparableSample {
    /// Sale price in `currency`.
    pub price: Decimal,
    pub currency: Currency,
    pub bucket: ConditionBucket,
    pub sold_at: DateTime<Utc>,
    /// Identifier of the sale record at the source.
    pub source_id: String,
    /// Listed identity string at the source (kept for audit).
    pub source_title: String,
    /// Similarity to the target identity in [0, 1].
    pub similarity: f64,
}

impl ComparableSample {
    /// Sale price expressed in USD.
    pub fn price_usd(&self, jpy_to_usd: Decimal) -> Decimal {
        self.currency.to_usd(self.price, jpy_to_usd)
    }

    /// Days elapsed between the sale and `now`, floored at zero.
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.sold_at).num_days().max(0)
    }
}

impl fmt::Display for ComparableSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] sim={:.2} ({})",
            self.price,
            self.currency,
            self.bucket,
            self.similarity,
            self.sold_at.format("%Y-%m-%d"),
        )
    }
}

/// Aggregated price summary for one condition bucket, in USD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub bucket: ConditionBucket,
    /// Median of surviving samples.
    pub price: Decimal,
    pub sample_count: usize,
    pub tier: ConfidenceTier,
    pub trend: TrendDirection,
}

impl fmt::Display for PriceEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] ${:.2} (n={}, {}, {})",
            self.bucket, self.price, self.sample_count, self.tier, self.trend,
        )
    }
}

// ---------------------------------------------------------------------------
// Costs & valuation results
// ---------------------------------------------------------------------------

/// Itemized acquisition cost, normalized to USD at the configured rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub item_price: Decimal,
    pub service_fee: Decimal,
    pub payment_fee: Decimal,
    pub shipping: Decimal,
    /// Zero unless the caller opted into grading.
    pub grading: Decimal,
}

impl CostBreakdown {
    /// Sum of all cost components.
    pub fn total(&self) -> Decimal {
        self.item_price + self.service_fee + self.payment_fee + self.shipping + self.grading
    }
}

impl fmt::Display for CostBreakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${} (item {} + fees {} + ship {} + grading {})",
            self.total(),
            self.item_price,
            self.service_fee + self.payment_fee,
            self.shipping,
            self.grading,
        )
    }
}

/// Final valuation verdict for one listing. Pure function of its inputs;
/// re-running on identical data reproduces the identical result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    pub listing_id: String,
    pub title: String,
    pub url: String,
    pub grade: Grade,
    pub assessment_confidence: f64,
    pub conflicted: bool,
    /// Bucket whose estimate backed the numbers, if any matched.
    pub bucket_used: Option<ConditionBucket>,
    pub cost: CostBreakdown,
    pub total_cost_usd: Decimal,
    pub resale_estimate_usd: Option<Decimal>,
    pub profit_usd: Option<Decimal>,
    /// Resale estimate divided by total cost.
    pub roi: Option<Decimal>,
    pub sample_count: usize,
    pub trend: Option<TrendDirection>,
    pub decision: Decision,
    /// Human-auditable notes: which signals/samples drove the numbers.
    pub rationale: Vec<String>,
}

impl ValuationResult {
    pub fn is_profitable(&self) -> bool {
        self.decision == Decision::Profitable
    }
}

impl fmt::Display for ValuationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} | cost=${:.2}",
            self.listing_id, self.decision, self.grade, self.total_cost_usd,
        )?;
        if let (Some(resale), Some(profit), Some(roi)) =
            (self.resale_estimate_usd, self.profit_usd, self.roi)
        {
            write!(f, " resale=${resale:.2} profit=${profit:.2} roi={roi:.2}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// Summary of one batch evaluation run, written as the engine's output
/// surface for the display/export collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub listings_evaluated: usize,
    pub profitable: usize,
    pub rejected: usize,
    pub insufficient_data: usize,
    /// Ranked results, best opportunity first.
    pub results: Vec<ValuationResult>,
}

impl RunReport {
    /// Assemble a report from ranked results, counting decisions.
    pub fn from_results(
        run_id: uuid::Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        results: Vec<ValuationResult>,
    ) -> Self {
        let profitable = results.iter().filter(|r| r.decision == Decision::Profitable).count();
        let rejected = results.iter().filter(|r| r.decision == Decision::Rejected).count();
        let insufficient_data = results
            .iter()
            .filter(|r| r.decision == Decision::InsufficientData)
            .count();
        RunReport {
            run_id,
            started_at,
            finished_at,
            listings_evaluated: results.len(),
            profitable,
            rejected,
            insufficient_data,
            results,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: {} listings | {} profitable | {} rejected | {} insufficient",
            self.run_id,
            self.listings_evaluated,
            self.profitable,
            self.rejected,
            self.insufficient_data,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ARBITER.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Price lookup error ({source_name}): {message}")]
    Lookup { source_name: String, message: String },

    #[error("Image analysis error ({provider}): {message}")]
    Vision { provider: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {message}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
