//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Every section has defaults so a partial file works; collaborator
//! base URLs can be overridden via `ARBITER_LOOKUP_URL` and
//! `ARBITER_VISION_URL`. Validation runs once at startup and is fatal:
//! no listing is evaluated against a bad threshold or rate.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub pricing: PricingConfig,
    pub fees: FeeConfig,
    pub matcher: MatcherConfig,
    pub lookup: LookupConfig,
    pub vision: VisionConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// JSON file holding the scraped listing feed.
    pub listings_file: String,
    /// Where the run report is written.
    pub report_file: String,
    /// Maximum listings evaluated concurrently.
    pub concurrency: usize,
    /// Include the grading fee and target a graded bucket when viable.
    pub include_grading: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            listings_file: "listings.json".to_string(),
            report_file: "report.json".to_string(),
            concurrency: 4,
            include_grading: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PricingConfig {
    /// USD per JPY.
    pub jpy_to_usd: Decimal,
    /// Minimum resale/cost ratio for a profitable verdict.
    pub profit_threshold: Decimal,
    /// Surviving samples needed for a high-confidence estimate.
    pub high_sample_threshold: usize,
    /// Surviving samples needed for a medium-confidence estimate.
    pub medium_sample_threshold: usize,
    /// Outlier rejection cutoff in MAD units.
    pub mad_multiplier: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        PricingConfig {
            jpy_to_usd: dec!(0.0067),
            profit_threshold: dec!(2.0),
            high_sample_threshold: 10,
            medium_sample_threshold: 3,
            mad_multiplier: dec!(3.0),
        }
    }
}

/// Proxy-bid marketplace cost model. Percentages apply to the hammer
/// price; shipping is a flat JPY amount; grading is a flat USD amount.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeeConfig {
    pub service_pct: Decimal,
    pub payment_pct: Decimal,
    pub shipping_flat_jpy: Decimal,
    pub grading_fee_usd: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        FeeConfig {
            service_pct: dec!(0.05),
            payment_pct: dec!(0.035),
            shipping_flat_jpy: dec!(3000),
            grading_fee_usd: dec!(50),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MatcherConfig {
    /// Candidates scoring below this similarity are discarded.
    pub similarity_floor: f64,
    /// Sale-history window requested from the lookup collaborator.
    pub window_days: u32,
    pub cache_ttl_minutes: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        MatcherConfig {
            similarity_floor: 0.5,
            window_days: 90,
            cache_ttl_minutes: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LookupConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        LookupConfig {
            base_url: "https://salesarchive.example.com".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        VisionConfig {
            base_url: "https://defectscan.example.com".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and apply env overrides.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Collaborator endpoints can be swapped without editing the file,
    /// which test rigs and staging deployments rely on.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ARBITER_LOOKUP_URL") {
            self.lookup.base_url = url;
        }
        if let Ok(url) = std::env::var("ARBITER_VISION_URL") {
            self.vision.base_url = url;
        }
    }

    /// Reject invalid configuration before any listing is processed.
    pub fn validate(&self) -> Result<()> {
        if self.pricing.jpy_to_usd <= Decimal::ZERO {
            bail!("pricing.jpy_to_usd must be positive");
        }
        if self.pricing.profit_threshold <= Decimal::ZERO {
            bail!("pricing.profit_threshold must be positive");
        }
        if self.pricing.mad_multiplier <= Decimal::ZERO {
            bail!("pricing.mad_multiplier must be positive");
        }
        if self.pricing.medium_sample_threshold == 0 {
            bail!("pricing.medium_sample_threshold must be at least 1");
        }
        if self.pricing.medium_sample_threshold > self.pricing.high_sample_threshold {
            bail!(
                "pricing.medium_sample_threshold ({}) exceeds high_sample_threshold ({})",
                self.pricing.medium_sample_threshold,
                self.pricing.high_sample_threshold,
            );
        }
        if self.fees.service_pct < Decimal::ZERO || self.fees.service_pct >= Decimal::ONE {
            bail!("fees.service_pct must be in [0, 1)");
        }
        if self.fees.payment_pct < Decimal::ZERO || self.fees.payment_pct >= Decimal::ONE {
            bail!("fees.payment_pct must be in [0, 1)");
        }
        if self.fees.shipping_flat_jpy < Decimal::ZERO || self.fees.grading_fee_usd < Decimal::ZERO
        {
            bail!("fee amounts must be non-negative");
        }
        if !(self.matcher.similarity_floor > 0.0 && self.matcher.similarity_floor <= 1.0) {
            bail!(
                "matcher.similarity_floor must be in (0, 1], got {}",
                self.matcher.similarity_floor,
            );
        }
        if self.matcher.window_days == 0 {
            bail!("matcher.window_days must be at least 1");
        }
        if self.matcher.cache_ttl_minutes < 1 {
            bail!("matcher.cache_ttl_minutes must be at least 1");
        }
        if self.engine.concurrency == 0 {
            bail!("engine.concurrency must be at least 1");
        }
        if self.engine.listings_file.is_empty() || self.engine.report_file.is_empty() {
            bail!("engine.listings_file and engine.report_file must be set");
        }
        if self.lookup.base_url.is_empty() || self.vision.base_url.is_empty() {
            bail!("lookup.base_url and vision.base_url must be set");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pricing.profit_threshold, dec!(2.0));
        assert_eq!(cfg.pricing.medium_sample_threshold, 3);
        assert_eq!(cfg.engine.concurrency, 4);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [pricing]
            profit_threshold = 1.5

            [matcher]
            similarity_floor = 0.6
            "#,
        )
        .unwrap();
        assert_eq!(cfg.pricing.profit_threshold, dec!(1.5));
        assert_eq!(cfg.pricing.jpy_to_usd, dec!(0.0067));
        assert_eq!(cfg.matcher.similarity_floor, 0.6);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let mut cfg = AppConfig::default();
        cfg.pricing.profit_threshold = Decimal::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_invalid_similarity_floor_rejected() {
        let mut cfg = AppConfig::default();
        cfg.matcher.similarity_floor = 0.0;
        assert!(cfg.validate().is_err());
        cfg.matcher.similarity_floor = 1.2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_sample_thresholds_consistent() {
        let mut cfg = AppConfig::default();
        cfg.pricing.medium_sample_threshold = 20;
        cfg.pricing.high_sample_threshold = 10;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("medium_sample_threshold"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut cfg = AppConfig::default();
        cfg.engine.concurrency = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(AppConfig::load("does-not-exist.toml").is_err());
    }

    #[test]
    fn test_load_repo_config() {
        // config.toml ships at the repo root with default-compatible values.
        let cfg = AppConfig::load("config.toml").unwrap();
        assert!(cfg.validate().is_ok());
        assert!(cfg.pricing.profit_threshold > Decimal::ZERO);
    }
}
