//! Image-analysis collaborator integration.
//!
//! Defines the `ImageAnalyzer` trait over defect-scan services and the
//! HTTP implementation. The image extractor consumes the trait and maps
//! the returned defect report onto the grade ladder; this module knows
//! nothing about grades.
//!
//! Endpoint: `POST {base}/v1/analyze` with the listing's image URLs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::VisionConfig;

const PROVIDER_NAME: &str = "defect-scan";

// ---------------------------------------------------------------------------
// Defect report
// ---------------------------------------------------------------------------

/// Defect-oriented visual analysis of a listing's images. All scores
/// are in [0, 1], higher meaning more damage / less certainty offset.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefectReport {
    #[serde(default)]
    pub edge_wear: f64,
    #[serde(default)]
    pub surface_damage: f64,
    #[serde(default)]
    pub centering_offset: f64,
    /// The service's own certainty in its detection.
    #[serde(default)]
    pub certainty: f64,
    #[serde(default)]
    pub images_analyzed: usize,
}

impl DefectReport {
    /// Whether the scan produced anything an extractor can act on.
    pub fn is_conclusive(&self) -> bool {
        self.images_analyzed > 0 && self.certainty > 0.0
    }
}

// ---------------------------------------------------------------------------
// Analyzer trait
// ---------------------------------------------------------------------------

/// Abstraction over image defect-analysis services.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    /// Analyze the given image URLs for card defects.
    async fn analyze(&self, image_urls: &[String]) -> Result<DefectReport>;

    /// Provider name for logging and identification.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Defect-scan collaborator client.
pub struct DefectScanClient {
    http: Client,
    base_url: String,
}

impl DefectScanClient {
    pub fn new(config: &VisionConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("ARBITER/0.1.0 (card-valuation-agent)")
            .build()
            .context("Failed to build HTTP client for defect scan")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ImageAnalyzer for DefectScanClient {
    async fn analyze(&self, image_urls: &[String]) -> Result<DefectReport> {
        let url = format!("{}/v1/analyze", self.base_url);
        let body = serde_json::json!({ "imageUrls": image_urls });

        debug!(images = image_urls.len(), "Requesting defect scan");

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Defect scan request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Defect scan error {status}: {body}");
        }

        let report: DefectReport = resp
            .json()
            .await
            .context("Failed to parse defect scan response")?;

        debug!(
            edge_wear = report.edge_wear,
            surface_damage = report.surface_damage,
            centering_offset = report.centering_offset,
            certainty = report.certainty,
            images = report.images_analyzed,
            "Defect scan complete",
        );

        Ok(report)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
