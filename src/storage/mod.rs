//! Persistence layer.
//!
//! Reads the scraped-listing feed and writes/reads run reports as JSON
//! files. The feed is produced by the scraping collaborator; the report
//! is the engine's output surface for the display/export collaborators.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{Listing, RunReport};

/// Load the listing feed. A missing or malformed feed is fatal: the
/// engine has nothing to evaluate without it.
pub fn load_listings(path: &str) -> Result<Vec<Listing>> {
    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read listings feed from {path}"))?;

    let listings: Vec<Listing> = serde_json::from_str(&json)
        .context(format!("Failed to parse listings feed from {path}"))?;

    info!(path, count = listings.len(), "Listings loaded");
    Ok(listings)
}

/// Save a run report to a JSON file, creating the report directory if
/// it is missing.
pub fn save_report(report: &RunReport, path: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialise run report")?;

    if let Some(parent) = Path::new(path).parent() {
        // A bare filename has an empty parent.
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context(format!(
                "Failed to create report directory {}",
                parent.display()
            ))?;
        }
    }

    std::fs::write(path, &json).context(format!("Failed to write report to {path}"))?;

    debug!(path, run_id = %report.run_id, "Report saved");
    Ok(())
}

/// Load a previous run report.
/// Returns None if the file doesn't exist (first run).
pub fn load_report(path: &str) -> Result<Option<RunReport>> {
    if !Path::new(path).exists() {
        info!(path, "No previous report found");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).context(format!("Failed to read report from {path}"))?;

    let report: RunReport =
        serde_json::from_str(&json).context(format!("Failed to parse report from {path}"))?;

    info!(
        path,
        run_id = %report.run_id,
        listings = report.listings_evaluated,
        profitable = report.profitable,
        "Previous report loaded",
    );

    Ok(Some(report))
}

/// Delete a report file (for testing or reset).
pub fn delete_report(path: &str) -> Result<()> {
    if Path::new(path).exists() {
        std::fs::remove_file(path).context(format!("Failed to delete report file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Listing;
    use chrono::Utc;

    fn temp_path(prefix: &str) -> String {
        let mut p = std::env::temp_dir();
        p.push(format!("arbiter_test_{prefix}_{}.json", uuid::Uuid::new_v4()));
        p.to_string_lossy().to_string()
    }

    fn make_report() -> RunReport {
        RunReport::from_results(uuid::Uuid::new_v4(), Utc::now(), Utc::now(), Vec::new())
    }

    #[test]
    fn test_save_and_load_report() {
        let path = temp_path("report");
        let report = make_report();
        save_report(&report, &path).unwrap();

        let loaded = load_report(&path).unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().run_id, report.run_id);

        delete_report(&path).unwrap();
    }

    #[test]
    fn test_save_report_creates_missing_directory() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("arbiter_test_reports_{}", uuid::Uuid::new_v4()));
        let path = dir
            .join("nested")
            .join("run.json")
            .to_string_lossy()
            .to_string();

        let report = make_report();
        save_report(&report, &path).unwrap();

        let loaded = load_report(&path).unwrap();
        assert_eq!(loaded.unwrap().run_id, report.run_id);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_report_nonexistent() {
        let loaded = load_report("/tmp/arbiter_nonexistent_report_12345.json").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_listings_roundtrip() {
        let path = temp_path("listings");
        let listings = vec![Listing::sample()];
        std::fs::write(&path, serde_json::to_string_pretty(&listings).unwrap()).unwrap();

        let loaded = load_listings(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "lst-001");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_listings_missing_is_error() {
        let result = load_listings("/tmp/arbiter_nonexistent_feed_12345.json");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_listings_malformed_is_error() {
        let path = temp_path("bad_feed");
        std::fs::write(&path, "{not json").unwrap();

        let result = load_listings(&path);
        assert!(result.is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_delete_report_nonexistent_ok() {
        let result = delete_report("/tmp/arbiter_does_not_exist_xyz.json");
        assert!(result.is_ok());
    }
}
