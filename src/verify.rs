//! Feed Verification Module
//!
//! One-shot check of the configured feed against the live AEMET API: fetch,
//! reduce, tally, report. Nothing is persisted, so a verification run never
//! disturbs the snapshot the service is answering from.
//!
//! Use this after changing feed format or credentials to confirm the
//! pipeline end to end before letting the scheduler loose.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alert::reduce::{self, ReduceOutcome};
use crate::config::ServiceConfig;
use crate::ingest;
use crate::model::RiskLevel;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedVerification {
    pub timestamp: String,
    pub feed_format: String,
    pub status: VerificationStatus,
    pub bulletin_count: usize,
    /// Bulletins that ended up attached to a province.
    pub attributed: usize,
    pub unresolved: usize,
    pub coastal_skipped: usize,
    pub no_risk: usize,
    pub provinces_moderate: usize,
    pub provinces_severe: usize,
    pub provinces_extreme: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

// ============================================================================
// Feed Verification
// ============================================================================

pub fn verify_feed(config: &ServiceConfig) -> FeedVerification {
    let mut result = FeedVerification {
        timestamp: Utc::now().to_rfc3339(),
        feed_format: config.feed_format.to_string(),
        status: VerificationStatus::Failed,
        bulletin_count: 0,
        attributed: 0,
        unresolved: 0,
        coastal_skipped: 0,
        no_risk: 0,
        provinces_moderate: 0,
        provinces_severe: 0,
        provinces_extreme: 0,
        error_message: None,
    };

    let client = match reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.payload_timeout_secs))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            result.error_message = Some(format!("Client build failed: {}", e));
            return result;
        }
    };

    match ingest::fetch_all(&client, config) {
        Ok(bulletins) => {
            let outcome = reduce::reduce_at(&bulletins, Utc::now());
            apply_outcome(&mut result, &outcome);
        }
        Err(e) => {
            result.error_message = Some(format!("Feed fetch failed: {}", e));
        }
    }

    result
}

/// Fills the tallies from a reduction and derives the overall status. A
/// reachable feed with zero bulletins is a partial success: the pipeline
/// worked but proved nothing about extraction.
fn apply_outcome(result: &mut FeedVerification, outcome: &ReduceOutcome) {
    result.bulletin_count = outcome.stats.bulletins;
    result.unresolved = outcome.stats.unresolved;
    result.coastal_skipped = outcome.stats.coastal;
    result.no_risk = outcome.stats.no_risk;
    result.attributed = outcome.stats.bulletins
        - outcome.stats.no_risk
        - outcome.stats.coastal
        - outcome.stats.unresolved;

    for alert in outcome.alerts.values() {
        match alert.level {
            RiskLevel::None => {}
            RiskLevel::Moderate => result.provinces_moderate += 1,
            RiskLevel::Severe => result.provinces_severe += 1,
            RiskLevel::Extreme => result.provinces_extreme += 1,
        }
    }

    result.status = if result.bulletin_count == 0 {
        VerificationStatus::PartialSuccess
    } else if result.unresolved == 0 {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    };
}

// ============================================================================
// Reporting
// ============================================================================

pub fn print_report(result: &FeedVerification) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("📊 FEED VERIFICATION");
    println!("═══════════════════════════════════════════════════════════");
    println!();
    println!("Feed format:    {}", result.feed_format);
    println!("Checked at:     {}", result.timestamp);
    println!();

    match result.status {
        VerificationStatus::Success => {
            println!(
                "✓ OK ({} bulletins, all attributed)",
                result.bulletin_count
            );
        }
        VerificationStatus::PartialSuccess if result.bulletin_count == 0 => {
            println!("⚠ Feed reachable, no active warnings to verify against");
        }
        VerificationStatus::PartialSuccess => {
            println!(
                "⚠ Partial ({} of {} bulletins unattributed)",
                result.unresolved, result.bulletin_count
            );
        }
        VerificationStatus::Failed => {
            println!(
                "✗ FAILED: {}",
                result.error_message.as_deref().unwrap_or("Unknown")
            );
        }
    }

    println!();
    println!("Bulletins:      {}", result.bulletin_count);
    println!("  attributed:   {}", result.attributed);
    println!("  no risk:      {}", result.no_risk);
    println!("  coastal:      {}", result.coastal_skipped);
    println!("  unresolved:   {}", result.unresolved);
    println!();
    println!(
        "Provinces:      {} amarillo, {} naranja, {} rojo",
        result.provinces_moderate, result.provinces_severe, result.provinces_extreme
    );
    println!("═══════════════════════════════════════════════════════════");
}

/// Verify and print. Returns the result so callers can pick an exit code.
pub fn run_verification(config: &ServiceConfig) -> FeedVerification {
    println!("🔍 Verifying {} feed...", config.feed_format);
    let result = verify_feed(config);
    print_report(&result);
    result
}
