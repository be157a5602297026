/// Live AEMET OpenData API tests
///
/// These tests hit the real API and are ignored by default. They verify:
/// 1. The envelope protocol answers for the national endpoint
/// 2. The configured feed fetches and reduces end to end
/// 3. The verification runner produces a sensible report
///
/// Prerequisites:
/// - AEMET_API_KEY set in the environment or .env
/// - Internet connectivity to opendata.aemet.es
///
/// Run with: cargo test --test aemet_live -- --ignored --test-threads=1
///
/// Note: AEMET rate-limits aggressively. The per-region walk queries all 52
/// area endpoints with the configured delay and takes a few minutes; quiet
/// weather days legitimately return zero bulletins, so the tests warn
/// instead of failing when there is nothing active to check.

use avisos_service::alert::reduce;
use avisos_service::config::{self, ServiceConfig};
use avisos_service::ingest::aemet::{self, EnvelopeOutcome};
use avisos_service::ingest::FeedFormat;
use avisos_service::verify::{self, VerificationStatus};

use chrono::Utc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn live_config() -> Option<ServiceConfig> {
    match config::load() {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("⚠ Skipping live test, configuration not usable: {}", e);
            None
        }
    }
}

fn live_client(config: &ServiceConfig) -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.payload_timeout_secs))
        .build()
        .expect("Failed to create HTTP client")
}

// ---------------------------------------------------------------------------
// Envelope Protocol
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run manually - makes real API calls
fn test_live_national_envelope_resolves() {
    let Some(config) = live_config() else { return };
    let client = live_client(&config);

    let envelope = aemet::fetch_envelope(&client, &config, "/avisos_cap/ultimoelaborado/area/esp")
        .expect("AEMET envelope request failed - check network and API key");

    match aemet::resolve_envelope(&envelope) {
        Ok(EnvelopeOutcome::Data(url)) => {
            println!("✓ envelope resolved to a datos URL");
            assert!(
                url.starts_with("http"),
                "datos should be a URL, got: {}",
                url
            );
        }
        Ok(EnvelopeOutcome::NoWarnings) => {
            println!("✓ envelope reports no active warnings (valid quiet-day answer)");
        }
        Err(e) => panic!("envelope did not resolve: {}", e),
    }
}

// ---------------------------------------------------------------------------
// Feed Fetching
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run manually - makes real API calls
fn test_live_national_feed_reduces() {
    let Some(mut config) = live_config() else { return };
    config.feed_format = FeedFormat::NationalFeed;
    let client = live_client(&config);

    let bulletins = aemet::fetch_national(&client, &config)
        .expect("national feed fetch failed - check network and API key");
    println!("✓ national feed returned {} bulletins", bulletins.len());

    if bulletins.is_empty() {
        eprintln!("⚠ No active warnings today - nothing further to verify");
        return;
    }

    for bulletin in bulletins.iter().take(5) {
        assert!(
            !bulletin.title.is_empty() || !bulletin.summary.is_empty(),
            "bulletins should carry text"
        );
    }

    let outcome = reduce::reduce_at(&bulletins, Utc::now());
    println!(
        "  {} provinces with warnings, {} bulletins unresolved",
        outcome.provinces_at_risk(),
        outcome.stats.unresolved
    );
    assert_eq!(outcome.alerts.len(), 52, "reduction always covers all provinces");
}

#[test]
#[ignore] // Only run manually - walks all 52 region endpoints, slow
fn test_live_per_region_walk_reduces() {
    let Some(mut config) = live_config() else { return };
    config.feed_format = FeedFormat::PerRegionJson;
    let client = live_client(&config);

    let bulletins = aemet::fetch_per_region(&client, &config)
        .expect("per-region fetch failed for every province - check network and API key");
    println!("✓ region walk returned {} bulletins", bulletins.len());

    let outcome = reduce::reduce_at(&bulletins, Utc::now());
    assert_eq!(outcome.alerts.len(), 52);
    for (code, alert) in &outcome.alerts {
        if alert.level != avisos_service::model::RiskLevel::None {
            println!(
                "  {} {} ({})",
                code,
                alert.level,
                alert.phenomenon.as_deref().unwrap_or("-")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Verification Runner
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Only run manually - makes real API calls
fn test_live_verification_produces_report() {
    let Some(config) = live_config() else { return };

    let result = verify::run_verification(&config);
    assert!(
        result.status == VerificationStatus::Success
            || result.status == VerificationStatus::PartialSuccess,
        "live verification should not hard-fail: {:?}",
        result.error_message
    );
}
