//! Severity classification for warning bulletin text.
//!
//! AEMET encodes the warning level inconsistently across its feeds: as a
//! color word ("aviso naranja"), a risk phrase ("riesgo importante"), a
//! numeric level ("nivel 3"), or a CAP severity enum ("Severe"). The
//! classifier scans for all of them, highest level first, so a bulletin
//! mentioning several levels classifies as the most severe one. Unmatched
//! text classifies as `RiskLevel::None` — the function is total and never
//! errors on junk input.

use regex::Regex;
use std::sync::LazyLock;

use crate::alert::normalize_text;
use crate::model::RiskLevel;

// Patterns run against normalized (lowercase, accent-folded) text.
static EXTREME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"rojo").unwrap(),
        Regex::new(r"extremo").unwrap(),
        Regex::new(r"nivel\s*4").unwrap(),
        Regex::new(r"level\s*4").unwrap(),
        Regex::new(r"\bextreme\b").unwrap(),
    ]
});

static SEVERE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"naranja").unwrap(),
        Regex::new(r"importante").unwrap(),
        Regex::new(r"nivel\s*3").unwrap(),
        Regex::new(r"level\s*3").unwrap(),
        Regex::new(r"\bsevere\b").unwrap(),
    ]
});

static MODERATE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"amarillo").unwrap(),
        Regex::new(r"advertencia").unwrap(),
        Regex::new(r"riesgo").unwrap(),
        Regex::new(r"nivel\s*2").unwrap(),
        Regex::new(r"level\s*2").unwrap(),
        Regex::new(r"\bmoderate\b").unwrap(),
        Regex::new(r"\bminor\b").unwrap(),
    ]
});

/// Classifies free bulletin text into a warning level.
///
/// Checks extreme markers first, then severe, then moderate, so compound
/// phrases resolve to their strongest level ("riesgo extremo" is extreme,
/// not moderate, even though it contains "riesgo").
pub fn classify(text: &str) -> RiskLevel {
    let normalized = normalize_text(text);
    if EXTREME_PATTERNS.iter().any(|re| re.is_match(&normalized)) {
        return RiskLevel::Extreme;
    }
    if SEVERE_PATTERNS.iter().any(|re| re.is_match(&normalized)) {
        return RiskLevel::Severe;
    }
    if MODERATE_PATTERNS.iter().any(|re| re.is_match(&normalized)) {
        return RiskLevel::Moderate;
    }
    RiskLevel::None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
