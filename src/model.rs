//! Core data types for the AEMET warning ingestion service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains the warning level scale, the reduced per-province alert state,
//! the transient bulletin shape handed from ingestion to extraction, and the
//! feed error taxonomy. No I/O lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Warning levels
// ---------------------------------------------------------------------------

/// AEMET warning levels, in ascending order of severity.
///
/// The derived `Ord` drives reduction: a bulletin replaces a province's
/// accumulated alert only when its level is strictly greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    None,
    Moderate,
    Severe,
    Extreme,
}

impl RiskLevel {
    /// The color-word key AEMET uses in feeds and that the snapshot file stores.
    pub fn key(self) -> &'static str {
        match self {
            RiskLevel::None => "verde",
            RiskLevel::Moderate => "amarillo",
            RiskLevel::Severe => "naranja",
            RiskLevel::Extreme => "rojo",
        }
    }

    /// Human-readable name served to callers.
    pub fn display_name(self) -> &'static str {
        match self {
            RiskLevel::None => "Sin riesgo",
            RiskLevel::Moderate => "Riesgo",
            RiskLevel::Severe => "Riesgo importante",
            RiskLevel::Extreme => "Riesgo extremo",
        }
    }

    /// Display color served to callers.
    pub fn color(self) -> &'static str {
        match self {
            RiskLevel::None => "#28a745",
            RiskLevel::Moderate => "#ffc107",
            RiskLevel::Severe => "#fd7e14",
            RiskLevel::Extreme => "#dc3545",
        }
    }

    /// Parses a stored key back into a level. Round-trips `key()`.
    pub fn from_key(key: &str) -> Option<RiskLevel> {
        match key {
            "verde" => Some(RiskLevel::None),
            "amarillo" => Some(RiskLevel::Moderate),
            "naranja" => Some(RiskLevel::Severe),
            "rojo" => Some(RiskLevel::Extreme),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

// ---------------------------------------------------------------------------
// Alert state
// ---------------------------------------------------------------------------

/// Reduced alert state for a single province.
///
/// Invariant: `phenomenon` is `Some` exactly when `level` is above
/// `RiskLevel::None`. A green province carries no phenomenon, and fetch
/// failures never surface here (they are reported through sync status only).
#[derive(Debug, Clone, PartialEq)]
pub struct ProvinceAlert {
    pub level: RiskLevel,
    pub phenomenon: Option<String>,
    pub observed_at: DateTime<Utc>,
}

impl ProvinceAlert {
    /// The default "no active warning" state for a province.
    pub fn none_at(observed_at: DateTime<Utc>) -> ProvinceAlert {
        ProvinceAlert {
            level: RiskLevel::None,
            phenomenon: None,
            observed_at,
        }
    }

    /// Renders the alert in the shape served to callers.
    pub fn view(&self) -> AlertView {
        AlertView {
            nivel: self.level.key().to_string(),
            nombre: self.level.display_name().to_string(),
            color: self.level.color().to_string(),
            fenomeno: self.phenomenon.clone(),
            actualizacion: self.observed_at.to_rfc3339(),
        }
    }
}

/// JSON shape of one province's alert as served to callers.
///
/// Field names are the upstream Spanish ones so existing consumers of the
/// AEMET-backed endpoint keep working unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertView {
    pub nivel: String,
    pub nombre: String,
    pub color: String,
    pub fenomeno: Option<String>,
    pub actualizacion: String,
}

// ---------------------------------------------------------------------------
// Bulletins
// ---------------------------------------------------------------------------

/// One upstream hazard bulletin, normalized to free text plus metadata.
///
/// All three feed formats converge on this shape before extraction, and it is
/// discarded once the per-province reduction has consumed it. `title` and
/// `summary` are plain text (markup already stripped); classification scans
/// both, phenomenon detection prefers the title.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBulletin {
    pub title: String,
    pub summary: String,
    /// Province code attached by a region-scoped fetch. Authoritative when
    /// present and known; otherwise resolution falls back to the text.
    pub province_hint: Option<String>,
    /// Name of the CAP file this bulletin was unpacked from, if any. Used as
    /// a last-resort province signal.
    pub source_file: Option<String>,
}

impl RawBulletin {
    /// A bulletin carrying only free text, with no region or file context.
    pub fn from_text(title: &str, summary: &str) -> RawBulletin {
        RawBulletin {
            title: title.to_string(),
            summary: summary.to_string(),
            province_hint: None,
            source_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while retrieving or decoding the AEMET feed.
#[derive(Debug, PartialEq)]
pub enum FeedError {
    /// Non-2xx HTTP response from the metadata or payload endpoint.
    Http(u16),
    /// The metadata envelope reported a failure state of its own.
    Upstream { estado: u16, descripcion: String },
    /// Transport-level failure: DNS, refused connection, timeout.
    Network(String),
    /// A response body that should be structured could not be decoded.
    Parse(String),
    /// The CAP bundle could not be unpacked.
    Archive(String),
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::Http(code) => write!(f, "HTTP error: {}", code),
            FeedError::Upstream { estado, descripcion } => {
                write!(f, "upstream error {}: {}", estado, descripcion)
            }
            FeedError::Network(msg) => write!(f, "network error: {}", msg),
            FeedError::Parse(msg) => write!(f, "parse error: {}", msg),
            FeedError::Archive(msg) => write!(f, "archive error: {}", msg),
        }
    }
}

impl std::error::Error for FeedError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_risk_levels_order_ascending() {
        assert!(RiskLevel::None < RiskLevel::Moderate);
        assert!(RiskLevel::Moderate < RiskLevel::Severe);
        assert!(RiskLevel::Severe < RiskLevel::Extreme);
    }

    #[test]
    fn test_level_keys_round_trip() {
        for level in [
            RiskLevel::None,
            RiskLevel::Moderate,
            RiskLevel::Severe,
            RiskLevel::Extreme,
        ] {
            assert_eq!(
                RiskLevel::from_key(level.key()),
                Some(level),
                "key {:?} should parse back to the same level",
                level.key()
            );
        }
    }

    #[test]
    fn test_unknown_key_does_not_parse() {
        assert_eq!(RiskLevel::from_key("morado"), None);
        assert_eq!(RiskLevel::from_key(""), None);
        assert_eq!(RiskLevel::from_key("VERDE"), None, "keys are lowercase only");
    }

    #[test]
    fn test_green_view_has_no_phenomenon() {
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 9, 30, 0).unwrap();
        let view = ProvinceAlert::none_at(at).view();
        assert_eq!(view.nivel, "verde");
        assert_eq!(view.nombre, "Sin riesgo");
        assert_eq!(view.color, "#28a745");
        assert_eq!(view.fenomeno, None);
        assert_eq!(view.actualizacion, at.to_rfc3339());
    }

    #[test]
    fn test_alert_view_serializes_with_spanish_field_names() {
        let at = Utc.with_ymd_and_hms(2024, 11, 3, 9, 30, 0).unwrap();
        let alert = ProvinceAlert {
            level: RiskLevel::Severe,
            phenomenon: Some("Viento".to_string()),
            observed_at: at,
        };
        let json = serde_json::to_value(alert.view()).unwrap();
        assert_eq!(json["nivel"], "naranja");
        assert_eq!(json["nombre"], "Riesgo importante");
        assert_eq!(json["color"], "#fd7e14");
        assert_eq!(json["fenomeno"], "Viento");
        assert!(json["actualizacion"].is_string());
    }

    #[test]
    fn test_feed_error_messages_are_descriptive() {
        assert_eq!(FeedError::Http(500).to_string(), "HTTP error: 500");
        let upstream = FeedError::Upstream {
            estado: 401,
            descripcion: "API key invalido".to_string(),
        };
        assert_eq!(upstream.to_string(), "upstream error 401: API key invalido");
    }
}
