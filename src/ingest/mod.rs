//! Feed retrieval for the AEMET OpenData API.
//!
//! AEMET publishes the same warnings through several shapes: per-region JSON
//! arrays, a national feed that answers JSON or Atom behind the envelope
//! indirection, and an archived tar.gz of CAP-XML files. The configured
//! `FeedFormat` picks the retrieval strategy; payload bodies are always
//! sniffed by leading bytes rather than trusted, because the national
//! endpoints have served all three shapes from the same path.
//!
//! Submodules:
//! - `aemet` — envelope protocol and the three retrieval strategies
//! - `capxml` — CAP/Atom text extraction
//! - `archive` — tar.gz scratch-directory unpacking

pub mod aemet;
pub mod archive;
pub mod capxml;

use std::fmt;

use crate::config::ServiceConfig;
use crate::model::{FeedError, RawBulletin};

// ---------------------------------------------------------------------------
// Feed formats
// ---------------------------------------------------------------------------

/// The retrieval strategy a deployment is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    /// One scoped query per registry area, answering a bare JSON array.
    PerRegionJson,
    /// One national query, answering JSON or Atom behind the envelope.
    NationalFeed,
    /// One national query whose payload is a tar.gz of CAP files.
    ArchivedCap,
}

impl FeedFormat {
    /// Parses the configuration spelling of a format.
    pub fn parse(value: &str) -> Option<FeedFormat> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-region-json" => Some(FeedFormat::PerRegionJson),
            "national-feed" => Some(FeedFormat::NationalFeed),
            "archived-cap" => Some(FeedFormat::ArchivedCap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedFormat::PerRegionJson => "per-region-json",
            FeedFormat::NationalFeed => "national-feed",
            FeedFormat::ArchivedCap => "archived-cap",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Payload sniffing
// ---------------------------------------------------------------------------

/// What a payload's leading bytes say it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Json,
    Xml,
    Gzip,
    Tar,
    Unknown,
}

/// Classifies a payload by magic bytes, then by first significant byte.
/// A UTF-8 byte order mark before the content is tolerated.
pub fn sniff_payload(bytes: &[u8]) -> PayloadKind {
    if archive::is_gzip(bytes) {
        return PayloadKind::Gzip;
    }
    if archive::is_tar(bytes) {
        return PayloadKind::Tar;
    }
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    match body.iter().copied().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => PayloadKind::Xml,
        Some(b'{') | Some(b'[') => PayloadKind::Json,
        _ => PayloadKind::Unknown,
    }
}

/// Runs the retrieval strategy the configuration selects.
pub fn fetch_all(
    client: &reqwest::blocking::Client,
    config: &ServiceConfig,
) -> Result<Vec<RawBulletin>, FeedError> {
    match config.feed_format {
        FeedFormat::PerRegionJson => aemet::fetch_per_region(client, config),
        FeedFormat::NationalFeed => aemet::fetch_national(client, config),
        FeedFormat::ArchivedCap => aemet::fetch_archived(client, config),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_format_parse_round_trips() {
        for format in [
            FeedFormat::PerRegionJson,
            FeedFormat::NationalFeed,
            FeedFormat::ArchivedCap,
        ] {
            assert_eq!(FeedFormat::parse(format.as_str()), Some(format));
        }
        assert_eq!(FeedFormat::parse(" Archived-CAP "), Some(FeedFormat::ArchivedCap));
        assert_eq!(FeedFormat::parse("csv"), None);
        assert_eq!(FeedFormat::parse(""), None);
    }

    #[test]
    fn test_sniff_json_and_xml() {
        assert_eq!(sniff_payload(b"  {\"estado\": 200}"), PayloadKind::Json);
        assert_eq!(sniff_payload(b"[{\"nivel\": \"verde\"}]"), PayloadKind::Json);
        assert_eq!(sniff_payload(b"<?xml version=\"1.0\"?><feed/>"), PayloadKind::Xml);
        assert_eq!(sniff_payload(b"\n\t <alert/>"), PayloadKind::Xml);
    }

    #[test]
    fn test_sniff_tolerates_utf8_bom() {
        assert_eq!(sniff_payload(b"\xEF\xBB\xBF<feed/>"), PayloadKind::Xml);
        assert_eq!(sniff_payload(b"\xEF\xBB\xBF[1]"), PayloadKind::Json);
    }

    #[test]
    fn test_sniff_gzip_magic() {
        assert_eq!(sniff_payload(b"\x1f\x8b\x08\x00rest"), PayloadKind::Gzip);
    }

    #[test]
    fn test_sniff_tar_magic() {
        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert_eq!(sniff_payload(&tar), PayloadKind::Tar);
    }

    #[test]
    fn test_sniff_unknown_for_empty_and_plain_text() {
        assert_eq!(sniff_payload(b""), PayloadKind::Unknown);
        assert_eq!(sniff_payload(b"   "), PayloadKind::Unknown);
        assert_eq!(sniff_payload(b"hola"), PayloadKind::Unknown);
    }
}
