//! Bulletin extraction: level, phenomenon, coastal filter, province.
//!
//! Takes one `RawBulletin` of free text and produces an `Extraction` the
//! reducer can act on. Province resolution runs a fixed precedence:
//!
//!   1. the retriever's region hint, when it names a known code
//!   2. province name aliases in the text, longest match first
//!   3. a standalone two-digit code in the text
//!   4. a code fragment embedded in the CAP file name
//!
//! A length tie between aliases of different provinces resolves to no match
//! (the later steps may still rescue the bulletin). Matching never guesses
//! between tied candidates.

use regex::Regex;
use std::sync::LazyLock;

use crate::alert::{normalize_text, severity};
use crate::logging::{self, DataSource};
use crate::model::{RawBulletin, RiskLevel};
use crate::provinces::{self, PROVINCE_REGISTRY};

/// Phenomenon used when a warning-level bulletin names no recognizable one.
pub const GENERIC_PHENOMENON: &str = "Fenómeno adverso";

// ---------------------------------------------------------------------------
// Extraction outcome
// ---------------------------------------------------------------------------

/// What one bulletin contributes to the province map.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// An actionable warning resolved to a province.
    Alert {
        province: String,
        level: RiskLevel,
        phenomenon: String,
    },
    /// The text classified as no-risk; contributes nothing.
    NoRisk,
    /// A coastal advisory, excluded from the province map.
    Coastal,
    /// A warning level was found but no province could be resolved.
    Unresolved,
}

/// Extracts the warning carried by one bulletin.
pub fn extract(bulletin: &RawBulletin) -> Extraction {
    let combined = combined_text(bulletin);
    let level = severity::classify(&combined);
    if level == RiskLevel::None {
        return Extraction::NoRisk;
    }
    if is_coastal(&normalize_text(&combined)) {
        return Extraction::Coastal;
    }
    match resolve_province(bulletin) {
        Some(province) => {
            let phenomenon = detect_phenomenon(&bulletin.title, &bulletin.summary)
                .unwrap_or_else(|| GENERIC_PHENOMENON.to_string());
            Extraction::Alert {
                province,
                level,
                phenomenon,
            }
        }
        None => Extraction::Unresolved,
    }
}

fn combined_text(bulletin: &RawBulletin) -> String {
    if bulletin.summary.is_empty() {
        bulletin.title.clone()
    } else {
        format!("{} {}", bulletin.title, bulletin.summary)
    }
}

// ---------------------------------------------------------------------------
// Coastal filter
// ---------------------------------------------------------------------------

static COASTAL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(costero|costeros|coster)\b").unwrap());

/// Coastal advisories cover sea state, not inland provinces, and are
/// excluded from the map. Runs on normalized text.
pub fn is_coastal(normalized: &str) -> bool {
    COASTAL_PATTERN.is_match(normalized)
}

// ---------------------------------------------------------------------------
// Phenomenon detection
// ---------------------------------------------------------------------------

// "aviso naranja POR rachas fuertes EN el litoral" — the phrase between
// "por" and "en" names the phenomenon.
static POR_EN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)por\s+([^,.;\n]+?)\s+(?:en|$)").unwrap());

/// Known phenomenon keywords, scanned in normalized text when the
/// "por ... en" phrase is absent. Pairs of (normalized form, display form).
static PHENOMENON_VOCABULARY: &[(&str, &str)] = &[
    ("viento", "Viento"),
    ("lluvia", "Lluvia"),
    ("nieve", "Nieve"),
    ("niebla", "Niebla"),
    ("tormenta", "Tormenta"),
    ("ola de calor", "Ola de calor"),
    ("ola de frio", "Ola de frío"),
    ("helada", "Helada"),
    ("nevadas", "Nevadas"),
];

/// Finds the phenomenon a bulletin warns about, preferring the title.
///
/// Returns `None` when neither the "por ... en" phrase nor any vocabulary
/// keyword appears; callers fall back to `GENERIC_PHENOMENON`.
pub fn detect_phenomenon(title: &str, summary: &str) -> Option<String> {
    for text in [title, summary] {
        if let Some(caps) = POR_EN_PATTERN.captures(text) {
            let phrase = caps[1].trim();
            if !phrase.is_empty() {
                return Some(capitalize_phrase(phrase));
            }
        }
    }
    let normalized = normalize_text(&format!("{} {}", title, summary));
    for (keyword, display) in PHENOMENON_VOCABULARY {
        if normalized.contains(keyword) {
            return Some((*display).to_string());
        }
    }
    None
}

/// Uppercases the first letter and lowercases the rest, keeping accents.
fn capitalize_phrase(phrase: &str) -> String {
    let mut chars = phrase.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Province resolution
// ---------------------------------------------------------------------------

struct Alias {
    text: String,
    pattern: Regex,
    code: &'static str,
    /// Full name or slash segment, as opposed to a first-word partial.
    full: bool,
}

static ALIAS_TABLE: LazyLock<Vec<Alias>> = LazyLock::new(build_alias_table);

fn push_alias(table: &mut Vec<Alias>, text: &str, code: &'static str, full: bool) {
    if text.is_empty() || table.iter().any(|a| a.text == text && a.code == code) {
        return;
    }
    let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(text))).unwrap();
    table.push(Alias {
        text: text.to_string(),
        pattern,
        code,
        full,
    });
}

fn build_alias_table() -> Vec<Alias> {
    let mut table = Vec::new();
    for province in PROVINCE_REGISTRY {
        let full_name = normalize_text(province.name);
        push_alias(&mut table, &full_name, province.code, true);
        if full_name.contains('/') {
            for segment in full_name.split('/') {
                push_alias(&mut table, segment.trim(), province.code, true);
            }
        }
        // First word of multi-word names as a weak partial ("santa" for
        // Santa Cruz de Tenerife). Articles and single letters are skipped:
        // "la", "las" and "a" would match everywhere.
        let first_segment = full_name.split('/').next().unwrap_or(&full_name);
        if let Some(first_word) = first_segment.split_whitespace().next() {
            if first_word.len() >= 4 && first_word != first_segment {
                push_alias(&mut table, first_word, province.code, false);
            }
        }
    }
    // Longest first, so scans report the most specific alias in diagnostics.
    table.sort_by(|a, b| b.text.len().cmp(&a.text.len()).then(a.code.cmp(b.code)));
    table
}

enum AliasOutcome {
    Match(&'static str),
    Ambiguous(String, String),
    None,
}

fn best_alias_match(normalized: &str, full: bool) -> AliasOutcome {
    let mut best: Option<&Alias> = None;
    let mut tied: Option<&Alias> = None;
    for alias in ALIAS_TABLE.iter().filter(|a| a.full == full) {
        if !alias.pattern.is_match(normalized) {
            continue;
        }
        match best {
            None => best = Some(alias),
            Some(current) if alias.text.len() > current.text.len() => {
                best = Some(alias);
                tied = None;
            }
            Some(current)
                if alias.text.len() == current.text.len() && alias.code != current.code =>
            {
                tied = Some(alias);
            }
            Some(_) => {}
        }
    }
    match (best, tied) {
        (Some(best), Some(tied)) => AliasOutcome::Ambiguous(best.text.clone(), tied.text.clone()),
        (Some(best), None) => AliasOutcome::Match(best.code),
        (None, _) => AliasOutcome::None,
    }
}

fn warn_ambiguous(a: &str, b: &str) {
    logging::warn(
        DataSource::Aemet,
        None,
        &format!(
            "ambiguous province aliases '{}' and '{}', not resolving from name",
            a, b
        ),
    );
}

// Standalone two-digit token in the bulletin text.
static CODE_TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-5][0-9])\b").unwrap());

fn code_token(text: &str) -> Option<&'static str> {
    for caps in CODE_TOKEN_PATTERN.captures_iter(text) {
        if let Some(province) = provinces::find_province(&caps[1]) {
            return Some(province.code);
        }
    }
    None
}

/// Scans a file name for exactly-two-digit runs that are valid codes, e.g.
/// the "28" in "AFAZ28_ES.xml". Longer digit runs (timestamps) never count.
/// Conflicting fragments naming different provinces resolve to nothing.
fn filename_code(file_name: &str) -> Option<&'static str> {
    let bytes = file_name.as_bytes();
    let mut found: Option<&'static str> = None;
    for i in 0..bytes.len().saturating_sub(1) {
        if !bytes[i].is_ascii_digit() || !bytes[i + 1].is_ascii_digit() {
            continue;
        }
        let isolated_before = i == 0 || !bytes[i - 1].is_ascii_digit();
        let isolated_after = i + 2 >= bytes.len() || !bytes[i + 2].is_ascii_digit();
        if !isolated_before || !isolated_after {
            continue;
        }
        let code: String = [bytes[i] as char, bytes[i + 1] as char].iter().collect();
        if let Some(province) = provinces::find_province(&code) {
            match found {
                None => found = Some(province.code),
                Some(existing) if existing != province.code => return None,
                Some(_) => {}
            }
        }
    }
    found
}

/// Resolves the province a bulletin applies to, or `None` if no signal
/// identifies one.
pub fn resolve_province(bulletin: &RawBulletin) -> Option<String> {
    if let Some(hint) = &bulletin.province_hint {
        if provinces::find_province(hint).is_some() {
            return Some(hint.clone());
        }
    }

    let combined = combined_text(bulletin);
    let normalized = normalize_text(&combined);
    match best_alias_match(&normalized, true) {
        AliasOutcome::Match(code) => return Some(code.to_string()),
        AliasOutcome::Ambiguous(a, b) => warn_ambiguous(&a, &b),
        AliasOutcome::None => match best_alias_match(&normalized, false) {
            AliasOutcome::Match(code) => return Some(code.to_string()),
            AliasOutcome::Ambiguous(a, b) => warn_ambiguous(&a, &b),
            AliasOutcome::None => {}
        },
    }

    if let Some(code) = code_token(&combined) {
        return Some(code.to_string());
    }
    if let Some(file_name) = &bulletin.source_file {
        if let Some(code) = filename_code(file_name) {
            return Some(code.to_string());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn bulletin(title: &str, summary: &str) -> RawBulletin {
        RawBulletin::from_text(title, summary)
    }

    // --- Province resolution ------------------------------------------------

    #[test]
    fn test_known_hint_is_authoritative() {
        let mut b = bulletin("Aviso amarillo por lluvia en Madrid", "");
        b.province_hint = Some("08".to_string());
        assert_eq!(
            resolve_province(&b),
            Some("08".to_string()),
            "a region-scoped fetch outranks names in the text"
        );
    }

    #[test]
    fn test_unknown_hint_falls_back_to_text() {
        let mut b = bulletin("Aviso amarillo por lluvia en Madrid", "");
        b.province_hint = Some("99".to_string());
        assert_eq!(resolve_province(&b), Some("28".to_string()));
    }

    #[test]
    fn test_full_name_match_is_accent_insensitive() {
        let b = bulletin("Aviso rojo por ola de calor en CADIZ", "");
        assert_eq!(resolve_province(&b), Some("11".to_string()));
    }

    #[test]
    fn test_bilingual_segment_matches() {
        let b = bulletin("Avís groc a Alacant", "");
        assert_eq!(resolve_province(&b), Some("03".to_string()));
    }

    #[test]
    fn test_longest_name_wins_over_shorter() {
        // "castellon" (9 chars) outranks "leon" (4 chars).
        let b = bulletin("Aviso naranja en Castellón y León", "");
        assert_eq!(resolve_province(&b), Some("12".to_string()));
    }

    #[test]
    fn test_equal_length_tie_is_not_guessed() {
        // "leon" and "jaen" are both 4 chars; neither wins.
        let b = bulletin("Aviso amarillo por lluvia en León y Jaén", "");
        assert_eq!(resolve_province(&b), None);
    }

    #[test]
    fn test_first_word_partial_resolves_tenerife() {
        let b = bulletin("Aviso amarillo por viento en Santa Cruz", "");
        assert_eq!(resolve_province(&b), Some("38".to_string()));
    }

    #[test]
    fn test_partial_requires_word_boundary() {
        // "Santander" must not match the "santa" partial.
        let b = bulletin("Aviso naranja en Santander", "");
        assert_eq!(resolve_province(&b), None);
    }

    #[test]
    fn test_code_token_in_text_resolves() {
        let b = bulletin("Aviso naranja, zona 28", "");
        assert_eq!(resolve_province(&b), Some("28".to_string()));
    }

    #[test]
    fn test_out_of_range_token_is_ignored() {
        let b = bulletin("Aviso naranja, zona 59", "");
        assert_eq!(resolve_province(&b), None);
    }

    #[test]
    fn test_filename_fragment_resolves() {
        let mut b = bulletin("Severe", "");
        b.source_file = Some("Z_CAP_AFAZ28_ES.xml".to_string());
        assert_eq!(resolve_province(&b), Some("28".to_string()));
    }

    #[test]
    fn test_filename_timestamp_digits_do_not_resolve() {
        let mut b = bulletin("Severe", "");
        b.source_file = Some("CAP_20241103093000.xml".to_string());
        assert_eq!(resolve_province(&b), None);
    }

    #[test]
    fn test_conflicting_filename_fragments_do_not_resolve() {
        let mut b = bulletin("Severe", "");
        b.source_file = Some("AFAZ28_31.xml".to_string());
        assert_eq!(resolve_province(&b), None);
    }

    // --- Phenomenon detection -----------------------------------------------

    #[test]
    fn test_por_en_phrase_captures_phenomenon() {
        let found = detect_phenomenon("Aviso naranja por rachas muy fuertes en Alicante", "");
        assert_eq!(found, Some("Rachas muy fuertes".to_string()));
    }

    #[test]
    fn test_por_en_capture_keeps_accents() {
        let found = detect_phenomenon("Aviso rojo por tormenta eléctrica en Teruel", "");
        assert_eq!(found, Some("Tormenta eléctrica".to_string()));
    }

    #[test]
    fn test_title_is_preferred_over_summary() {
        let found = detect_phenomenon(
            "Aviso por nieve en Burgos",
            "Aviso por viento en Burgos",
        );
        assert_eq!(found, Some("Nieve".to_string()));
    }

    #[test]
    fn test_keyword_fallback_without_por_phrase() {
        let found = detect_phenomenon("Aviso amarillo: viento fuerte", "");
        assert_eq!(found, Some("Viento".to_string()));
    }

    #[test]
    fn test_keyword_fallback_is_accent_insensitive() {
        let found = detect_phenomenon("Nucleos de TORMENTA aislados", "");
        assert_eq!(found, Some("Tormenta".to_string()));
    }

    #[test]
    fn test_no_phenomenon_returns_none() {
        assert_eq!(detect_phenomenon("Aviso naranja en Madrid", ""), None);
    }

    // --- Coastal filter -----------------------------------------------------

    #[test]
    fn test_coastal_words_detected() {
        assert!(is_coastal("aviso amarillo por fenomenos costeros en cantabria"));
        assert!(is_coastal("aviso costero"));
        assert!(!is_coastal("aviso amarillo por viento en burgos"));
    }

    // --- Full extraction ----------------------------------------------------

    #[test]
    fn test_extract_full_alert() {
        let b = bulletin(
            "Aviso naranja por viento en A Coruña",
            "Rachas de 100 km/h en el interior",
        );
        assert_eq!(
            extract(&b),
            Extraction::Alert {
                province: "15".to_string(),
                level: RiskLevel::Severe,
                phenomenon: "Viento".to_string(),
            }
        );
    }

    #[test]
    fn test_extract_green_text_is_no_risk() {
        let b = bulletin("Sin avisos activos", "Cielos despejados");
        assert_eq!(extract(&b), Extraction::NoRisk);
    }

    #[test]
    fn test_extract_coastal_advisory_is_excluded() {
        let b = bulletin("Aviso amarillo por fenómenos costeros en Cantabria", "");
        assert_eq!(extract(&b), Extraction::Coastal);
    }

    #[test]
    fn test_extract_unresolvable_warning() {
        let b = bulletin("Aviso rojo por viento en el interior peninsular", "");
        assert_eq!(extract(&b), Extraction::Unresolved);
    }

    #[test]
    fn test_extract_applies_generic_phenomenon() {
        let b = bulletin("Aviso rojo en Madrid", "");
        assert_eq!(
            extract(&b),
            Extraction::Alert {
                province: "28".to_string(),
                level: RiskLevel::Extreme,
                phenomenon: GENERIC_PHENOMENON.to_string(),
            }
        );
    }
}
