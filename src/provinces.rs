//! Province registry for the AEMET warning service.
//!
//! Defines the canonical list of the 52 warning areas AEMET issues bulletins
//! for: the 50 provinces plus the autonomous cities Ceuta and Melilla. This is
//! the single source of truth for area codes — the snapshot file, the reducer
//! and the per-region retriever all take their code set from here rather than
//! hardcoding it.
//!
//! Codes are the INE two-digit province codes, which AEMET reuses as area
//! identifiers and which also match the leading two digits of postal codes.

// ---------------------------------------------------------------------------
// Province metadata
// ---------------------------------------------------------------------------

/// Metadata for a single AEMET warning area.
pub struct Province {
    /// Two-digit INE code, zero-padded ("01".."52").
    pub code: &'static str,
    /// Official name. Bilingual provinces carry both forms separated by
    /// a slash, as published by INE.
    pub name: &'static str,
}

/// All 52 AEMET warning areas, in code order.
pub static PROVINCE_REGISTRY: &[Province] = &[
    Province { code: "01", name: "Araba/Álava" },
    Province { code: "02", name: "Albacete" },
    Province { code: "03", name: "Alicante/Alacant" },
    Province { code: "04", name: "Almería" },
    Province { code: "05", name: "Ávila" },
    Province { code: "06", name: "Badajoz" },
    Province { code: "07", name: "Illes Balears" },
    Province { code: "08", name: "Barcelona" },
    Province { code: "09", name: "Burgos" },
    Province { code: "10", name: "Cáceres" },
    Province { code: "11", name: "Cádiz" },
    Province { code: "12", name: "Castellón/Castelló" },
    Province { code: "13", name: "Ciudad Real" },
    Province { code: "14", name: "Córdoba" },
    Province { code: "15", name: "A Coruña" },
    Province { code: "16", name: "Cuenca" },
    Province { code: "17", name: "Girona" },
    Province { code: "18", name: "Granada" },
    Province { code: "19", name: "Guadalajara" },
    Province { code: "20", name: "Gipuzkoa" },
    Province { code: "21", name: "Huelva" },
    Province { code: "22", name: "Huesca" },
    Province { code: "23", name: "Jaén" },
    Province { code: "24", name: "León" },
    Province { code: "25", name: "Lleida" },
    Province { code: "26", name: "La Rioja" },
    Province { code: "27", name: "Lugo" },
    Province { code: "28", name: "Madrid" },
    Province { code: "29", name: "Málaga" },
    Province { code: "30", name: "Murcia" },
    Province { code: "31", name: "Navarra" },
    Province { code: "32", name: "Ourense" },
    Province { code: "33", name: "Asturias" },
    Province { code: "34", name: "Palencia" },
    Province { code: "35", name: "Las Palmas" },
    Province { code: "36", name: "Pontevedra" },
    Province { code: "37", name: "Salamanca" },
    Province { code: "38", name: "Santa Cruz de Tenerife" },
    Province { code: "39", name: "Cantabria" },
    Province { code: "40", name: "Segovia" },
    Province { code: "41", name: "Sevilla" },
    Province { code: "42", name: "Soria" },
    Province { code: "43", name: "Tarragona" },
    Province { code: "44", name: "Teruel" },
    Province { code: "45", name: "Toledo" },
    Province { code: "46", name: "Valencia/València" },
    Province { code: "47", name: "Valladolid" },
    Province { code: "48", name: "Bizkaia" },
    Province { code: "49", name: "Zamora" },
    Province { code: "50", name: "Zaragoza" },
    Province { code: "51", name: "Ceuta" },
    Province { code: "52", name: "Melilla" },
];

/// Returns all area codes in registry order.
pub fn all_codes() -> Vec<&'static str> {
    PROVINCE_REGISTRY.iter().map(|p| p.code).collect()
}

/// Looks up a province by code. Returns `None` if not found.
pub fn find_province(code: &str) -> Option<&'static Province> {
    PROVINCE_REGISTRY.iter().find(|p| p.code == code)
}

/// Returns the official name for a code, or a generic fallback for codes
/// outside the registry (used when rendering rows from a hand-edited file).
pub fn province_name(code: &str) -> String {
    match find_province(code) {
        Some(p) => p.name.to_string(),
        None => format!("Provincia {}", code),
    }
}

/// Resolves a postal code to its province code.
///
/// Spanish postal codes embed the INE province code as their first two
/// digits, so this is a prefix extraction. Registered prefixes are their
/// own codes, and an unmapped numeric prefix passes through unchanged for
/// the caller to resolve. Returns `None` only for postal codes that are
/// too short or non-numeric.
pub fn code_from_postal(postal: &str) -> Option<String> {
    let trimmed = postal.trim();
    if trimmed.len() < 2 || !trimmed.is_char_boundary(2) {
        return None;
    }
    let prefix = &trimmed[..2];
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(prefix.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_52_areas() {
        // 50 provinces plus Ceuta and Melilla. A missing entry would make the
        // reducer drop that area from every snapshot.
        assert_eq!(PROVINCE_REGISTRY.len(), 52);
    }

    #[test]
    fn test_all_codes_are_zero_padded_two_digit_numeric() {
        for province in PROVINCE_REGISTRY {
            assert_eq!(
                province.code.len(),
                2,
                "code for '{}' should be two digits, got '{}'",
                province.name,
                province.code
            );
            assert!(
                province.code.chars().all(|c| c.is_ascii_digit()),
                "code for '{}' should be numeric, got '{}'",
                province.name,
                province.code
            );
        }
    }

    #[test]
    fn test_codes_are_sequential_01_through_52() {
        for (i, province) in PROVINCE_REGISTRY.iter().enumerate() {
            let expected = format!("{:02}", i + 1);
            assert_eq!(
                province.code, expected,
                "registry should be in code order with no gaps"
            );
        }
    }

    #[test]
    fn test_no_duplicate_names() {
        let mut seen = std::collections::HashSet::new();
        for province in PROVINCE_REGISTRY {
            assert!(
                seen.insert(province.name),
                "duplicate province name '{}' in registry",
                province.name
            );
        }
    }

    #[test]
    fn test_find_province_returns_correct_entry() {
        let madrid = find_province("28").expect("Madrid should be in registry");
        assert_eq!(madrid.name, "Madrid");
        let melilla = find_province("52").expect("Melilla should be in registry");
        assert_eq!(melilla.name, "Melilla");
    }

    #[test]
    fn test_find_province_rejects_unknown_and_unpadded_codes() {
        assert!(find_province("00").is_none());
        assert!(find_province("53").is_none());
        assert!(find_province("8").is_none(), "codes must be zero-padded");
        assert!(find_province("").is_none());
    }

    #[test]
    fn test_province_name_falls_back_for_unknown_code() {
        assert_eq!(province_name("28"), "Madrid");
        assert_eq!(province_name("99"), "Provincia 99");
    }

    #[test]
    fn test_bilingual_names_keep_both_forms() {
        let alicante = find_province("03").unwrap();
        assert!(alicante.name.contains('/'), "Alicante/Alacant keeps both forms");
        let valencia = find_province("46").unwrap();
        assert_eq!(valencia.name, "Valencia/València");
    }

    #[test]
    fn test_code_from_postal_extracts_valid_prefix() {
        assert_eq!(code_from_postal("28013").as_deref(), Some("28")); // Madrid centro
        assert_eq!(code_from_postal("08001").as_deref(), Some("08")); // Barcelona
        assert_eq!(code_from_postal("52006").as_deref(), Some("52")); // Melilla
    }

    #[test]
    fn test_code_from_postal_passes_unmapped_prefix_through() {
        assert_eq!(
            code_from_postal("99999").as_deref(),
            Some("99"),
            "unmapped prefix passes through for the caller to resolve"
        );
        assert_eq!(code_from_postal("00100").as_deref(), Some("00"));
    }

    #[test]
    fn test_code_from_postal_rejects_invalid_input() {
        assert_eq!(code_from_postal("7"), None, "too short");
        assert_eq!(code_from_postal("ABCDE"), None, "non-numeric");
        assert_eq!(code_from_postal("€2801"), None, "non-ASCII prefix");
        assert_eq!(code_from_postal(""), None);
    }

    #[test]
    fn test_code_from_postal_trims_whitespace() {
        assert_eq!(code_from_postal(" 28013 ").as_deref(), Some("28"));
    }
}
