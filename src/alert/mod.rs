//! Bulletin classification: severity, phenomenon, province, reduction.
//!
//! Everything in this module is pure text processing over `RawBulletin`s.
//! Matching is accent- and case-insensitive, so the shared normalization
//! lives here and both submodules scan normalized text.

pub mod extract;
pub mod reduce;
pub mod severity;

/// Lowercases text and folds the diacritics that appear in Spanish, Catalan,
/// Galician and Basque place names and forecast prose.
///
/// The fold is a fixed character map, not full Unicode decomposition: the
/// upstream vocabulary is known and small, and a fixed map keeps matching
/// deterministic ("Ávila" → "avila", "València" → "valencia").
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.to_lowercase().chars() {
        out.push(match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            _ => c,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_strips_accents() {
        assert_eq!(normalize_text("Ávila"), "avila");
        assert_eq!(normalize_text("CÁDIZ"), "cadiz");
        assert_eq!(normalize_text("A Coruña"), "a coruna");
        assert_eq!(normalize_text("València"), "valencia");
    }

    #[test]
    fn test_normalize_preserves_punctuation_and_digits() {
        assert_eq!(
            normalize_text("Alicante/Alacant: nivel 3"),
            "alicante/alacant: nivel 3"
        );
    }

    #[test]
    fn test_normalize_handles_full_forecast_phrase() {
        assert_eq!(
            normalize_text("Aviso NARANJA por Fenómenos costeros en Cantabria"),
            "aviso naranja por fenomenos costeros en cantabria"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_text("Castellón/Castelló");
        assert_eq!(normalize_text(&once), once);
    }
}
