//! Language code normalisation.

use crate::error::{Result, RouteError};

/// Fixed mapping from bare language codes to the BCP-47 locale the
/// providers expect.
const LOCALES: [(&str, &str); 20] = [
    ("ar", "ar-XA"),
    ("de", "de-DE"),
    ("en", "en-US"),
    ("es", "es-ES"),
    ("fr", "fr-FR"),
    ("hi", "hi-IN"),
    ("id", "id-ID"),
    ("it", "it-IT"),
    ("ja", "ja-JP"),
    ("ko", "ko-KR"),
    ("nl", "nl-NL"),
    ("pl", "pl-PL"),
    ("pt", "pt-BR"),
    ("ru", "ru-RU"),
    ("sv", "sv-SE"),
    ("th", "th-TH"),
    ("tr", "tr-TR"),
    ("uk", "uk-UA"),
    ("vi", "vi-VN"),
    ("zh", "cmn-CN"),
];

/// Normalises a language code to a BCP-47 locale.
///
/// Codes already carrying a region subtag pass through unchanged; bare
/// codes resolve through the fixed table.
pub fn normalize_language(lang: &str) -> Result<String> {
    let lang = lang.trim();
    if lang.is_empty() {
        return Err(RouteError::InvalidRequest("empty language code".into()));
    }

    if lang.contains('-') {
        return Ok(lang.to_string());
    }

    let lower = lang.to_ascii_lowercase();
    LOCALES
        .iter()
        .find(|(bare, _)| *bare == lower)
        .map(|(_, locale)| locale.to_string())
        .ok_or_else(|| RouteError::InvalidRequest(format!("unmapped language code: {lang}")))
}
