use crate::error::TtsEngineError;

/// Normalizes a free-form language hint to the two Zonos-supported codes
/// (§4.3). Any other input is rejected.
pub fn normalize_zonos_lang(raw: Option<&str>) -> Result<&'static str, TtsEngineError> {
    let lowered = raw.unwrap_or("de-de").trim().to_ascii_lowercase();
    match lowered.as_str() {
        "de-de" | "de" | "german" | "deu" => Ok("de"),
        "en-us" | "en" | "english" | "eng" => Ok("en"),
        other => Err(TtsEngineError::LanguageUnsupported(format!(
            "unsupported language: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_german_variants() {
        for input in ["de-de", "DE", "german", "deu"] {
            assert_eq!(normalize_zonos_lang(Some(input)).unwrap(), "de");
        }
    }

    #[test]
    fn normalizes_english_variants() {
        for input in ["en-us", "EN", "english", "eng"] {
            assert_eq!(normalize_zonos_lang(Some(input)).unwrap(), "en");
        }
    }

    #[test]
    fn defaults_to_german_when_absent() {
        assert_eq!(normalize_zonos_lang(None).unwrap(), "de");
    }

    #[test]
    fn rejects_unsupported_language() {
        let err = normalize_zonos_lang(Some("xx-unknown")).unwrap_err();
        assert!(matches!(err, TtsEngineError::LanguageUnsupported(_)));
    }
}
