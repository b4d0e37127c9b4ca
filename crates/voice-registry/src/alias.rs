use std::collections::{HashMap, HashSet};

use crate::engine_kind::EngineKind;

/// Per-engine binding of a canonical voice (§3 `EngineVoice`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineVoice {
    pub voice_id: Option<String>,
    pub model_path: Option<String>,
    pub language: Option<String>,
    pub sample_rate: Option<u32>,
}

impl EngineVoice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_voice_id(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = Some(voice_id.into());
        self
    }

    pub fn with_model_path(mut self, model_path: impl Into<String>) -> Self {
        self.model_path = Some(model_path.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }
}

type VoiceTable = HashMap<String, HashMap<EngineKind, EngineVoice>>;

/// Canonicalizes voice identifiers and resolves `(voice, engine)` pairs to
/// engine-specific parameters (§4.1).
pub struct VoiceAliasRegistry {
    table: VoiceTable,
}

impl VoiceAliasRegistry {
    /// Builds a registry from an explicit table, auto-expanding `de-*` keys
    /// into a `de_DE-*` alias without requiring duplicate config entries.
    pub fn new(entries: VoiceTable) -> Self {
        Self {
            table: expand_locale_aliases(entries),
        }
    }

    /// The table shipped by the reference deployment: a single German voice
    /// bound to Piper and Zonos.
    pub fn with_defaults() -> Self {
        let mut table: VoiceTable = HashMap::new();
        table.insert(
            "de-thorsten-low".to_string(),
            HashMap::from([
                (
                    EngineKind::Piper,
                    EngineVoice::new()
                        .with_model_path("models/piper/de-thorsten-low.onnx")
                        .with_language("de")
                        .with_sample_rate(22_050),
                ),
                (
                    EngineKind::Zonos,
                    EngineVoice::new()
                        .with_voice_id("thorsten")
                        .with_language("de")
                        .with_sample_rate(48_000),
                ),
            ]),
        );
        Self::new(table)
    }

    /// Normalizes a raw voice identifier: `xx_YY-tail` becomes `xx-tail`;
    /// leading/trailing whitespace is trimmed. Already-canonical input is
    /// returned unchanged.
    pub fn canonicalize(raw: &str) -> String {
        let trimmed = raw.trim();
        if let Some(rest) = locale_alias_tail(trimmed) {
            format!("{}-{}", &trimmed[..2], rest)
        } else {
            trimmed.to_string()
        }
    }

    /// Resolves `(voice, engine)` to its binding, or `None` if the engine is
    /// not gated in for that voice.
    pub fn resolve(&self, voice: &str, engine: EngineKind) -> Option<&EngineVoice> {
        let canonical = Self::canonicalize(voice);
        self.table.get(&canonical).and_then(|m| m.get(&engine))
    }

    /// The set of engines with an explicit binding for `voice`.
    pub fn engines_for(&self, voice: &str) -> HashSet<EngineKind> {
        let canonical = Self::canonicalize(voice);
        self.table
            .get(&canonical)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn known_voices(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }
}

/// If `s` starts with `xx_YY-` (two lowercase ASCII letters, underscore, two
/// uppercase ASCII letters, hyphen), returns the tail after that prefix.
fn locale_alias_tail(s: &str) -> Option<&str> {
    let bytes = s.as_bytes();
    if bytes.len() < 7 {
        return None;
    }
    let is_lower = |b: u8| b.is_ascii_lowercase();
    let is_upper = |b: u8| b.is_ascii_uppercase();
    if is_lower(bytes[0]) && is_lower(bytes[1]) && bytes[2] == b'_' && is_upper(bytes[3]) && is_upper(bytes[4]) && bytes[5] == b'-' {
        Some(&s[6..])
    } else {
        None
    }
}

fn expand_locale_aliases(entries: VoiceTable) -> VoiceTable {
    let mut expanded = entries.clone();
    for (key, bindings) in &entries {
        if let Some(tail) = key.strip_prefix("de-") {
            let alias = format!("de_DE-{tail}");
            expanded.entry(alias).or_insert_with(|| bindings.clone());
        }
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_is_identity_on_canonical_input() {
        assert_eq!(
            VoiceAliasRegistry::canonicalize("de-thorsten-low"),
            "de-thorsten-low"
        );
    }

    #[test]
    fn canonicalize_strips_locale_region() {
        assert_eq!(
            VoiceAliasRegistry::canonicalize("de_DE-thorsten-low"),
            "de-thorsten-low"
        );
    }

    #[test]
    fn canonicalize_trims_whitespace() {
        assert_eq!(
            VoiceAliasRegistry::canonicalize("  de_DE-thorsten-low  "),
            "de-thorsten-low"
        );
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = VoiceAliasRegistry::canonicalize("de_DE-thorsten-low");
        let twice = VoiceAliasRegistry::canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn default_table_auto_expands_locale_alias() {
        let registry = VoiceAliasRegistry::with_defaults();
        assert!(registry.resolve("de-thorsten-low", EngineKind::Piper).is_some());
        assert!(registry
            .resolve("de_DE-thorsten-low", EngineKind::Piper)
            .is_some());
    }

    #[test]
    fn missing_engine_binding_is_a_hard_gate() {
        let registry = VoiceAliasRegistry::with_defaults();
        assert!(registry.resolve("de-thorsten-low", EngineKind::Kokoro).is_none());
    }

    #[test]
    fn engines_for_reports_bound_engines_only() {
        let registry = VoiceAliasRegistry::with_defaults();
        let engines = registry.engines_for("de-thorsten-low");
        assert!(engines.contains(&EngineKind::Piper));
        assert!(engines.contains(&EngineKind::Zonos));
        assert!(!engines.contains(&EngineKind::Kokoro));
    }

    #[test]
    fn unknown_voice_has_no_engines() {
        let registry = VoiceAliasRegistry::with_defaults();
        assert!(registry.engines_for("xx-nobody-low").is_empty());
    }
}
