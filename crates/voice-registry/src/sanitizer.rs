//! Deterministic text sanitization before synthesis (§4.2).
//!
//! Pipeline: NFKC -> NFD -> drop `Mn` -> typographic substitution ->
//! fallback character map -> allowed-set filter -> whitespace collapse -> NFC.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use unicode_categories::UnicodeCategories;
use unicode_normalization::UnicodeNormalization;

const TYPOGRAPHIC_MAP: &[(char, &str)] = &[
    ('\u{2013}', "-"),  // en dash
    ('\u{2014}', "-"),  // em dash
    ('\u{2212}', "-"),  // minus sign
    ('\u{2018}', "'"),  // left single quote
    ('\u{2019}', "'"),  // right single quote
    ('\u{201C}', "\""), // left double quote
    ('\u{201D}', "\""), // right double quote
    ('\u{201E}', "\""), // low double quote
    ('\u{2026}', "..."), // ellipsis
    ('\u{00A0}', " "),  // no-break space
];

const FALLBACK_MAP: &[(char, char)] = &[
    ('ł', 'l'),
    ('Ł', 'L'),
    ('đ', 'd'),
    ('Đ', 'D'),
    ('ø', 'o'),
    ('Ø', 'O'),
    ('ð', 'd'),
    ('Ð', 'D'),
];

fn allowed_set() -> &'static HashSet<char> {
    static ALLOWED: Lazy<HashSet<char>> = Lazy::new(|| {
        let mut set: HashSet<char> = HashSet::new();
        set.extend('a'..='z');
        set.extend('A'..='Z');
        set.extend("äöüßÄÖÜ".chars());
        set.extend('0'..='9');
        set.extend(" .,!?;:-'\"()".chars());
        set
    });
    &ALLOWED
}

fn typographic_replacement(ch: char) -> Option<&'static str> {
    TYPOGRAPHIC_MAP
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, repl)| *repl)
}

fn fallback_replacement(ch: char) -> Option<char> {
    FALLBACK_MAP
        .iter()
        .find(|(c, _)| *c == ch)
        .map(|(_, repl)| *repl)
}

static WARNED_CODEPOINTS: Lazy<Mutex<HashSet<u32>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn warn_once(ch: char) {
    let mut seen = WARNED_CODEPOINTS.lock();
    if seen.insert(ch as u32) {
        tracing::warn!(codepoint = format!("U+{:04X}", ch as u32), char = %ch, "dropping unsupported codepoint from tts input");
    }
}

/// Runs the full sanitization pipeline. Idempotent: `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let nfkc: String = text.nfkc().collect();
    let nfd: String = nfkc.nfd().collect();

    let no_marks: String = nfd.chars().filter(|c| !c.is_mark_nonspacing()).collect();

    let mut substituted = String::with_capacity(no_marks.len());
    for ch in no_marks.chars() {
        if let Some(repl) = typographic_replacement(ch) {
            substituted.push_str(repl);
        } else if let Some(repl) = fallback_replacement(ch) {
            substituted.push(repl);
        } else {
            substituted.push(ch);
        }
    }

    let allowed = allowed_set();
    let mut cleaned = String::with_capacity(substituted.len());
    for ch in substituted.chars() {
        if allowed.contains(&ch) {
            cleaned.push(ch);
        } else if !ch.is_whitespace() {
            warn_once(ch);
        }
    }

    let collapsed = collapse_whitespace(&cleaned);
    collapsed.nfc().collect()
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = false;
    for ch in s.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

/// Final guard applied immediately before handing text to an engine adapter
/// (§4.2): re-runs [`sanitize`] then strips any residual combining mark that
/// could have been reintroduced upstream, re-normalizing to NFC.
pub fn pre_clean_for_tts(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let cleaned = sanitize(text);
    let without_residual_marks: String = cleaned.chars().filter(|c| !c.is_mark_nonspacing()).collect();
    without_residual_marks.nfc().collect()
}
