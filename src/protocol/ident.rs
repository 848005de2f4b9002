//! Deterministic protocol-ID derivation.
//!
//! A protocol keeps an explicit `Protocol ID` only when it is a clean,
//! stable slug; temporary `auto_*` ids and anything unstable are replaced
//! with a slug derived from the file stem. The derivation is idempotent.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

fn keep_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9 _-]+").unwrap_or_else(|_| unreachable!()))
}

fn collapse_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s-]+").unwrap_or_else(|_| unreachable!()))
}

fn slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]+(_[a-z0-9]+)*$").unwrap_or_else(|_| unreachable!()))
}

fn auto_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^auto_[0-9]+(_[0-9]+)?$").unwrap_or_else(|_| unreachable!()))
}

/// Converts a string to a snake_case slug.
///
/// NFKD-normalises, drops combining marks, keeps `[A-Za-z0-9 _-]`,
/// collapses whitespace and dashes to a single underscore, lower-cases.
#[must_use]
pub fn to_snake_slug(name: &str) -> String {
    let decomposed: String = name.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    let kept = keep_chars_re().replace_all(&decomposed, "");
    let collapsed = collapse_re().replace_all(kept.trim(), "_");
    collapsed.to_lowercase()
}

/// Whether `s` is a clean, stable slug: snake_case and not a temporary
/// `auto_*` id.
#[must_use]
pub fn is_clean_stable_slug(s: &str) -> bool {
    slug_re().is_match(s) && !auto_id_re().is_match(s)
}

/// Derives a deterministic `protocol_id` from the source path and any
/// explicit id the document carries.
///
/// Rules:
/// - a clean, stable explicit id is kept as-is;
/// - otherwise the file stem is slugged with [`to_snake_slug`].
///
/// Returns `(protocol_id, changed)`; `changed` is true when the document's
/// id was replaced. Callers may persist the corrected id back to the
/// document.
#[must_use]
pub fn derive_protocol_id(file_path: &Path, explicit_id: Option<&str>) -> (String, bool) {
    let existing = explicit_id.unwrap_or_default().trim();
    let file_slug = to_snake_slug(
        file_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default(),
    );

    if !existing.is_empty() && is_clean_stable_slug(existing) {
        // An explicit clean slug wins, even when it differs from the stem.
        return (existing.to_string(), false);
    }

    let changed = existing != file_slug;
    (file_slug, changed)
}
