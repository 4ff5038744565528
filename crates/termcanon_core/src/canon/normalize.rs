//! Raw term normalization.
//!
//! # Invariants
//! - `normalize` is total and deterministic.
//! - Output contains no leading/trailing whitespace and no whitespace runs.
//! - `+`, `#` and `-` survive so that `c++`, `c#` and `ts-lang` stay distinct.

use crate::model::term::NormalizedKey;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static STRIPPED_CHARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\p{L}\p{M}\p{N}\s_/+#-]+").expect("valid stripped chars regex")
});
static SEPARATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s_/]+").expect("valid separator regex"));

/// Maps a raw term spelling to its normalized key.
///
/// Rules, applied in order:
/// - Unicode NFKC compatibility fold.
/// - Unicode lowercasing.
/// - Punctuation and symbols removed, except `+`, `#`, `-`.
/// - Whitespace, `_` and `/` runs collapsed to one space, then trimmed.
/// - NFKC again, so marks freed by stripping compose with their base.
pub fn normalize(raw: &str) -> NormalizedKey {
    let folded: String = raw.nfkc().collect::<String>().to_lowercase();
    let stripped = STRIPPED_CHARS_RE.replace_all(&folded, "");
    let collapsed = SEPARATOR_RE.replace_all(&stripped, " ");
    let recomposed: String = collapsed.trim().nfkc().collect();
    NormalizedKey::from_normalized(recomposed)
}

/// Returns whether `value` is already in normalized form.
pub fn is_normalized(value: &str) -> bool {
    normalize(value).as_str() == value
}
