//! Key normalization for setter lookup

use convert_case::{Case, Casing};

/// Convert a hyphen-separated key to camel case (`max-wait` -> `maxWait`)
///
/// Underscores are treated like hyphens. Keys that are already camel case are
/// returned unchanged.
pub fn to_camel_case(key: &str) -> String {
    key.to_case(Case::Camel)
}

/// Normalize a configuration key for case-insensitive setter lookup
///
/// `max-wait`, `max_wait`, `maxWait` and `MAXWAIT` all map to `MAXWAIT`.
pub fn normalize_key(key: &str) -> String {
    to_camel_case(key.trim()).to_uppercase()
}
