//! Timestamp extraction from free-form chat text.
//!
//! Accepted formats: `h:mm:ss`, `m:ss`, `XhYmZs` (any combination ending in
//! seconds), "`X` min" with optional "`Y` sec", and a bare "`N` s". Anything
//! ambiguous (for example "2 25") deliberately does not match; the caller
//! falls through to semantic retrieval rather than guessing.

use std::sync::LazyLock;

use regex::Regex;

static CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(\d{1,2}):)?(\d{1,2}):(\d{2})\b").expect("valid clock pattern")
});

static UNITS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:(\d+)\s*h(?:ours?)?\s*)?(?:(\d+)\s*m(?:in(?:ute)?s?)?\s*)?(?:(\d+)\s*s(?:ec(?:ond)?s?)?)\b")
        .expect("valid units pattern")
});

static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*min(?:ute)?s?\b").expect("valid minutes pattern"));

static SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d+)\s*sec(?:ond)?s?\b").expect("valid seconds pattern"));

fn group_u64(caps: &regex::Captures<'_>, i: usize) -> u64 {
    caps.get(i)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Parse an explicit timestamp reference out of a chat message.
///
/// Returns the referenced time in seconds, or `None` when the message holds
/// no unambiguous timestamp.
pub fn parse_timestamp_seconds(message: &str) -> Option<f64> {
    let msg = message.to_lowercase();

    // h:mm:ss or m:ss
    if let Some(caps) = CLOCK.captures(&msg) {
        let h = group_u64(&caps, 1);
        let m = group_u64(&caps, 2);
        let s = group_u64(&caps, 3);
        return Some((h * 3600 + m * 60 + s) as f64);
    }

    // XhYmZs style, seconds component required
    if let Some(caps) = UNITS.captures(&msg) {
        let h = group_u64(&caps, 1);
        let m = group_u64(&caps, 2);
        let s = group_u64(&caps, 3);
        if h > 0 || m > 0 || s > 0 {
            return Some((h * 3600 + m * 60 + s) as f64);
        }
    }

    // "X minutes" with optional "Y seconds"
    if let Some(caps) = MINUTES.captures(&msg) {
        let mut total = group_u64(&caps, 1) * 60;
        if let Some(sec_caps) = SECONDS.captures(&msg) {
            total += group_u64(&sec_caps, 1);
        }
        return Some(total as f64);
    }

    None
}
