//! Post-processing: pull a JSON payload out of free-form model text.
//!
//! Models asked for "only JSON" still wrap their answer in a Markdown code
//! fence often enough that every structured call needs the same cleanup.
//! This module is the single place that cleanup lives.
//!
//! ## Grammar
//!
//! ```text
//! response := ws* fence_open? ws* payload ws* fence_close? ws*
//! fence_open  := "```" ( "json" )?        (tag is case-insensitive)
//! fence_close := "```"
//! ```
//!
//! The opening and closing fences are stripped independently, so a response
//! truncated before its closing fence still parses. Nothing else is repaired:
//! if the payload is not valid JSON for the requested type the caller gets
//! exactly one failure mode, a `serde_json::Error`, and substitutes its own
//! default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::warn;

static RE_OPEN_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^```(?:json)?").unwrap());

static RE_CLOSE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```$").unwrap());

/// Strip an optional surrounding code fence and whitespace.
pub fn extract_json_payload(text: &str) -> &str {
    let s = text.trim();
    let s = match RE_OPEN_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = s.trim();
    let s = match RE_CLOSE_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

/// Parse model output as `T` after fence stripping.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(extract_json_payload(text))
}

/// Parse model output as `T`, falling back to `default` on any parse error.
pub fn parse_or_else<T, F>(text: &str, what: &str, default: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match parse_model_json(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse {} JSON: {}", what, e);
            default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
