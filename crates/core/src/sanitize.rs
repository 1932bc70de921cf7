//! Metadata sanitization.
//!
//! A [`Sanitizer`] is a pure function over the metadata map: the pipeline
//! runs it once at `track()` time, before the event is sized and queued.
//! Implementations must return the same key set or a narrower one.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::event::Metadata;

/// Scrubs PII and secrets out of event metadata before admission.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, metadata: Metadata) -> Metadata;
}

// ---------------------------------------------------------------------------
// NoopSanitizer
// ---------------------------------------------------------------------------

/// Identity sanitizer for trusted metadata and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSanitizer;

impl Sanitizer for NoopSanitizer {
    fn sanitize(&self, metadata: Metadata) -> Metadata {
        metadata
    }
}

// ---------------------------------------------------------------------------
// KeyDenySanitizer
// ---------------------------------------------------------------------------

/// Metadata keys that are never shipped, compared case-insensitively.
const DEFAULT_DENIED_KEYS: [&str; 7] = [
    "password",
    "secret",
    "token",
    "api_key",
    "authorization",
    "cookie",
    "ssn",
];

static RE_EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .expect("hard-coded pattern compiles")
});

static RE_BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/-]+=*").expect("hard-coded pattern compiles")
});

static RE_LONG_SECRET: LazyLock<Regex> = LazyLock::new(|| {
    // Long unbroken base64-ish runs are almost always keys or tokens.
    Regex::new(r"[A-Za-z0-9+/]{40,}={0,2}").expect("hard-coded pattern compiles")
});

/// Drops deny-listed keys outright and masks secret-shaped values.
///
/// Value masking replaces the matched span with a typed placeholder so the
/// rest of the value stays useful for debugging.
pub struct KeyDenySanitizer {
    denied: HashSet<String>,
}

impl KeyDenySanitizer {
    /// Sanitizer with the built-in deny list.
    pub fn new() -> Self {
        Self::with_denied_keys(DEFAULT_DENIED_KEYS.iter().copied())
    }

    /// Sanitizer with a caller-supplied deny list (case-insensitive).
    pub fn with_denied_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            denied: keys
                .into_iter()
                .map(|k| k.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    fn mask(value: &str) -> String {
        let value = RE_BEARER.replace_all(value, "[TOKEN]");
        let value = RE_EMAIL.replace_all(&value, "[EMAIL]");
        RE_LONG_SECRET.replace_all(&value, "[SECRET]").into_owned()
    }
}

impl Default for KeyDenySanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sanitizer for KeyDenySanitizer {
    fn sanitize(&self, metadata: Metadata) -> Metadata {
        metadata
            .into_iter()
            .filter(|(key, _)| !self.denied.contains(&key.to_ascii_lowercase()))
            .map(|(key, value)| {
                let masked = Self::mask(&value);
                (key, masked)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
