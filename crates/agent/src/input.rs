//! Parsing of newline-delimited JSON event lines from stdin.

use beacon_core::Metadata;
use serde::Deserialize;

/// One event read from stdin, e.g.
/// `{"name": "app.launched", "metadata": {"os": "linux"}}`.
#[derive(Debug, Deserialize)]
pub struct EventLine {
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Parse one line; empty and whitespace-only lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<EventLine, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}
