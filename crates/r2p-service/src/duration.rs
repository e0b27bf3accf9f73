//! Free-form delay parsing for `ready`.
//!
//! Accepts what members actually type after the command: `1h30`, `15m`,
//! `90`, `2 heures`, `1,5h`. Matching is case-insensitive and a comma is
//! accepted as decimal point.
//!
//! One hours token and one minutes token are matched independently and removed
//! from the text, hours first. When no minutes token is present, the first
//! bare number left in the text counts as minutes, so `90` is ninety minutes
//! and `1h30` is an hour and a half. Text with no number at all yields 0.

use regex::Regex;
use std::sync::OnceLock;

// ASCII digits only: `\d` would also match digits `f64::from_str` rejects
const HOURS_PATTERN: &str = r"([0-9]+(?:\.[0-9]+)?)\s*(?:heures|heure|h)";
const MINUTES_PATTERN: &str = r"([0-9]+(?:\.[0-9]+)?)\s*(?:minutes|minute|mins|min|m)";
const BARE_NUMBER_PATTERN: &str = r"[0-9]+(?:\.[0-9]+)?";

#[expect(
    clippy::expect_used,
    reason = "Patterns are constants exercised by the unit tests below"
)]
fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("duration pattern must compile"))
}

fn hours_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, HOURS_PATTERN)
}

fn minutes_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, MINUTES_PATTERN)
}

fn bare_number_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, BARE_NUMBER_PATTERN)
}

/// Extract the first `pattern` match, returning its number and the text with
/// the token removed.
fn take_token(regex: &Regex, text: &str) -> Option<(f64, String)> {
    let captures = regex.captures(text)?;
    let whole = captures.get(0)?;
    let value = captures.get(1)?.as_str().parse::<f64>().ok()?;

    let mut rest = String::with_capacity(text.len());
    rest.push_str(text.get(..whole.start()).unwrap_or_default());
    rest.push(' ');
    rest.push_str(text.get(whole.end()..).unwrap_or_default());

    Some((value, rest))
}

/// Parse delay text into a number of seconds.
///
/// Returns 0 when nothing could be read. Callers treat a present-but-zero
/// delay as invalid input.
#[must_use]
// Input only matches unsigned decimals and float-to-int casts saturate.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_seconds(text: &str) -> u64 {
    let mut remaining = text.to_lowercase().replace(',', ".");

    let mut hours = 0.0;
    if let Some((value, rest)) = take_token(hours_regex(), &remaining) {
        hours = value;
        remaining = rest;
    }

    let minutes = match take_token(minutes_regex(), &remaining) {
        Some((value, _)) => value,
        None => bare_number_regex()
            .find(&remaining)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .unwrap_or(0.0),
    };

    (hours * 3600.0 + minutes * 60.0).round() as u64
}

/// Restate a delay for acknowledgements, e.g. `1 h 30 min`.
#[must_use]
pub fn humanize(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours} h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes} min"));
    }
    if seconds > 0 || parts.is_empty() {
        parts.push(format!("{seconds} s"));
    }
    parts.join(" ")
}
