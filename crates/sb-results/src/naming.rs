//! Run ids, timestamps and human-readable run names.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DISPLAY_FORMAT: &str = "%B %d, %Y at %I:%M %p";
const COMPACT_ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Run id for a run started at `now`, e.g. `20250115_103000`.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format(COMPACT_ID_FORMAT).to_string()
}

/// Run date for a run started at `now`, RFC 3339 in UTC.
pub fn new_run_date(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 date, keeping the wall-clock time of any offset.
pub fn parse_timestamp(date: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.naive_local());
    }

    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a compact 14-digit timestamp id such as `20250115_103000`.
pub fn parse_compact_id(run_id: &str) -> Option<NaiveDateTime> {
    let digits: String = run_id.chars().filter(|c| c.is_ascii_digit()).collect();
    let separators_only = run_id
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '_' | '-' | 'T'));
    if digits.len() != 14 || !separators_only {
        return None;
    }
    NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S").ok()
}

/// Name shown for a run: its date, else a date recovered from the id, else a
/// tidied version of the id.
pub fn display_name(run_id: &str, date: &str) -> String {
    if let Some(dt) = parse_timestamp(date).or_else(|| parse_compact_id(run_id)) {
        return dt.format(DISPLAY_FORMAT).to_string();
    }
    title_case(&run_id.replace('_', " "))
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_cased = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_cased = true;
        } else {
            out.push(c);
            prev_cased = false;
        }
    }
    out
}
