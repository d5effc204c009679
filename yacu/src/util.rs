//! Small helpers shared by the orchestrator modules.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whole days elapsed between `since` and `now`, truncated toward zero.
pub fn days_passed(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_hours() / 24
}

/// Strip the algorithm prefix (`sha256:`) from an id, if present.
pub fn id_encoded(id: &str) -> &str {
    match id.split_once(':') {
        Some((_, encoded)) => encoded,
        None => id,
    }
}

/// First 12 characters of the encoded id, the form `docker ps` prints.
pub fn short_id(id: &str) -> &str {
    let encoded = id_encoded(id);
    match encoded.char_indices().nth(12) {
        Some((idx, _)) => &encoded[..idx],
        None => encoded,
    }
}

/// Parse a boolean label value.
///
/// Accepts the same spellings as the labels written by compose tooling:
/// `1 t T TRUE true True 0 f F FALSE false False`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Render a duration as `N day(s), N hour(s), N minute(s) and N second(s)`,
/// dropping the leading units that are zero.
pub fn humanize_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if total < 60 {
        format!("{} second(s)", seconds)
    } else if total < 3_600 {
        format!("{} minute(s) and {} second(s)", minutes, seconds)
    } else if total < 86_400 {
        format!(
            "{} hour(s), {} minute(s) and {} second(s)",
            hours, minutes, seconds
        )
    } else {
        format!(
            "{} day(s), {} hour(s), {} minute(s) and {} second(s)",
            days, hours, minutes, seconds
        )
    }
}
