//! Date promotion for plain JSON bodies.
//!
//! Plain JSON has no date type, so servers send instants as ISO-8601 strings.
//! The JSON codec runs every string through a `DatePromoter` and turns the
//! ones it accepts into `Value::Date`. Swapping the promoter changes which
//! strings count as dates without touching the decode pipeline.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Decides whether a decoded string is really a date.
pub type DatePromoter = fn(&str) -> Option<DateTime<Utc>>;

static ISO_MILLIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d{3}Z$").expect("static pattern is valid")
});

/// Promote strings shaped like `2021-12-03T09:58:55.483Z`.
///
/// The shape check is purely syntactic and also accepts things like
/// `2021-19-39T29:69:99.123Z`. Such strings cannot be represented as an
/// instant, so they are left as strings.
pub fn naive_iso_date(s: &str) -> Option<DateTime<Utc>> {
    if !ISO_MILLIS.is_match(s) {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Never promote; every string stays a string.
pub fn no_dates(_: &str) -> Option<DateTime<Utc>> {
    None
}
