//! Display formatting for message timestamps.

use chrono::{DateTime, Datelike, FixedOffset, Utc};
use chrono_tz::Tz;

/// Wall-clock time of a message, e.g. `14:05`.
#[must_use]
pub fn clock_time(at: &DateTime<FixedOffset>, tz: Tz) -> String {
    at.with_timezone(&tz).format("%H:%M").to_string()
}

/// Compact label for the conversation list.
///
/// Same day shows the clock time, the previous day `Yesterday`, the rest of
/// the past week the weekday, older dates of this year `Mar 4`, anything
/// else the full date.
#[must_use]
pub fn relative_time(at: &DateTime<FixedOffset>, now: DateTime<Utc>, tz: Tz) -> String {
    let local = at.with_timezone(&tz);
    let today = now.with_timezone(&tz).date_naive();
    let day = local.date_naive();

    if day == today {
        return local.format("%H:%M").to_string();
    }

    let days = (today - day).num_days();
    if days == 1 {
        "Yesterday".to_string()
    } else if (2..7).contains(&days) {
        local.format("%a").to_string()
    } else if day.year() == today.year() {
        local.format("%b %-d").to_string()
    } else {
        local.format("%Y-%m-%d").to_string()
    }
}
