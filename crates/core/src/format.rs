//! Shared phrasing for deadline and staleness messages.

/// Render how far away a deadline is, given whole hours until it.
///
/// Under 24 hours the wording is the urgent "less than 24 hours" form;
/// beyond that the count is `ceil(hours / 24)` days, with a dedicated
/// "tomorrow" form for exactly one day.
pub fn deadline_phrase(hours_until: i64) -> String {
    if hours_until <= 0 {
        return "overdue".to_string();
    }
    if hours_until < 24 {
        return "due in less than 24 hours".to_string();
    }

    let days = (hours_until + 23) / 24;
    if days == 1 {
        "due tomorrow".to_string()
    } else {
        format!("due in {days} days")
    }
}

/// Same mapping as [`deadline_phrase`], worded for departures.
pub fn departure_phrase(hours_until: i64) -> String {
    if hours_until <= 0 {
        return "has departed".to_string();
    }
    if hours_until < 24 {
        return "departs in less than 24 hours".to_string();
    }

    let days = (hours_until + 23) / 24;
    if days == 1 {
        "departs tomorrow".to_string()
    } else {
        format!("departs in {days} days")
    }
}

/// "1 day" / "N days", used for staleness summaries.
pub fn day_count(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}
