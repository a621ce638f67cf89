use chrono::{DateTime, Utc};

/// Boost for templates less than a week old
pub const FIRST_WEEK_BOOST: f64 = 1.20;
/// Boost for templates less than a month old
pub const FIRST_MONTH_BOOST: f64 = 1.10;
/// Boost for templates less than a quarter old
pub const FIRST_QUARTER_BOOST: f64 = 1.05;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Age-dependent multiplicative boost favoring recently created content
///
/// Step function over age tiers; content without a creation timestamp gets
/// no boost rather than an error.
pub fn calculate_boost(created_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let created_at = match created_at {
        Some(ts) => ts,
        None => return 1.0,
    };

    let age_days = now.signed_duration_since(created_at).num_seconds() as f64 / SECONDS_PER_DAY;

    if age_days < 7.0 {
        FIRST_WEEK_BOOST
    } else if age_days < 30.0 {
        FIRST_MONTH_BOOST
    } else if age_days < 90.0 {
        FIRST_QUARTER_BOOST
    } else {
        1.0
    }
}

/// Applies the boost to a base score, capped at 1.0
pub fn boosted_score(base_score: f64, boost: f64) -> f64 {
    (base_score * boost).min(1.0)
}
