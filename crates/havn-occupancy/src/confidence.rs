//! Confidence of a crowd-sourced availability figure.
//!
//! Free-seat counts go stale quickly, so the score steps down with the age of
//! the latest report: 100 under 5 minutes, then 80 / 60 / 40 at the 15, 30
//! and 60 minute marks, with a floor of 20. A spot nobody has reported on
//! scores 0.

use chrono::{DateTime, TimeDelta, Utc};

/// `(max_age_minutes, score)` pairs, checked in order.
const BREAKPOINTS: [(i64, u8); 4] = [(5, 100), (15, 80), (30, 60), (60, 40)];

/// Score for reports older than the last breakpoint.
const FLOOR: u8 = 20;

/// Confidence score (0-100) of the latest availability report.
pub fn confidence_score(last_update_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u8 {
    let Some(updated) = last_update_at else {
        return 0;
    };
    let age = now.signed_duration_since(updated);
    BREAKPOINTS
        .iter()
        .find(|(minutes, _)| age < TimeDelta::minutes(*minutes))
        .map_or(FLOOR, |(_, score)| *score)
}
