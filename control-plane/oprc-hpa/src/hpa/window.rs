use chrono::{DateTime, Datelike, TimeZone, Timelike};

use crate::crd::workload_autoscaler::{ReplicasRecommendation, Weekday};

/// Returns the value of the first slot covering `now`.
///
/// Slots are scanned in order and the first one whose weekday matches and
/// whose `[from, to)` hour range contains the hour of `now` wins, so
/// overlapping slots resolve to the earlier entry. `None` means no slot
/// covers this moment.
pub fn lookup<Tz: TimeZone>(
    slots: &[ReplicasRecommendation],
    now: &DateTime<Tz>,
) -> Option<i32> {
    let weekday = Weekday::from(now.weekday());
    let hour = now.hour();
    slots
        .iter()
        .find(|s| s.weekday == weekday && s.from <= hour && hour < s.to)
        .map(|s| s.value)
}
