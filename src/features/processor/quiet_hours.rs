//! Quiet-hours policy.
//!
//! Pure checks over a patient's configured daily window, evaluated in the
//! patient's timezone. The reschedule target is deliberately simple:
//! tomorrow at the window's end, not the nearest non-quiet moment.

use chrono::{DateTime, Days, TimeZone, Utc};

use crate::features::settings::ReminderSettings;

/// Whether `now` falls inside the patient's quiet-hours window.
///
/// A window with `start <= end` covers that same-day span; `start > end`
/// spans midnight and covers the evening and the following morning.
pub fn in_quiet_hours(settings: &ReminderSettings, now: DateTime<Utc>) -> bool {
    let window = &settings.quiet_hours;
    if !window.enabled {
        return false;
    }

    let time_of_day = now.with_timezone(&settings.tz()).time();
    if window.start <= window.end {
        window.start <= time_of_day && time_of_day <= window.end
    } else {
        time_of_day >= window.start || time_of_day <= window.end
    }
}

/// Reschedule target for a suppressed reminder: tomorrow (patient local
/// time) at quiet-hours end.
pub fn next_allowed_time(settings: &ReminderSettings, now: DateTime<Utc>) -> DateTime<Utc> {
    let tz = settings.tz();
    let local_now = now.with_timezone(&tz);

    let Some(tomorrow) = local_now.date_naive().checked_add_days(Days::new(1)) else {
        return now + chrono::Duration::hours(24);
    };
    match tz
        .from_local_datetime(&tomorrow.and_time(settings.quiet_hours.end))
        .earliest()
    {
        Some(local_target) => local_target.with_timezone(&Utc),
        // DST gap swallowed the target; push a day out instead
        None => now + chrono::Duration::hours(24),
    }
}
