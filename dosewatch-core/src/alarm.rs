use chrono::DateTime;
use chrono_tz::Tz;

use crate::models::{AlarmMatch, StoredReminder};
use crate::schedule::format_time_of_day;

/// First reminder, in scan order, whose `time_of_day` equals the `HH:MM` of `now`.
///
/// Pure: `daily` and `sent` are neither consulted nor updated, so every poll
/// within the matching minute reports the same reminder again.
pub fn find_due(reminders: &[StoredReminder], now: &DateTime<Tz>) -> Option<AlarmMatch> {
    let current = format_time_of_day(now);

    let due = reminders
        .iter()
        .find(|r| r.reminder.time_of_day == current)?;

    tracing::info!(
        owner = %due.owner,
        reminder_id = %due.id,
        medicine = %due.reminder.medicine,
        time = %current,
        "Time match"
    );
    Some(AlarmMatch::from(&due.reminder))
}
