//! Alarm subsystem: one full scan of the store per poll
//!
//! Store failures are logged and reported as "no alarm": a poller that sees an
//! error would have nothing better to do than poll again.

use chrono::DateTime;
use chrono_tz::Tz;
use dosewatch_core::{find_due, AlarmMatch, ReminderStore};
use serde::Serialize;

/// Body of `GET /alarm_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmStatus {
    pub alarm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Option<AlarmMatch>> for AlarmStatus {
    fn from(due: Option<AlarmMatch>) -> Self {
        match due {
            Some(m) => Self {
                alarm: true,
                message: Some(m.message()),
            },
            None => Self {
                alarm: false,
                message: None,
            },
        }
    }
}

pub async fn check_alarm(store: &dyn ReminderStore, now: &DateTime<Tz>) -> Option<AlarmMatch> {
    match store.scan_all().await {
        Ok(reminders) => find_due(&reminders, now),
        Err(e) => {
            tracing::error!(store = store.name(), error = %e, "Error in alarm status check");
            None
        }
    }
}
