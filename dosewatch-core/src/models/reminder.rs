use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One medicine reminder as persisted under its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub medicine: String,
    #[serde(default)]
    pub dosage: String,
    /// `HH:MM`, 24-hour. The alarm matching key.
    pub time_of_day: String,
    #[serde(default)]
    pub daily: bool,
    /// Advisory only; matching is re-derived from `time_of_day` on every scan.
    /// Absent on documents written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_time: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp_set: Option<DateTime<FixedOffset>>,
    /// Never set by any code path yet.
    #[serde(default)]
    pub sent: bool,
}

/// A reminder as returned by a store scan.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReminder {
    pub owner: String,
    pub id: String,
    pub reminder: Reminder,
}

/// The reminder reported by an alarm poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlarmMatch {
    pub medicine: String,
    pub dosage: String,
}

impl AlarmMatch {
    pub fn message(&self) -> String {
        format!("{} ({})", self.medicine, self.dosage)
    }
}

impl From<&Reminder> for AlarmMatch {
    fn from(r: &Reminder) -> Self {
        Self {
            medicine: r.medicine.clone(),
            dosage: r.dosage.clone(),
        }
    }
}
