pub mod reminder;

pub use reminder::{AlarmMatch, Reminder, StoredReminder};
