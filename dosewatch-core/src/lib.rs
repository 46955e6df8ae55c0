pub mod alarm;
pub mod config;
pub mod credentials;
pub mod error;
pub mod firestore;
pub mod identity;
pub mod models;
pub mod oauth;
pub mod schedule;
pub mod store;

pub use alarm::find_due;
pub use config::DosewatchConfig;
pub use credentials::ServiceAccount;
pub use error::DosewatchError;
pub use identity::{FirebaseIdentityVerifier, IdentityError, IdentityVerifier};
pub use models::{AlarmMatch, Reminder, StoredReminder};
pub use schedule::{resolve_next, Clock, FixedClock, ReminderSchedule, SystemClock};
pub use store::{create_store, InMemoryReminderStore, ReminderStore, StoreError};
