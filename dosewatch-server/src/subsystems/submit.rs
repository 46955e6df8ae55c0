//! Submission subsystem: authenticates the caller and appends one reminder
//!
//! Every rejection (missing/invalid token, missing/malformed time, missing
//! medicine) happens before the store is touched. A successful call performs
//! exactly one append; there is no idempotency key.

use chrono::DateTime;
use chrono_tz::Tz;
use dosewatch_core::{resolve_next, DosewatchError, IdentityVerifier, Reminder, ReminderStore};

/// Raw submission fields. `None` means the field was absent from the form.
#[derive(Debug, Clone, Default)]
pub struct ReminderSubmission {
    pub id_token: Option<String>,
    pub medicine: Option<String>,
    pub dosage: Option<String>,
    pub time: Option<String>,
    pub daily: bool,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub owner: String,
    pub reminder_id: String,
    pub reminder: Reminder,
}

fn present(field: Option<String>) -> Option<String> {
    field.filter(|v| !v.trim().is_empty())
}

pub async fn submit_reminder(
    submission: ReminderSubmission,
    verifier: &dyn IdentityVerifier,
    store: &dyn ReminderStore,
    now: DateTime<Tz>,
) -> Result<SubmitOutcome, DosewatchError> {
    let token = present(submission.id_token)
        .ok_or_else(|| DosewatchError::Unauthorized("Missing idToken".to_string()))?;

    let owner = match verifier.verify(&token).await {
        Ok(uid) => {
            tracing::info!(uid = %uid, "Token verified");
            uid
        }
        Err(e) => {
            tracing::warn!(error = %e, "Invalid token");
            return Err(DosewatchError::Unauthorized("Invalid idToken".to_string()));
        }
    };

    let time_of_day = present(submission.time)
        .ok_or_else(|| DosewatchError::InvalidRequest("Missing time".to_string()))?;
    let next_time = resolve_next(&time_of_day, &now)
        .map_err(|e| DosewatchError::InvalidRequest(e.to_string()))?;

    let medicine = present(submission.medicine)
        .ok_or_else(|| DosewatchError::InvalidRequest("Missing medicine".to_string()))?;

    let reminder = Reminder {
        medicine,
        dosage: submission.dosage.unwrap_or_default(),
        time_of_day,
        daily: submission.daily,
        next_time: Some(next_time.fixed_offset()),
        timestamp_set: Some(now.fixed_offset()),
        sent: false,
    };

    let reminder_id = store.append(&owner, &reminder).await.map_err(|e| {
        tracing::error!(store = store.name(), error = %e, "Failed to save reminder");
        DosewatchError::StoreUnavailable(e.to_string())
    })?;

    tracing::info!(
        uid = %owner,
        reminder_id = %reminder_id,
        medicine = %reminder.medicine,
        time = %reminder.time_of_day,
        "Reminder saved"
    );

    Ok(SubmitOutcome {
        owner,
        reminder_id,
        reminder,
    })
}
