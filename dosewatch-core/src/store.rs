//! Reminder persistence
//!
//! Reminders live in a two-level hierarchy: user id, then a store-generated
//! reminder id. The store only ever appends and scans; nothing is updated or
//! deleted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::credentials::ServiceAccount;
use crate::firestore::FirestoreReminderStore;
use crate::models::{Reminder, StoredReminder};
use crate::oauth::{ServiceAccountTokenSource, TokenError, TokenSource, DATASTORE_SCOPE};

/// Bearer accepted by the Firestore emulator.
const EMULATOR_BEARER: &str = "owner";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Failed to obtain access token: {0}")]
    Token(#[from] TokenError),

    #[error("Malformed store response: {0}")]
    Decode(String),

    #[error("Invalid store URL: {0}")]
    InvalidUrl(String),
}

/// Hierarchical per-user reminder storage.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Append one reminder under `owner`, returning its generated id.
    async fn append(&self, owner: &str, reminder: &Reminder) -> Result<String, StoreError>;

    /// Every reminder of every user, owner by owner, in a stable order.
    async fn scan_all(&self) -> Result<Vec<StoredReminder>, StoreError>;

    /// Cheap connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Create the configured store backend.
///
/// Reads `[store] backend` to select Firestore (default) or the in-memory store.
pub fn create_store(
    config: &StoreConfig,
    account: &ServiceAccount,
) -> Result<Arc<dyn ReminderStore>, StoreError> {
    match config.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryReminderStore::new())),
        _ => {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_seconds))
                .build()?;
            let tokens = if config.emulator {
                TokenSource::Static(EMULATOR_BEARER.to_string())
            } else {
                TokenSource::ServiceAccount(ServiceAccountTokenSource::new(
                    client.clone(),
                    account.clone(),
                    DATASTORE_SCOPE,
                ))
            };
            Ok(Arc::new(FirestoreReminderStore::with_client(
                client,
                config,
                &account.project_id,
                tokens,
            )))
        }
    }
}

// ============================================================================
// InMemoryReminderStore
// ============================================================================

/// Process-local store for development and tests. Owners are scanned in
/// sorted order, each owner's reminders in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    users: RwLock<BTreeMap<String, Vec<(String, Reminder)>>>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.values().map(Vec::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn append(&self, owner: &str, reminder: &Reminder) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        self.users
            .write()
            .await
            .entry(owner.to_string())
            .or_default()
            .push((id.clone(), reminder.clone()));
        Ok(id)
    }

    async fn scan_all(&self) -> Result<Vec<StoredReminder>, StoreError> {
        let users = self.users.read().await;
        Ok(users
            .iter()
            .flat_map(|(owner, reminders)| {
                reminders.iter().map(move |(id, reminder)| StoredReminder {
                    owner: owner.clone(),
                    id: id.clone(),
                    reminder: reminder.clone(),
                })
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
