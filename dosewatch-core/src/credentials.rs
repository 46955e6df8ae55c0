//! Service account credentials for the store and the identity verifier.
//!
//! The JSON blob comes from an environment variable when set, otherwise from a
//! key file on disk. Having neither is fatal at startup.

use std::path::Path;

use serde::Deserialize;

use crate::config::CredentialsConfig;
use crate::error::DosewatchError;

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

// Keeps the private key out of logs.
impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_json(blob: &str) -> Result<Self, DosewatchError> {
        let account: ServiceAccount = serde_json::from_str(blob).map_err(|e| {
            DosewatchError::StartupConfig(format!("invalid service account JSON: {}", e))
        })?;
        if account.project_id.trim().is_empty() {
            return Err(DosewatchError::StartupConfig(
                "service account has an empty project_id".to_string(),
            ));
        }
        Ok(account)
    }

    /// Load from the process environment, falling back to the configured file.
    pub fn load(config: &CredentialsConfig) -> Result<Self, DosewatchError> {
        Self::load_with(config, |name| std::env::var(name).ok())
    }

    /// Same as [`ServiceAccount::load`] with an explicit environment lookup.
    pub fn load_with<F>(config: &CredentialsConfig, env: F) -> Result<Self, DosewatchError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(blob) = env(&config.env_var).filter(|v| !v.trim().is_empty()) {
            tracing::info!(source = %config.env_var, "Loading service account from environment");
            return Self::from_json(&blob);
        }

        let path = Path::new(&config.path);
        if !path.exists() {
            return Err(DosewatchError::StartupConfig(format!(
                "no credentials: {} is unset and {} does not exist",
                config.env_var, config.path
            )));
        }

        tracing::info!(source = %config.path, "Loading service account from file");
        let blob = std::fs::read_to_string(path)?;
        Self::from_json(&blob)
    }
}
