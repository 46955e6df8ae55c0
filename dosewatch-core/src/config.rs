use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DosewatchConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
    /// IANA zone every reminder time is interpreted in.
    pub timezone: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            timezone: "Asia/Karachi".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    /// "firestore" or "memory"
    pub backend: String,
    pub base_url: String,
    pub database: String,
    pub users_collection: String,
    pub reminders_collection: String,
    /// Talk to the Firestore emulator (static bearer, no OAuth exchange).
    pub emulator: bool,
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "firestore".to_string(),
            base_url: "https://firestore.googleapis.com/v1".to_string(),
            database: "(default)".to_string(),
            users_collection: "users".to_string(),
            reminders_collection: "medicines".to_string(),
            emulator: false,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentityConfig {
    pub jwks_url: String,
    pub issuer_prefix: String,
    pub timeout_seconds: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            jwks_url: "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
                .to_string(),
            issuer_prefix: "https://securetoken.google.com/".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variable holding the service account JSON blob.
    pub env_var: String,
    /// Fallback file path when the variable is unset.
    pub path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_var: "FIREBASE_SERVICE_ACCOUNT".to_string(),
            path: "serviceAccountKey.json".to_string(),
        }
    }
}

impl DosewatchConfig {
    /// Load from an optional TOML file, overridden by `DOSEWATCH__SECTION__KEY`
    /// environment variables.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DOSEWATCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        s.try_deserialize()
    }

    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        s.try_deserialize()
    }
}
