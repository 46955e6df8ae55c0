//! OAuth 2.0 access tokens for Google REST APIs
//!
//! Service accounts use the JWT-bearer grant: an RS256 assertion signed with the
//! account's private key is exchanged at `token_uri` for a short-lived access
//! token. Tokens are cached until shortly before they expire.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::credentials::ServiceAccount;

/// Scope granting read/write access to Cloud Firestore.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed service account assertions for access tokens.
#[derive(Debug)]
pub struct ServiceAccountTokenSource {
    client: Client,
    account: ServiceAccount,
    scope: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    pub fn new(client: Client, account: ServiceAccount, scope: impl Into<String>) -> Self {
        Self {
            client,
            account,
            scope: scope.into(),
            cached: Mutex::new(None),
        }
    }

    pub async fn access_token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch(now).await?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    fn sign_assertion(&self, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = AssertionClaims {
            iss: self.account.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.account.token_uri.clone(),
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();
        let key = EncodingKey::from_rsa_pem(self.account.private_key.as_bytes())?;
        Ok(encode(&header, &claims, &key)?)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, TokenError> {
        let assertion = self.sign_assertion(now)?;

        let response = self
            .client
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                })
                .unwrap_or(body);

            tracing::error!(code = status.as_u16(), message = %message, "Token exchange failed");
            return Err(TokenError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = response.json().await?;
        tracing::debug!(expires_in = token.expires_in, "Obtained access token");

        Ok(CachedToken {
            value: token.access_token,
            expires_at: now + Duration::seconds(token.expires_in),
        })
    }
}

/// Where bearer tokens for outbound store calls come from.
#[derive(Debug)]
pub enum TokenSource {
    ServiceAccount(ServiceAccountTokenSource),
    /// A fixed bearer, e.g. `owner` for the Firestore emulator.
    Static(String),
}

impl TokenSource {
    pub async fn bearer(&self) -> Result<String, TokenError> {
        match self {
            TokenSource::ServiceAccount(source) => source.access_token().await,
            TokenSource::Static(token) => Ok(token.clone()),
        }
    }
}
