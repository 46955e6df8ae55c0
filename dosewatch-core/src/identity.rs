//! Identity verification: turns an opaque ID token into a stable user id
//!
//! `FirebaseIdentityVerifier` validates Firebase Authentication ID tokens:
//! RS256 signature against Google's published JWK set, expiry, audience
//! (the project id) and issuer. The key set is fetched once per verification.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::IdentityConfig;

/// Verifies bearer tokens and yields the user id they were issued for.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<String, IdentityError>;
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Failed to fetch signing keys: {0}")]
    KeyFetch(#[from] reqwest::Error),

    #[error("Signing key endpoint returned HTTP {0}")]
    KeyEndpoint(u16),

    #[error("No signing key matches kid {0:?}")]
    UnknownKey(Option<String>),

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("Token has an empty subject")]
    MissingSubject,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    n: String,
    e: String,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
}

#[derive(Debug, Clone)]
pub struct FirebaseIdentityVerifier {
    client: Client,
    jwks_url: String,
    project_id: String,
    issuer: String,
}

impl FirebaseIdentityVerifier {
    pub fn new(project_id: &str, config: &IdentityConfig) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            jwks_url: config.jwks_url.clone(),
            project_id: project_id.to_string(),
            issuer: format!("{}{}", config.issuer_prefix, project_id),
        })
    }

    async fn fetch_key(&self, kid: Option<&str>) -> Result<DecodingKey, IdentityError> {
        let response = self.client.get(&self.jwks_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(code = status.as_u16(), url = %self.jwks_url, "Signing key fetch failed");
            return Err(IdentityError::KeyEndpoint(status.as_u16()));
        }

        let set: JwkSet = response.json().await?;
        let jwk = set
            .keys
            .iter()
            .find(|k| Some(k.kid.as_str()) == kid)
            .ok_or_else(|| IdentityError::UnknownKey(kid.map(str::to_string)))?;

        Ok(DecodingKey::from_rsa_components(&jwk.n, &jwk.e)?)
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseIdentityVerifier {
    async fn verify(&self, id_token: &str) -> Result<String, IdentityError> {
        let header = decode_header(id_token)?;
        let key = self.fetch_key(header.kid.as_deref()).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[&self.issuer]);

        let claims = decode::<IdTokenClaims>(id_token, &key, &validation)?.claims;
        if claims.sub.is_empty() {
            return Err(IdentityError::MissingSubject);
        }

        tracing::debug!(uid = %claims.sub, "Token verified");
        Ok(claims.sub)
    }
}
