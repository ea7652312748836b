use crate::http::{Transient, is_transient_status};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum DriveAuthError {
    #[error("service account key file not found: {0}")]
    MissingKeyFile(String),
    #[error("invalid service account key: {0}")]
    InvalidKey(String),
    #[error("token request failed: {0}")]
    Request(String),
    #[error("token request rejected: HTTP {0}")]
    Rejected(reqwest::StatusCode),
}

impl Transient for DriveAuthError {
    fn is_transient(&self) -> bool {
        match self {
            DriveAuthError::Request(_) => true,
            DriveAuthError::Rejected(status) => is_transient_status(*status),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self, DriveAuthError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(DriveAuthError::MissingKeyFile(path.display().to_string()));
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| DriveAuthError::InvalidKey(err.to_string()))?;
        serde_json::from_str(&raw).map_err(|err| DriveAuthError::InvalidKey(err.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Clone)]
struct CachedToken {
    value: String,
    expires_at: i64,
}

/// Exchanges a signed service-account assertion for a bearer token and keeps
/// it until shortly before expiry.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    http: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: Client) -> Result<Self, DriveAuthError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|err| DriveAuthError::InvalidKey(err.to_string()))?;
        Ok(Self {
            key,
            signing_key,
            http,
            cached: Mutex::new(None),
        })
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI)
    }

    fn assertion(&self, now: i64) -> Result<String, DriveAuthError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: DRIVE_SCOPE,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .map_err(|err| DriveAuthError::InvalidKey(err.to_string()))
    }

    pub async fn access_token(&self) -> Result<String, DriveAuthError> {
        let mut guard = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = guard.as_ref()
            && token.expires_at - EXPIRY_MARGIN_SECS > now
        {
            return Ok(token.value.clone());
        }

        debug!(target = "lister.drive", client_email = %self.key.client_email, "requesting_access_token");
        let assertion = self.assertion(now)?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = self
            .http
            .post(self.token_uri())
            .form(&params)
            .send()
            .await
            .map_err(|err| DriveAuthError::Request(err.to_string()))?;
        if !response.status().is_success() {
            return Err(DriveAuthError::Rejected(response.status()));
        }
        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|err| DriveAuthError::Request(err.to_string()))?;

        info!(target = "lister.drive", expires_in = payload.expires_in, "access_token_acquired");
        *guard = Some(CachedToken {
            value: payload.access_token.clone(),
            expires_at: now + payload.expires_in,
        });
        Ok(payload.access_token)
    }
}
