//! Firebase Cloud Messaging HTTP v1 provider.
//!
//! Sends one message per request to
//! `POST {base_url}/v1/projects/{project_id}/messages:send`.
//!
//! Authentication is either a static bearer token (emulators, tests) or a
//! service account key. With a service account, an RS256-signed assertion is
//! exchanged at the key's `token_uri` for an access token, which is cached
//! until shortly before it expires.
//!
//! Error responses are mapped onto [`ProviderError`]:
//!
//! | FCM error code       | Result              |
//! |----------------------|---------------------|
//! | `UNREGISTERED`       | `Unregistered`      |
//! | `INVALID_ARGUMENT`   | `InvalidArgument`   |
//! | anything else        | `Other`             |

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::notification::Payload;

use super::factory::ProviderInitError;
use super::{token_hint, PushMessage, PushProvider, ProviderError};

/// OAuth scope required for sending messages
const FCM_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Lifetime requested for service account assertions
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Refresh cached access tokens this long before they expire
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Service account key file contents (the fields this provider needs)
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub project_id: Option<String>,
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl ServiceAccountKey {
    /// Load a key from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProviderInitError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ProviderInitError::Credentials(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ProviderInitError> {
        serde_json::from_str(raw)
            .map_err(|e| ProviderInitError::Credentials(format!("invalid service account key: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_REFRESH_MARGIN_SECS) < self.expires_at
    }
}

enum FcmAuth {
    Static(String),
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
        cached: Mutex<Option<CachedToken>>,
    },
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: WireMessage<'a>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    token: &'a str,
    notification: WireNotification<'a>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    data: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct WireNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

/// FCM HTTP v1 provider
pub struct FcmProvider {
    client: reqwest::Client,
    send_url: String,
    auth: FcmAuth,
}

impl FcmProvider {
    /// Create a provider from configuration.
    ///
    /// A static `access_token` takes precedence over `credentials_path`.
    pub fn new(config: &crate::config::FcmConfig) -> Result<Self, ProviderInitError> {
        let timeout = Duration::from_secs(config.request_timeout_seconds);

        if let Some(token) = &config.access_token {
            let project_id = config
                .project_id
                .clone()
                .ok_or(ProviderInitError::MissingProjectId)?;
            return Self::with_static_token(&config.base_url, &project_id, token, timeout);
        }

        let path = config
            .credentials_path
            .as_ref()
            .ok_or(ProviderInitError::MissingCredentials)?;
        let key = ServiceAccountKey::from_file(path)?;
        let project_id = config
            .project_id
            .clone()
            .or_else(|| key.project_id.clone())
            .ok_or(ProviderInitError::MissingProjectId)?;

        Self::with_service_account(&config.base_url, &project_id, key, timeout)
    }

    /// Create a provider that authenticates with a fixed bearer token
    pub fn with_static_token(
        base_url: &str,
        project_id: &str,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderInitError> {
        Ok(Self {
            client: build_client(timeout)?,
            send_url: send_url(base_url, project_id),
            auth: FcmAuth::Static(access_token.to_string()),
        })
    }

    /// Create a provider that authenticates with a service account key
    pub fn with_service_account(
        base_url: &str,
        project_id: &str,
        key: ServiceAccountKey,
        timeout: Duration,
    ) -> Result<Self, ProviderInitError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| ProviderInitError::Credentials(format!("invalid private key: {}", e)))?;

        tracing::info!(
            client_email = %key.client_email,
            project_id = %project_id,
            "FCM provider using service account credentials"
        );

        Ok(Self {
            client: build_client(timeout)?,
            send_url: send_url(base_url, project_id),
            auth: FcmAuth::ServiceAccount {
                key,
                signing_key,
                cached: Mutex::new(None),
            },
        })
    }

    /// Endpoint messages are posted to
    pub fn send_url(&self) -> &str {
        &self.send_url
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        match &self.auth {
            FcmAuth::Static(token) => Ok(token.clone()),
            FcmAuth::ServiceAccount {
                key,
                signing_key,
                cached,
            } => {
                let mut cached = cached.lock().await;
                let now = Utc::now();

                if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(now)) {
                    return Ok(token.access_token.clone());
                }

                let fresh = self.exchange_assertion(key, signing_key, now).await?;
                let access_token = fresh.access_token.clone();
                *cached = Some(fresh);
                Ok(access_token)
            }
        }
    }

    async fn exchange_assertion(
        &self,
        key: &ServiceAccountKey,
        signing_key: &EncodingKey,
        now: DateTime<Utc>,
    ) -> Result<CachedToken, ProviderError> {
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: FCM_SCOPE,
            aud: &key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        let assertion = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, signing_key)
            .map_err(|e| ProviderError::Other(format!("failed to sign assertion: {}", e)))?;

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "FCM access token exchange rejected");
            return Err(ProviderError::Other(format!(
                "token exchange failed: HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("invalid token response: {}", e)))?;

        tracing::debug!(expires_in = token.expires_in, "FCM access token refreshed");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: now + chrono::Duration::seconds(token.expires_in),
        })
    }
}

#[async_trait]
impl PushProvider for FcmProvider {
    async fn deliver(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let access_token = self.access_token().await?;

        let request = SendRequest {
            message: WireMessage {
                token: &message.token,
                notification: WireNotification {
                    title: &message.title,
                    body: &message.body,
                },
                data: stringify_data(&message.data),
            },
        };

        let response = self
            .client
            .post(&self.send_url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("transport error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            let sent: SendResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Other(format!("invalid send response: {}", e)))?;
            return Ok(sent.name);
        }

        let body = response.text().await.unwrap_or_default();
        let error = map_error_response(status.as_u16(), &body);

        tracing::debug!(
            token = %token_hint(&message.token),
            status = status.as_u16(),
            error = %error,
            "FCM rejected message"
        );

        Err(error)
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderInitError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProviderInitError::Client)
}

fn send_url(base_url: &str, project_id: &str) -> String {
    format!(
        "{}/v1/projects/{}/messages:send",
        base_url.trim_end_matches('/'),
        project_id
    )
}

/// The wire `data` map is string to string; non-string values are sent as JSON text.
fn stringify_data(payload: &Payload) -> BTreeMap<String, String> {
    payload
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// Map an FCM error response onto the provider error set.
///
/// The FCM-specific `errorCode` in `details` wins over the canonical status.
fn map_error_response(http_status: u16, body: &str) -> ProviderError {
    let envelope: ErrorEnvelope = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) => return ProviderError::Other(format!("HTTP {}: {}", http_status, body.trim())),
    };

    let error = envelope.error;
    let code = error
        .details
        .iter()
        .find_map(|d| d.error_code.clone())
        .unwrap_or(error.status);
    let detail = if error.message.is_empty() {
        format!("HTTP {}", http_status)
    } else {
        error.message
    };

    match code.as_str() {
        "UNREGISTERED" => ProviderError::Unregistered(detail),
        "INVALID_ARGUMENT" => ProviderError::InvalidArgument(detail),
        "" => ProviderError::Other(detail),
        other => ProviderError::Other(format!("{}: {}", other, detail)),
    }
}
