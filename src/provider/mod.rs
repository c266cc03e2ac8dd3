//! Push delivery providers.
//!
//! A provider takes one addressed [`PushMessage`] and either returns the
//! provider's receipt id or one of the closed set of [`ProviderError`]s.
//!
//! - `FcmProvider`: Firebase Cloud Messaging HTTP v1 API
//! - `NoopProvider`: logs and accepts everything (local development)
//!
//! Use [`create_push_provider`] to build the configured provider.

mod factory;
pub mod fcm;
pub mod noop;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::notification::Payload;

pub use factory::{create_push_provider, ProviderInitError};
pub use fcm::{FcmProvider, ServiceAccountKey};
pub use noop::NoopProvider;

/// Errors a provider can report for a single delivery.
///
/// This set is closed: transport failures, auth failures and any provider
/// error code without a dedicated variant are reported as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Token or message rejected as malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Token is no longer registered with the provider
    #[error("Unregistered: {0}")]
    Unregistered(String),

    #[error("{0}")]
    Other(String),
}

/// A message addressed to one device token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    /// Data payload delivered alongside the visible notification
    pub data: Payload,
}

/// Push delivery provider.
///
/// Implementations must be `Send + Sync`; one provider instance is shared by
/// every concurrent delivery of a fan-out.
#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver one message, returning the provider's receipt id.
    async fn deliver(&self, message: &PushMessage) -> Result<String, ProviderError>;

    /// Provider identifier for logging and stats
    fn name(&self) -> &'static str;
}

/// Shorten a device token for log output
pub(crate) fn token_hint(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("***{}", tail)
}
