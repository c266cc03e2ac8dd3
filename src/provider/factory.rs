//! Push provider factory

use std::sync::Arc;

use thiserror::Error;

use crate::config::ProviderConfig;

use super::fcm::FcmProvider;
use super::noop::NoopProvider;
use super::PushProvider;

/// Errors raised while constructing a provider
#[derive(Debug, Error)]
pub enum ProviderInitError {
    #[error("FCM project id is not configured")]
    MissingProjectId,

    #[error("FCM requires either an access token or a credentials path")]
    MissingCredentials,

    #[error("Invalid credentials: {0}")]
    Credentials(String),

    #[error("HTTP client error: {0}")]
    Client(#[source] reqwest::Error),
}

/// Create the push provider selected by configuration.
///
/// - `"fcm"`: Firebase Cloud Messaging, fails if credentials are incomplete
/// - `"noop"` (default): accepts every message without sending
pub fn create_push_provider(
    settings: &ProviderConfig,
) -> Result<Arc<dyn PushProvider>, ProviderInitError> {
    match settings.backend.as_str() {
        "fcm" => {
            let provider = FcmProvider::new(&settings.fcm)?;
            tracing::info!(
                provider = "fcm",
                send_url = %provider.send_url(),
                "Creating FCM push provider"
            );
            Ok(Arc::new(provider))
        }
        other => {
            if other != "noop" {
                tracing::warn!(backend = %other, "Unknown push provider, using noop");
            } else {
                tracing::info!(provider = "noop", "Creating noop push provider");
            }
            Ok(Arc::new(NoopProvider::new()))
        }
    }
}
