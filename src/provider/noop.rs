//! Provider that accepts every message without sending anything.

use async_trait::async_trait;
use uuid::Uuid;

use super::{token_hint, PushMessage, PushProvider, ProviderError};

/// Logs each message and returns a synthetic receipt.
///
/// Used for local development where no push credentials are available.
#[derive(Debug, Default)]
pub struct NoopProvider;

impl NoopProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushProvider for NoopProvider {
    async fn deliver(&self, message: &PushMessage) -> Result<String, ProviderError> {
        let receipt = format!("noop-{}", Uuid::new_v4());

        tracing::info!(
            token = %token_hint(&message.token),
            title = %message.title,
            data_keys = message.data.len(),
            receipt = %receipt,
            "Push message accepted by noop provider"
        );

        Ok(receipt)
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
