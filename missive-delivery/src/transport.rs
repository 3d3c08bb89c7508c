use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::ExternalServiceError;

/// Hands a rendered message to the sending provider.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send `raw`, a complete MIME message, returning the provider's message
    /// ID.
    async fn send(&self, to: &str, from: &str, raw: &[u8]) -> Result<String, ExternalServiceError>;
}
