use async_trait::async_trait;
use missive_delivery::{ExternalServiceError, QuotaSource, SendQuota};

/// Serves a fixed quota, for dry runs without a provider account.
#[derive(Debug, Clone, Copy)]
pub struct StaticQuota(pub SendQuota);

#[async_trait]
impl QuotaSource for StaticQuota {
    async fn send_quota(&self) -> Result<SendQuota, ExternalServiceError> {
        Ok(self.0)
    }
}
