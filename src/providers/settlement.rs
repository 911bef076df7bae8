use async_trait::async_trait;
use serde::Deserialize;

use super::client::ProviderClient;
use crate::domain::provider::{Bank, Channel, PayoutReceipt, PayoutRequest};
use crate::ports::{ProviderError, SettlementProvider};

#[derive(Debug, Deserialize)]
struct ChannelList {
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct BankList {
    networks: Vec<Bank>,
}

/// HTTP adapter for the downstream payout provider.
#[derive(Clone)]
pub struct HttpSettlementProvider {
    client: ProviderClient,
}

impl HttpSettlementProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SettlementProvider for HttpSettlementProvider {
    async fn list_channels(&self, country_code: &str) -> Result<Vec<Channel>, ProviderError> {
        let list: ChannelList = self
            .client
            .get_json("/channels", &[("country", country_code)])
            .await?;
        Ok(list.channels)
    }

    async fn list_banks(&self, country_code: &str) -> Result<Vec<Bank>, ProviderError> {
        let list: BankList = self
            .client
            .get_json("/networks", &[("country", country_code)])
            .await?;
        Ok(list.networks)
    }

    async fn create_payout(&self, request: &PayoutRequest) -> Result<PayoutReceipt, ProviderError> {
        let receipt: PayoutReceipt = self.client.post_json("/payments", request).await?;
        if receipt.provider_reference.is_empty() || receipt.sequence_reference.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "payout receipt is missing references".to_string(),
            ));
        }
        Ok(receipt)
    }
}
