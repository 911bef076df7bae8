use async_trait::async_trait;

use super::client::ProviderClient;
use crate::domain::provider::{AccountRequest, ProvisionedAccount};
use crate::ports::{ProviderError, ReceivingAccountProvider};

/// HTTP adapter for the provider issuing virtual receiving accounts.
#[derive(Clone)]
pub struct HttpAccountProvider {
    client: ProviderClient,
}

impl HttpAccountProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReceivingAccountProvider for HttpAccountProvider {
    async fn create_account(
        &self,
        request: &AccountRequest,
    ) -> Result<ProvisionedAccount, ProviderError> {
        let account: ProvisionedAccount = self
            .client
            .post_json("/virtual-accounts", request)
            .await?;
        if account.account_number.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "provisioned account has no account number".to_string(),
            ));
        }
        Ok(account)
    }
}
