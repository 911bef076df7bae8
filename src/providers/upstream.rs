use async_trait::async_trait;
use uuid::Uuid;

use super::client::ProviderClient;
use crate::domain::provider::ReconcileResult;
use crate::ports::{ProviderError, UpstreamLegProvider};

/// HTTP adapter for the off-ramp that produces parent transactions.
#[derive(Clone)]
pub struct HttpUpstreamProvider {
    client: ProviderClient,
}

impl HttpUpstreamProvider {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpstreamLegProvider for HttpUpstreamProvider {
    async fn confirm_and_reconcile_balance(
        &self,
        user_id: Uuid,
    ) -> Result<ReconcileResult, ProviderError> {
        self.client
            .post_json(
                &format!("/users/{}/reconcile", user_id),
                &serde_json::json!({}),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reconcile_posts_to_user_path() {
        let user_id = Uuid::new_v4();
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", format!("/users/{}/reconcile", user_id).as_str())
            .with_status(200)
            .with_body(r#"{"confirmed":true,"message":"balance matched"}"#)
            .create_async()
            .await;

        let provider = HttpUpstreamProvider::new(ProviderClient::new("upstream", server.url(), None));
        let result = provider.confirm_and_reconcile_balance(user_id).await.unwrap();

        assert!(result.confirmed);
        assert_eq!(result.message.as_deref(), Some("balance matched"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let provider = HttpUpstreamProvider::new(ProviderClient::new("upstream", server.url(), None));
        let result = provider.confirm_and_reconcile_balance(Uuid::new_v4()).await;

        assert!(matches!(result, Err(ProviderError::NotFound(_))));
    }
}
