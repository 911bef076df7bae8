use async_trait::async_trait;

use super::client::ProviderClient;
use crate::domain::provider::{EmailNotification, PushNotification};
use crate::ports::{NotificationSender, ProviderError};

#[derive(Clone)]
pub struct HttpNotificationSender {
    client: ProviderClient,
}

impl HttpNotificationSender {
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSender for HttpNotificationSender {
    async fn send_push(&self, notification: &PushNotification) -> Result<(), ProviderError> {
        self.client.post("/push", notification).await
    }

    async fn send_email(&self, notification: &EmailNotification) -> Result<(), ProviderError> {
        self.client.post("/email", notification).await
    }
}

/// Used when no notification service is configured.
#[derive(Clone, Default)]
pub struct LogNotificationSender;

#[async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send_push(&self, notification: &PushNotification) -> Result<(), ProviderError> {
        tracing::info!(user_id = %notification.user_id, title = %notification.title, "Push notification");
        Ok(())
    }

    async fn send_email(&self, notification: &EmailNotification) -> Result<(), ProviderError> {
        tracing::info!(user_id = %notification.user_id, template = %notification.template, "Email notification");
        Ok(())
    }
}
