//! HTTP adapters for the external providers the core talks to.

pub mod accounts;
pub mod client;
pub mod notifications;
pub mod settlement;
pub mod upstream;

pub use accounts::HttpAccountProvider;
pub use client::ProviderClient;
pub use notifications::{HttpNotificationSender, LogNotificationSender};
pub use settlement::HttpSettlementProvider;
pub use upstream::HttpUpstreamProvider;
