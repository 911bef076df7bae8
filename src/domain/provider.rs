//! Request and response shapes exchanged with external collaborators.
//! Only the fields the core reads are modelled.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub confirmed: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub channel_type: String,
    pub ramp_type: String,
    pub country: String,
    pub currency: String,
    pub status: String,
}

impl Channel {
    /// Active bank channel that can pay out to a local account.
    pub fn is_bank_payout(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
            && self.channel_type.eq_ignore_ascii_case("bank")
            && self.ramp_type.eq_ignore_ascii_case("withdraw")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    pub id: String,
    pub name: String,
    pub code: String,
    pub status: String,
    #[serde(default)]
    pub channel_ids: Vec<String>,
}

impl Bank {
    pub fn supports(&self, channel: &Channel) -> bool {
        self.status.eq_ignore_ascii_case("active") && self.channel_ids.contains(&channel.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDestination {
    pub account_number: String,
    pub account_name: String,
    pub account_type: String,
    pub bank_id: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub sequence_id: String,
    pub channel_id: String,
    pub country: String,
    pub currency: String,
    pub amount: i64,
    pub reason: String,
    pub destination: PayoutDestination,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    pub provider_reference: String,
    pub sequence_reference: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionedAccount {
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub bank_code: String,
    pub provider_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    pub user_id: Uuid,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailNotification {
    pub user_id: Uuid,
    pub template: String,
    pub data: serde_json::Value,
}
