//! Settlement accounts and the normalized webhook event that references them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provider::ProvisionedAccount;

/// Provider-issued receiving identifier bound to one transaction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementAccount {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub account_number: String,
    pub account_name: String,
    pub bank_name: String,
    pub bank_code: String,
    pub provider_reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SettlementAccount {
    pub fn new(transaction_id: Uuid, provisioned: ProvisionedAccount) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_number: provisioned.account_number,
            account_name: provisioned.account_name,
            bank_name: provisioned.bank_name,
            bank_code: provisioned.bank_code,
            provider_reference: provisioned.provider_reference,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayerInfo {
    pub name: Option<String>,
    pub account_number: Option<String>,
    pub bank_name: Option<String>,
}

/// A settlement provider webhook after transport parsing and authentication.
///
/// `amount` is the settled amount in the source asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub settlement_account_id: String,
    pub amount: i64,
    pub provider_reference: String,
    #[serde(default)]
    pub payer_info: PayerInfo,
}
