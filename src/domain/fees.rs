use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRule {
    pub value: BigDecimal,
    pub is_percentage: bool,
}

impl FeeRule {
    pub fn fixed(value: BigDecimal) -> Self {
        Self {
            value,
            is_percentage: false,
        }
    }

    pub fn percentage(value: BigDecimal) -> Self {
        Self {
            value,
            is_percentage: true,
        }
    }

    pub fn zero() -> Self {
        Self::fixed(BigDecimal::from(0))
    }
}

/// Versioned per-provider fee schedule. Fixed values are expressed in the
/// source asset's smallest unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeConfig {
    pub id: Uuid,
    pub provider: String,
    pub version: i32,
    pub disbursement_fee: FeeRule,
    pub partner_fee: FeeRule,
    pub is_active: bool,
}
