//! Disbursement and partner fee math.
//!
//! Inputs are in the source asset's smallest unit; multiplying by the
//! settlement rate yields the target asset's smallest unit. Everything is
//! computed in `BigDecimal` and only the final net is floored to an integer.

use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use thiserror::Error;

use crate::domain::{FeeConfig, FeeRule};

#[derive(Debug, Error, PartialEq)]
pub enum FeeError {
    #[error("Settlement rate must be positive, got {0}")]
    InvalidRate(BigDecimal),

    #[error("{what} must not be negative, got {value}")]
    Negative { what: &'static str, value: BigDecimal },

    #[error("Net amount {0} does not fit in a ledger amount")]
    OutOfRange(BigDecimal),
}

impl FeeError {
    /// Bad rate or fee values are configuration problems; everything else
    /// means the inputs combined into an amount the ledger must not accept.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FeeError::InvalidRate(_)
                | FeeError::Negative {
                    what: "fee value",
                    ..
                }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub gross: BigDecimal,
    pub disbursement_fee: BigDecimal,
    pub partner_fee: BigDecimal,
    /// `floor(gross - fees)` in the target asset's smallest unit.
    pub net: i64,
}

/// Fee for one rule, converted into the target unit at `rate`.
pub fn compute_fee(
    base_amount: &BigDecimal,
    rule: &FeeRule,
    rate: &BigDecimal,
) -> Result<BigDecimal, FeeError> {
    check_rate(rate)?;
    if rule.value < BigDecimal::zero() {
        return Err(FeeError::Negative {
            what: "fee value",
            value: rule.value.clone(),
        });
    }

    let fee_in_source = if rule.is_percentage {
        base_amount * &rule.value / BigDecimal::from(100)
    } else {
        rule.value.clone()
    };

    Ok(fee_in_source * rate)
}

pub fn compute_net(
    base_amount: &BigDecimal,
    config: &FeeConfig,
    rate: &BigDecimal,
) -> Result<FeeBreakdown, FeeError> {
    check_rate(rate)?;
    if *base_amount < BigDecimal::zero() {
        return Err(FeeError::Negative {
            what: "base amount",
            value: base_amount.clone(),
        });
    }

    let gross = base_amount * rate;
    let disbursement_fee = compute_fee(base_amount, &config.disbursement_fee, rate)?;
    let partner_fee = compute_fee(base_amount, &config.partner_fee, rate)?;

    let remainder = &gross - (&disbursement_fee + &partner_fee);
    if remainder < BigDecimal::zero() {
        return Err(FeeError::Negative {
            what: "net amount",
            value: remainder,
        });
    }

    // Scale reduction truncates; on a non-negative value that is the floor.
    let floored = remainder.with_scale(0);
    let net = floored
        .to_i64()
        .ok_or_else(|| FeeError::OutOfRange(floored.clone()))?;

    Ok(FeeBreakdown {
        gross,
        disbursement_fee,
        partner_fee,
        net,
    })
}

fn check_rate(rate: &BigDecimal) -> Result<(), FeeError> {
    if *rate <= BigDecimal::zero() {
        return Err(FeeError::InvalidRate(rate.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn config(disbursement: FeeRule, partner: FeeRule) -> FeeConfig {
        FeeConfig {
            id: Uuid::new_v4(),
            provider: "test".to_string(),
            version: 1,
            disbursement_fee: disbursement,
            partner_fee: partner,
            is_active: true,
        }
    }

    #[test]
    fn test_percentage_fee() {
        let fee = compute_fee(&dec("1000"), &FeeRule::percentage(dec("1")), &dec("1500")).unwrap();
        assert_eq!(fee, dec("15000"));
    }

    #[test]
    fn test_fixed_fee_is_source_denominated() {
        let fee = compute_fee(&dec("50"), &FeeRule::fixed(dec("2")), &dec("1500")).unwrap();
        assert_eq!(fee, dec("3000"));
    }

    #[test]
    fn test_fixed_fee_larger_than_amount_is_rejected() {
        let cfg = config(FeeRule::fixed(dec("100")), FeeRule::zero());
        let err = compute_net(&dec("50"), &cfg, &dec("1500")).unwrap_err();
        assert_eq!(
            err,
            FeeError::Negative {
                what: "net amount",
                value: dec("-75000"),
            }
        );
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_net_for_one_percent_disbursement() {
        let cfg = config(FeeRule::percentage(dec("1")), FeeRule::zero());
        let breakdown = compute_net(&dec("100"), &cfg, &dec("1500")).unwrap();

        assert_eq!(breakdown.gross, dec("150000"));
        assert_eq!(breakdown.disbursement_fee, dec("1500"));
        assert_eq!(breakdown.partner_fee, dec("0"));
        assert_eq!(breakdown.net, 148_500);
    }

    #[test]
    fn test_net_is_floored_never_rounded_up() {
        let cfg = config(FeeRule::percentage(dec("0.3")), FeeRule::zero());
        // gross 1000.5, fee 3.0015 -> 997.4985
        let breakdown = compute_net(&dec("667"), &cfg, &dec("1.5")).unwrap();
        assert_eq!(breakdown.net, 997);

        let cfg = config(FeeRule::zero(), FeeRule::zero());
        let breakdown = compute_net(&dec("3"), &cfg, &dec("0.3333")).unwrap();
        assert_eq!(breakdown.net, 0);
    }

    #[test]
    fn test_partner_and_disbursement_fees_combine() {
        let cfg = config(FeeRule::percentage(dec("1")), FeeRule::fixed(dec("10")));
        let breakdown = compute_net(&dec("10000"), &cfg, &dec("1500")).unwrap();
        // 15_000_000 - 150_000 - 15_000
        assert_eq!(breakdown.net, 14_835_000);
    }

    #[test]
    fn test_non_positive_rate_is_configuration_error() {
        let cfg = config(FeeRule::zero(), FeeRule::zero());
        let err = compute_net(&dec("100"), &cfg, &dec("0")).unwrap_err();
        assert!(matches!(err, FeeError::InvalidRate(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_negative_fee_value_is_configuration_error() {
        let cfg = config(FeeRule::fixed(dec("-5")), FeeRule::zero());
        let err = compute_net(&dec("100"), &cfg, &dec("1500")).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_out_of_range_net_is_rejected() {
        let cfg = config(FeeRule::zero(), FeeRule::zero());
        let err = compute_net(&dec("9223372036854775807"), &cfg, &dec("2")).unwrap_err();
        assert!(matches!(err, FeeError::OutOfRange(_)));
    }
}
