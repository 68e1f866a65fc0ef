//! Risk management - Emergency stop balance check

use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::core::{TradingApi, TradingApiError};

/// Result of one emergency stop evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Threshold is zero; the check is switched off.
    Disabled,
    /// Balance at or above the threshold.
    Passed { balance: Decimal },
    /// Balance strictly below the threshold.
    Tripped { balance: Decimal, threshold: Decimal },
    /// Balance query hit a network failure; not enforced this cycle.
    Unverified,
}

impl GuardOutcome {
    pub fn is_tripped(&self) -> bool {
        matches!(self, GuardOutcome::Tripped { .. })
    }
}

/// Halts trading when a watched balance falls below a floor.
#[derive(Debug, Clone)]
pub struct EmergencyStopGuard {
    currency: String,
    threshold: Decimal,
}

impl EmergencyStopGuard {
    pub fn new(currency: impl Into<String>, threshold: Decimal) -> Self {
        Self {
            currency: currency.into(),
            threshold,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn threshold(&self) -> Decimal {
        self.threshold
    }

    pub fn is_enabled(&self) -> bool {
        !self.threshold.is_zero()
    }

    /// Query the balance and compare it with the threshold.
    ///
    /// Network failures degrade to [`GuardOutcome::Unverified`]; exchange
    /// failures are returned to the caller.
    pub async fn check(&self, api: &dyn TradingApi) -> Result<GuardOutcome, TradingApiError> {
        if !self.is_enabled() {
            return Ok(GuardOutcome::Disabled);
        }

        let balance = match api.get_balance(&self.currency).await {
            Ok(balance) => balance,
            Err(e) if e.is_network() => {
                warn!(
                    currency = %self.currency,
                    error = %e,
                    "Emergency stop check skipped: balance query failed, continuing this cycle"
                );
                return Ok(GuardOutcome::Unverified);
            }
            Err(e) => return Err(e),
        };

        debug!(
            currency = %self.currency,
            %balance,
            threshold = %self.threshold,
            "Emergency stop check"
        );

        if balance < self.threshold {
            Ok(GuardOutcome::Tripped {
                balance,
                threshold: self.threshold,
            })
        } else {
            Ok(GuardOutcome::Passed { balance })
        }
    }
}
