//! Pure pre-trade limit checks.
//!
//! The checks run in a fixed order and stop at the first failure:
//! kill switch, max order value, max open positions, per-symbol exposure,
//! total exposure. Fetching market data between the kill switch and the value
//! checks is the caller's job.

use rust_decimal::Decimal;

use crate::domain::risk_management::errors::{RiskCheck, RiskViolation};
use crate::domain::risk_management::value_objects::{OpenExposure, RiskProfile};

/// Stateless evaluator for a [`RiskProfile`].
pub struct PreTradeLimits;

impl PreTradeLimits {
    /// Fails if the account kill switch is engaged.
    ///
    /// # Errors
    ///
    /// Returns a [`RiskCheck::KillSwitch`] violation.
    pub fn check_kill_switch(profile: &RiskProfile) -> Result<(), RiskViolation> {
        if profile.trading_halted {
            return Err(RiskViolation::new(
                RiskCheck::KillSwitch,
                "Trading is currently halted for this account by an administrator.",
            ));
        }
        Ok(())
    }

    /// Run the value, count and exposure checks for a candidate order.
    ///
    /// # Errors
    ///
    /// Returns the first violated check.
    pub fn check_limits(
        profile: &RiskProfile,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        positions: &[OpenExposure],
    ) -> Result<(), RiskViolation> {
        let order_value = quantity * price;

        if let Some(limit) = active(profile.max_order_value_usd) {
            if order_value > limit {
                return Err(RiskViolation::new(
                    RiskCheck::MaxOrderValue,
                    format!(
                        "Order value ${} exceeds the maximum single order value of ${}.",
                        usd(order_value),
                        usd(limit)
                    ),
                ));
            }
        }

        if let Some(limit) = profile.max_open_positions {
            if positions.len() >= limit as usize {
                return Err(RiskViolation::new(
                    RiskCheck::MaxOpenPositions,
                    format!("Exceeds maximum of {limit} open positions."),
                ));
            }
        }

        if let Some(limit) = active(profile.max_exposure_per_symbol_usd) {
            let current: Decimal = positions
                .iter()
                .filter(|p| p.symbol == symbol)
                .map(OpenExposure::notional)
                .sum();
            let potential = current + order_value;
            if potential > limit {
                return Err(RiskViolation::new(
                    RiskCheck::SymbolExposure,
                    format!(
                        "Order for {symbol} would increase exposure to ${}, exceeding the limit of ${}.",
                        usd(potential),
                        usd(limit)
                    ),
                ));
            }
        }

        if let Some(limit) = active(profile.max_total_exposure_usd) {
            let current: Decimal = positions.iter().map(OpenExposure::notional).sum();
            let potential = current + order_value;
            if potential > limit {
                return Err(RiskViolation::new(
                    RiskCheck::TotalExposure,
                    format!(
                        "Order would increase total account exposure to ${}, exceeding the limit of ${}.",
                        usd(potential),
                        usd(limit)
                    ),
                ));
            }
        }

        Ok(())
    }
}

fn active(limit: Option<Decimal>) -> Option<Decimal> {
    limit.filter(|l| !l.is_zero())
}

fn usd(value: Decimal) -> String {
    format!("{:.2}", value.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::UserId;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn profile() -> RiskProfile {
        RiskProfile::unrestricted(UserId::new("u1"))
    }

    fn position(symbol: &str, volume: Decimal, price: Decimal) -> OpenExposure {
        OpenExposure {
            symbol: symbol.to_string(),
            volume,
            price_current: price,
        }
    }

    #[test]
    fn unrestricted_profile_passes() {
        let positions = vec![position("EURUSD", dec!(100000), dec!(1.1))];
        assert!(
            PreTradeLimits::check_limits(&profile(), "EURUSD", dec!(1000), dec!(1000), &positions)
                .is_ok()
        );
    }

    #[test]
    fn kill_switch_is_permission_denied() {
        let mut p = profile();
        p.trading_halted = true;
        let err = PreTradeLimits::check_kill_switch(&p).unwrap_err();
        assert!(err.is_permission_denied());
    }

    #[test_case(dec!(10), dec!(100), false ; "value above limit")]
    #[test_case(dec!(5), dec!(100), true ; "value equal to limit")]
    #[test_case(dec!(4), dec!(100), true ; "value below limit")]
    fn max_order_value(qty: Decimal, price: Decimal, passes: bool) {
        let mut p = profile();
        p.max_order_value_usd = Some(dec!(500));
        let result = PreTradeLimits::check_limits(&p, "BTCUSDT", qty, price, &[]);
        assert_eq!(result.is_ok(), passes);
        if let Err(v) = result {
            assert_eq!(v.check, RiskCheck::MaxOrderValue);
        }
    }

    #[test]
    fn zero_usd_limit_is_inactive() {
        let mut p = profile();
        p.max_order_value_usd = Some(Decimal::ZERO);
        assert!(PreTradeLimits::check_limits(&p, "X", dec!(1), dec!(1), &[]).is_ok());
    }

    #[test]
    fn open_positions_limit_blocks_at_limit() {
        let mut p = profile();
        p.max_open_positions = Some(2);
        let one = vec![position("A", dec!(1), dec!(1))];
        let two = vec![position("A", dec!(1), dec!(1)), position("B", dec!(1), dec!(1))];

        assert!(PreTradeLimits::check_limits(&p, "C", dec!(1), dec!(1), &one).is_ok());
        let err = PreTradeLimits::check_limits(&p, "C", dec!(1), dec!(1), &two).unwrap_err();
        assert_eq!(err.check, RiskCheck::MaxOpenPositions);
    }

    #[test]
    fn symbol_exposure_counts_only_matching_symbol() {
        let mut p = profile();
        p.max_exposure_per_symbol_usd = Some(dec!(1000));
        let positions = vec![
            position("ETHUSDT", dec!(1), dec!(900)),
            position("BTCUSDT", dec!(1), dec!(50000)),
        ];

        let err = PreTradeLimits::check_limits(&p, "ETHUSDT", dec!(1), dec!(200), &positions)
            .unwrap_err();
        assert_eq!(err.check, RiskCheck::SymbolExposure);
        assert!(err.message.contains("1100.00"));

        assert!(PreTradeLimits::check_limits(&p, "SOLUSDT", dec!(1), dec!(200), &positions).is_ok());
    }

    #[test]
    fn total_exposure_sums_all_positions() {
        let mut p = profile();
        p.max_total_exposure_usd = Some(dec!(2000));
        let positions = vec![
            position("A", dec!(1), dec!(900)),
            position("B", dec!(2), dec!(500)),
        ];
        let err = PreTradeLimits::check_limits(&p, "C", dec!(1), dec!(101), &positions).unwrap_err();
        assert_eq!(err.check, RiskCheck::TotalExposure);
    }

    #[test]
    fn first_failing_check_wins() {
        let mut p = profile();
        p.max_order_value_usd = Some(dec!(10));
        p.max_open_positions = Some(0);
        p.max_total_exposure_usd = Some(dec!(1));
        let err = PreTradeLimits::check_limits(&p, "X", dec!(1), dec!(100), &[]).unwrap_err();
        assert_eq!(err.check, RiskCheck::MaxOrderValue);
    }
}
