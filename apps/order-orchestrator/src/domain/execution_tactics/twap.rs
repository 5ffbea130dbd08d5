//! TWAP schedule.
//!
//! Splits a parent quantity into `num_children` equal slices spread evenly over
//! `duration_minutes`. Each slice is due one interval after the previous one,
//! the first one interval after the start, so the last lands at the end of the
//! window.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::domain::order_execution::{OrderError, TwapParams};

/// Fixed child size and interval for one TWAP parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwapSchedule {
    /// Quantity of every child order.
    pub child_quantity: Decimal,
    /// Number of child orders.
    pub num_children: u32,
    /// Time between consecutive children.
    pub interval: Duration,
}

impl TwapSchedule {
    /// Build the schedule for a parent quantity.
    ///
    /// # Errors
    ///
    /// Returns error if the parameters are not positive or the interval would
    /// be shorter than one millisecond.
    pub fn new(total_quantity: Decimal, params: TwapParams) -> Result<Self, OrderError> {
        if !params.is_valid() {
            return Err(OrderError::invalid(
                "metadata",
                "TWAP requires positive duration_minutes and num_children, at most one child per millisecond",
            ));
        }
        Ok(Self {
            child_quantity: total_quantity / Decimal::from(params.num_children),
            num_children: params.num_children,
            interval: Duration::from_millis(
                params.duration_millis() / u64::from(params.num_children),
            ),
        })
    }

    /// Timestamps at which each child is due.
    #[must_use]
    pub fn due_times(&self, start: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        let interval = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::zero());
        (1..=self.num_children)
            .map(|i| start + interval * i32::try_from(i).unwrap_or(i32::MAX))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ten_minutes_five_children() {
        let schedule = TwapSchedule::new(dec!(10), TwapParams::new(10, 5)).unwrap();
        assert_eq!(schedule.child_quantity, dec!(2));
        assert_eq!(schedule.num_children, 5);
        assert_eq!(schedule.interval, Duration::from_secs(120));
    }

    #[test]
    fn uneven_split_keeps_precision() {
        let schedule = TwapSchedule::new(dec!(1), TwapParams::new(1, 3)).unwrap();
        assert_eq!(schedule.interval, Duration::from_secs(20));
        assert!(schedule.child_quantity * dec!(3) <= dec!(1));
    }

    #[test]
    fn due_times_span_the_whole_window() {
        let start = Utc::now();
        let schedule = TwapSchedule::new(dec!(10), TwapParams::new(10, 5)).unwrap();
        let due = schedule.due_times(start);
        assert_eq!(due.len(), 5);
        assert_eq!(due[0], start + TimeDelta::minutes(2));
        assert_eq!(due[4], start + TimeDelta::minutes(10));
    }

    #[test]
    fn zero_children_is_an_error() {
        assert!(TwapSchedule::new(dec!(10), TwapParams::new(10, 0)).is_err());
    }

    #[test]
    fn sub_millisecond_interval_is_an_error() {
        assert!(TwapSchedule::new(dec!(60001), TwapParams::new(1, 60_001)).is_err());
        let tight = TwapSchedule::new(dec!(60000), TwapParams::new(1, 60_000)).unwrap();
        assert_eq!(tight.interval, Duration::from_millis(1));
    }
}
