//! Order State Machine Service
//!
//! Validates lifecycle transitions. Terminal states are absorbing.

use crate::domain::order_execution::errors::OrderError;
use crate::domain::order_execution::value_objects::OrderStatus;

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From PendingSubmit (Accepted only for algorithmic parents)
            (OrderStatus::PendingSubmit, OrderStatus::Submitted)
                | (OrderStatus::PendingSubmit, OrderStatus::Accepted)
                | (OrderStatus::PendingSubmit, OrderStatus::Canceled)
                | (OrderStatus::PendingSubmit, OrderStatus::Error)
                // From Submitted
                | (OrderStatus::Submitted, OrderStatus::Accepted)
                | (OrderStatus::Submitted, OrderStatus::Rejected)
                | (OrderStatus::Submitted, OrderStatus::Canceled)
                | (OrderStatus::Submitted, OrderStatus::Expired)
                | (OrderStatus::Submitted, OrderStatus::Error)
                // From Accepted
                | (OrderStatus::Accepted, OrderStatus::PartiallyFilled)
                | (OrderStatus::Accepted, OrderStatus::Filled)
                | (OrderStatus::Accepted, OrderStatus::Rejected)
                | (OrderStatus::Accepted, OrderStatus::Canceled)
                | (OrderStatus::Accepted, OrderStatus::Expired)
                | (OrderStatus::Accepted, OrderStatus::Error)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Canceled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Expired)
                | (OrderStatus::PartiallyFilled, OrderStatus::Error)
        )
    }

    /// Validate a state transition.
    ///
    /// # Errors
    ///
    /// Returns error if the transition is invalid.
    pub fn validate_transition(from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                from,
                to,
                reason: Self::transition_error_reason(from, to),
            })
        }
    }

    /// Get a human-readable reason for an invalid transition.
    #[must_use]
    pub fn transition_error_reason(from: OrderStatus, to: OrderStatus) -> String {
        if from.is_terminal() {
            format!("Order is already {from}, cannot transition to {to}")
        } else {
            format!("Invalid transition from {from} to {to}")
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        OrderStatus::ALL
            .into_iter()
            .filter(|to| Self::is_valid_transition(from, *to))
            .collect()
    }
}
