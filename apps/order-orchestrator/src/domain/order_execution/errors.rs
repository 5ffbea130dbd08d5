//! Order execution errors.

use std::fmt;

use super::value_objects::OrderStatus;

/// Errors raised by the order aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Invalid state transition attempted.
    InvalidStateTransition {
        /// Current order status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
        /// Reason for failure.
        reason: String,
    },

    /// Fill quantity exceeds remaining quantity.
    FillExceedsRemaining {
        /// Fill quantity attempted.
        fill_qty: String,
        /// Remaining quantity.
        remaining_qty: String,
    },

    /// Invalid order parameters.
    InvalidParameters {
        /// Field with invalid value.
        field: String,
        /// Error message.
        message: String,
    },

    /// Exchange order id was already assigned.
    ExchangeOrderIdAlreadySet {
        /// The id already on the order.
        existing: String,
    },
}

impl OrderError {
    /// Shorthand for an invalid parameter error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStateTransition { from, to, reason } => {
                write!(f, "Invalid order state transition: {from} -> {to}: {reason}")
            }
            Self::FillExceedsRemaining {
                fill_qty,
                remaining_qty,
            } => write!(
                f,
                "Fill quantity {fill_qty} exceeds remaining quantity {remaining_qty}"
            ),
            Self::InvalidParameters { field, message } => {
                write!(f, "Invalid order parameter '{field}': {message}")
            }
            Self::ExchangeOrderIdAlreadySet { existing } => {
                write!(f, "Exchange order id already set to {existing}")
            }
        }
    }
}

impl std::error::Error for OrderError {}
