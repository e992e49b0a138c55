//! Advanced order errors.

use rust_decimal::Decimal;
use thiserror::Error;

use super::value_objects::{OrderStatus, OrderType};

/// Errors raised while validating or advancing an advanced order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Symbol was blank.
    #[error("Symbol must not be empty")]
    EmptySymbol,

    /// A quantity was zero.
    #[error("{field} must be positive")]
    NonPositiveQuantity {
        /// Offending field.
        field: &'static str,
    },

    /// A price was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositivePrice {
        /// Offending field.
        field: &'static str,
        /// Supplied value.
        value: Decimal,
    },

    /// Protective prices sit on the wrong side of the entry.
    #[error("Invalid price ordering: {reason}")]
    InvalidPriceOrdering {
        /// Which relation failed.
        reason: String,
    },

    /// Iceberg visible slice larger than the parent order.
    #[error("Visible quantity {visible} exceeds total quantity {total}")]
    VisibleExceedsTotal {
        /// Visible quantity.
        visible: u64,
        /// Total quantity.
        total: u64,
    },

    /// Trail is neither a positive amount nor a percent in (0, 100).
    #[error("Trail must be a positive amount or a percent between 0 and 100")]
    InvalidTrail,

    /// OCO leg type other than LIMIT or STOP.
    #[error("OCO legs must be LIMIT or STOP, got {0}")]
    UnsupportedLegType(OrderType),

    /// Slicing window too short.
    #[error("Duration of {minutes} minutes is below the {minimum} minute minimum")]
    DurationTooShort {
        /// Requested duration.
        minutes: u32,
        /// Smallest accepted duration.
        minimum: u32,
    },

    /// Backward or out-of-terminal status change.
    #[error("Invalid order state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
    },
}

/// Reject a zero quantity.
pub(crate) const fn require_quantity(field: &'static str, quantity: u64) -> Result<(), OrderError> {
    if quantity == 0 {
        return Err(OrderError::NonPositiveQuantity { field });
    }
    Ok(())
}

/// Reject a non-positive price.
pub(crate) fn require_price(field: &'static str, value: Decimal) -> Result<(), OrderError> {
    if value <= Decimal::ZERO {
        return Err(OrderError::NonPositivePrice { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn error_messages_name_the_field() {
        let err = require_price("stop loss", dec!(-1)).unwrap_err();
        assert_eq!(err.to_string(), "stop loss must be positive, got -1");

        let err = require_quantity("quantity", 0).unwrap_err();
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn transition_error_display() {
        let err = OrderError::InvalidTransition {
            from: OrderStatus::Filled,
            to: OrderStatus::Submitted,
        };
        assert_eq!(
            err.to_string(),
            "Invalid order state transition: FILLED -> SUBMITTED"
        );
    }
}
