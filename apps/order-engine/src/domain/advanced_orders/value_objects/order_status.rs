//! Order status in the lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status shared by advanced orders and their broker legs.
///
/// ```text
/// PENDING -> SUBMITTED -> PARTIALLY_FILLED -> FILLED
///                 |              |
///                 +--> REJECTED  +--> CANCELLED | EXPIRED
/// ```
///
/// Status only moves forward; terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created locally, nothing sent yet.
    Pending,
    /// Accepted by the broker, nothing filled.
    Submitted,
    /// Some quantity filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Cancelled by us or by the broker.
    Cancelled,
    /// Refused by the broker.
    Rejected,
    /// Lapsed at the end of its time in force.
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is live at the broker.
    #[must_use]
    pub const fn is_working(&self) -> bool {
        matches!(self, Self::Submitted | Self::PartiallyFilled)
    }

    /// Returns true if moving to `next` is a legal forward step.
    ///
    /// `PartiallyFilled -> PartiallyFilled` is legal (another fill).
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Submitted | Self::Rejected | Self::Cancelled),
            Self::Submitted => matches!(
                next,
                Self::PartiallyFilled
                    | Self::Filled
                    | Self::Cancelled
                    | Self::Rejected
                    | Self::Expired
            ),
            Self::PartiallyFilled => matches!(
                next,
                Self::PartiallyFilled | Self::Filled | Self::Cancelled | Self::Expired
            ),
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired => false,
        }
    }

    /// Move to `next` if the step is legal. Returns whether it moved.
    pub fn advance(&mut self, next: Self) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            Self::Filled => write!(f, "FILLED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Submitted,
        OrderStatus::PartiallyFilled,
        OrderStatus::Filled,
        OrderStatus::Cancelled,
        OrderStatus::Rejected,
        OrderStatus::Expired,
    ];

    #[test]
    fn order_status_is_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
    }

    #[test]
    fn terminal_states_never_transition() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test_case(OrderStatus::Pending, OrderStatus::Submitted, true)]
    #[test_case(OrderStatus::Submitted, OrderStatus::Filled, true)]
    #[test_case(OrderStatus::Submitted, OrderStatus::Pending, false)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled, true)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Submitted, false)]
    #[test_case(OrderStatus::PartiallyFilled, OrderStatus::Rejected, false)]
    #[test_case(OrderStatus::Submitted, OrderStatus::Expired, true)]
    fn transitions(from: OrderStatus, to: OrderStatus, legal: bool) {
        assert_eq!(from.can_transition_to(to), legal);
    }

    #[test]
    fn advance_ignores_backward_steps() {
        let mut status = OrderStatus::Filled;
        assert!(!status.advance(OrderStatus::Submitted));
        assert_eq!(status, OrderStatus::Filled);

        let mut status = OrderStatus::Submitted;
        assert!(status.advance(OrderStatus::PartiallyFilled));
        assert_eq!(status, OrderStatus::PartiallyFilled);
    }

    #[test]
    fn serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PartiallyFilled).unwrap();
        assert_eq!(json, "\"PARTIALLY_FILLED\"");
    }
}
