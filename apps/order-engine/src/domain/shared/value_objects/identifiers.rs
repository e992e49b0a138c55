//! Strongly-typed identifiers for domain entities.
//!
//! These prevent mixing up engine ids, broker ids and client order ids.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier from a string.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Generate an identifier of the form `{PREFIX}_{8 hex chars}`.
            #[must_use]
            pub fn tagged(prefix: &str) -> Self {
                Self(format!("{prefix}_{}", short_token()))
            }

            /// Get the inner string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

define_id!(
    OrderId,
    "Engine identifier for an advanced order (e.g. `BRACKET_1a2b3c4d`)."
);
define_id!(BrokerOrderId, "Broker's unique identifier for a single order.");
define_id!(
    ClientOrderId,
    "Client-assigned order id sent with each broker submission."
);

/// First eight hex characters of a fresh v4 UUID.
fn short_token() -> String {
    let mut token = uuid::Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_id_new_and_display() {
        let id = OrderId::new("BRACKET_deadbeef");
        assert_eq!(id.as_str(), "BRACKET_deadbeef");
        assert_eq!(format!("{id}"), "BRACKET_deadbeef");
    }

    #[test]
    fn tagged_ids_carry_prefix_and_token() {
        let id = OrderId::tagged("OCO");
        let (prefix, token) = id.as_str().split_once('_').unwrap();
        assert_eq!(prefix, "OCO");
        assert_eq!(token.len(), 8);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tagged_ids_are_unique() {
        let a = ClientOrderId::tagged("TWAP_0");
        let b = ClientOrderId::tagged("TWAP_0");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("TWAP_0_"));
    }

    #[test]
    fn broker_order_id_from_string() {
        let id: BrokerOrderId = "61e69015-8549-4bfd".into();
        assert_eq!(id.as_str(), "61e69015-8549-4bfd");

        let id: BrokerOrderId = String::from("abc").into();
        assert_eq!(id.into_inner(), "abc");
    }

    #[test]
    fn serde_is_transparent() {
        let id = OrderId::new("ICEBERG_00000001");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ICEBERG_00000001\"");

        let parsed: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}
