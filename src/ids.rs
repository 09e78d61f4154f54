//! Opaque, time-ordered identifiers for the entities in [`crate::model`].
//!
//! Every id is a newtype around a `String` holding a UUIDv7 (time-ordered,
//! index-friendly) string representation. Newtyping prevents accidentally
//! passing a `TenantId` where a `ConnectionId` is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

opaque_id!(TenantId);
opaque_id!(ConnectionId);
opaque_id!(ExecutionId);
opaque_id!(MigrationId);
opaque_id!(SnapshotId);
opaque_id!(AuditEntryId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_round_trip_through_json() {
        let a = TenantId::new();
        let b = TenantId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn from_str_preserves_value() {
        let id = ConnectionId::from("conn-123");
        assert_eq!(id.as_str(), "conn-123");
    }
}
