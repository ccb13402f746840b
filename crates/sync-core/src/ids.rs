//! Opaque identifier newtypes.
//!
//! Entity identities are drawn from a 128-bit random space and never
//! change once assigned. Device/org/user identifiers are server- or
//! client-assigned opaque strings; we keep them as thin `String` wrappers
//! rather than `Uuid` directly because device fingerprints and org slugs
//! are not guaranteed to be UUIDs in every deployment.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique identity for a task or comment, assigned at creation time
/// by whichever peer creates the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! opaque_string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
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

opaque_string_id!(
    DeviceId,
    "Server-assigned device identity; distinct from the client-chosen fingerprint."
);
opaque_string_id!(OrgId, "Organization scope identifier.");
opaque_string_id!(UserId, "User identity, as issued by the external auth system.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_are_unique() {
        assert_ne!(EntityId::new(), EntityId::new());
    }

    #[test]
    fn device_id_round_trips_through_json() {
        let id = DeviceId::new("device-abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"device-abc\"");
        let back: DeviceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
