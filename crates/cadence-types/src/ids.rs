//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Agents, goals, and interceptors each get a distinct ID type so they
//! cannot be mixed up at compile time. All IDs use UUID v7 (time-ordered),
//! which also gives the tick executor a stable sort key when it orders a
//! drained schedule before a seeded shuffle.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an agent on a platform.
    AgentId
}

define_id! {
    /// Unique identifier for an adopted goal.
    GoalId
}

define_id! {
    /// Unique identifier for a trigger interceptor, used to remove it later.
    InterceptorId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let agent = AgentId::new();
        let goal = GoalId::new();
        assert_ne!(agent.into_inner(), Uuid::nil());
        assert_ne!(goal.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_roundtrip_serde() {
        let original = AgentId::new();
        let json = serde_json::to_string(&original).ok();
        assert!(json.is_some());
        let restored: Result<AgentId, _> = serde_json::from_str(json.as_deref().unwrap_or(""));
        assert_eq!(restored.ok(), Some(original));
    }

    #[test]
    fn ids_created_later_sort_later() {
        let first = AgentId::from(Uuid::from_u128(1));
        let second = AgentId::from(Uuid::from_u128(2));
        assert!(first < second);
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = InterceptorId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
