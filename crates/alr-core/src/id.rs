//! Identifier newtypes
//!
//! Artifact and collection identifiers are ULIDs assigned by the runtime.
//! State, type and user identifiers are configuration-supplied strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Ulid);

        impl $name {
            /// Generate a fresh identifier
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
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

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ulid::from_string(s).map(Self)
            }
        }
    };
}

macro_rules! name_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow as `&str`
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

ulid_id!(
    /// Globally unique artifact identifier
    ArtifactId
);

ulid_id!(
    /// Globally unique collection identifier
    CollectionId
);

name_id!(
    /// State identifier, unique within one artifact type
    StateId
);

name_id!(
    /// Artifact type identifier (keys the transition tables)
    ArtifactTypeId
);

name_id!(
    /// User identifier
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_roundtrips_through_display() {
        let id = ArtifactId::new();
        let parsed: ArtifactId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn artifact_ids_are_unique() {
        assert_ne!(ArtifactId::new(), ArtifactId::new());
    }

    #[test]
    fn state_id_serializes_as_plain_string() {
        let id = StateId::from("configured");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"configured\"");
    }
}
