//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An event ends before it starts.
    #[error("event ends ({end}) before it starts ({start})")]
    EndBeforeStart { start: String, end: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
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
    };
}

define_string_id!(
    /// A validated source identifier.
    ///
    /// Source IDs partition the event cache. They are normally derived from the
    /// feed address with [`SourceId::from_address`], which keeps them stable
    /// across runs and safe to use as a file name.
    SourceId, "source ID"
);

define_string_id!(
    /// A stable event identifier assigned by the calendar source (the ICS `UID`).
    Uid, "UID"
);

impl SourceId {
    /// Derives the cache partition key for a feed address.
    ///
    /// The key is a UUIDv5 in the URL namespace, so the same address always
    /// maps to the same partition.
    pub fn from_address(address: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_URL, address.trim().as_bytes()).to_string())
    }
}
