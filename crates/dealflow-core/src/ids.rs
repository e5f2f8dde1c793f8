//! Identifier newtypes.
//!
//! Every entity handled by the core is keyed by a UUID; the newtypes keep a
//! contact id from being passed where a deal id is expected.

use crate::error::DealflowError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DealflowError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim()).map(Self).map_err(|_| {
                    DealflowError::InvalidInput(format!("invalid {} '{}'", $label, value))
                })
            }
        }
    };
}

uuid_id!(
    /// Controlling account. Every deal, contact and log entry is scoped to one.
    OwnerId,
    "owner id"
);
uuid_id!(
    /// Unique identifier for a deal
    DealId,
    "deal id"
);
uuid_id!(
    /// Unique identifier for a contact
    ContactId,
    "contact id"
);
uuid_id!(
    /// Unique identifier for a dispatch log entry
    LogEntryId,
    "log entry id"
);
