//! Identifier types for plan nodes and descriptors.
//!
//! These wrap the raw numeric ids found in serialized plan fragments so that a
//! slot id can never be passed where a tuple id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Creates an id from its raw value.
            #[inline]
            #[must_use]
            pub const fn new(id: u32) -> Self {
                Self(id)
            }

            /// Returns the raw value.
            #[inline]
            #[must_use]
            pub const fn as_u32(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(id: u32) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifies one node of a plan fragment.
    ///
    /// # Example
    ///
    /// ```rust
    /// use nexus_common::types::PlanNodeId;
    ///
    /// let id = PlanNodeId::new(3);
    /// assert_eq!(id.as_u32(), 3);
    /// assert_eq!(id.to_string(), "3");
    /// ```
    PlanNodeId,
    "PlanNodeId"
);

define_id!(
    /// Identifies a tuple layout in the descriptor table.
    TupleId,
    "TupleId"
);

define_id!(
    /// Identifies a single slot (column) across the whole descriptor table.
    SlotId,
    "SlotId"
);
