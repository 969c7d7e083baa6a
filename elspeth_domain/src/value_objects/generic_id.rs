// /////////////////////////////////////////////////////////////////////////////
// Elspeth
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Generic Typed Identifier
//!
//! ULID-backed, marker-typed identifier shared by every audit entity. Each
//! entity declares a zero-sized marker implementing [`IdCategory`]; the
//! resulting newtypes cannot be confused with one another at compile time,
//! while all of them share one storage representation (26-character ULID
//! string, TEXT column in the Landscape).
//!
//! ULIDs are time-ordered, so identifiers double as a chronological sort key
//! in audit queries without an extra column.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use ulid::Ulid;

use crate::error::EngineError;

/// Category marker for a typed identifier.
///
/// Implementations are zero-sized types; `category_name` feeds error
/// messages and diagnostics.
pub trait IdCategory {
    /// Human-readable category name (e.g., "run", "token").
    fn category_name() -> &'static str;
}

/// A typed ULID identifier.
///
/// Equality, ordering, and hashing delegate to the underlying ULID; the
/// marker exists only in the type system.
#[derive(Debug, Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct GenericId<T: IdCategory> {
    value: Ulid,
    #[serde(skip)]
    _phantom: std::marker::PhantomData<T>,
}

impl<T: IdCategory> GenericId<T> {
    /// Generates a new time-ordered identifier.
    pub fn new() -> Self {
        Self {
            value: Ulid::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Wraps an existing ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            value: ulid,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Parses from the canonical 26-character ULID string form.
    pub fn from_string(s: &str) -> Result<Self, EngineError> {
        let ulid = Ulid::from_string(s).map_err(|e| {
            EngineError::InvalidConfiguration(format!(
                "Invalid {} id '{}': {}",
                T::category_name(),
                s,
                e
            ))
        })?;
        Ok(Self::from_ulid(ulid))
    }

    /// Returns the underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.value
    }

    /// Milliseconds since epoch encoded in the identifier.
    pub fn timestamp_ms(&self) -> u64 {
        self.value.timestamp_ms()
    }

    /// The identifier's category name.
    pub fn category(&self) -> &'static str {
        T::category_name()
    }

    /// The nil identifier (all zero). Used only as an explicit sentinel.
    pub fn nil() -> Self {
        Self::from_ulid(Ulid::nil())
    }

    /// True if this is the nil sentinel.
    pub fn is_nil(&self) -> bool {
        self.value.is_nil()
    }
}

impl<T: IdCategory> Clone for GenericId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdCategory> Copy for GenericId<T> {}

impl<T: IdCategory> PartialEq for GenericId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T: IdCategory> Eq for GenericId<T> {}

impl<T: IdCategory> PartialOrd for GenericId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdCategory> Ord for GenericId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl<T: IdCategory> Hash for GenericId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<T: IdCategory> Default for GenericId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: IdCategory> Display for GenericId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T: IdCategory> FromStr for GenericId<T> {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct TestMarker;
    impl IdCategory for TestMarker {
        fn category_name() -> &'static str {
            "test"
        }
    }

    #[test]
    fn round_trips_through_string() {
        let id: GenericId<TestMarker> = GenericId::new();
        let parsed = GenericId::<TestMarker>::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn rejects_garbage() {
        assert!(GenericId::<TestMarker>::from_string("not-a-ulid").is_err());
    }

    #[test]
    fn ids_are_time_ordered() {
        let a: GenericId<TestMarker> = GenericId::new();
        let b: GenericId<TestMarker> = GenericId::new();
        assert!(a <= b);
    }

    #[test]
    fn nil_sentinel() {
        let nil = GenericId::<TestMarker>::nil();
        assert!(nil.is_nil());
        assert!(!GenericId::<TestMarker>::new().is_nil());
    }
}
