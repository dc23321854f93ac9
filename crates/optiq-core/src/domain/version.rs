//! Store-issued version tags.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque version tag handed out by the store on every read.
///
/// Every successful write produces a new tag. Callers only compare tags for
/// equality; the numeric value is meaningful to the issuing store alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Build a tag. Intended for store implementations.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: Version,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: Version) -> Self {
        Self { value, version }
    }

    pub fn into_parts(self) -> (T, Version) {
        (self.value, self.version)
    }
}
