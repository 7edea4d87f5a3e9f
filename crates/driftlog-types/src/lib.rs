//! Shared types and identifiers for Driftlog.
//!
//! This crate defines the two values every other crate in the workspace
//! passes around: the [`EntryHash`] content address and the Lamport-style
//! [`Clock`] used to order log entries.

use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub mod hex;

// ---------------------------------------------------------------------------
// EntryHash
// ---------------------------------------------------------------------------

/// Content-addressed identifier for a log entry: `blake3(stored_bytes)`.
///
/// Serialized as the canonical lowercase hex string so that entries and
/// snapshots remain plain JSON on the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct EntryHash([u8; 32]);

impl EntryHash {
    /// Create a hash by digesting arbitrary data with BLAKE3.
    pub fn from_data(data: &[u8]) -> Self {
        Self(blake3::hash(data).into())
    }

    /// Return the raw 32-byte representation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, ()> {
        let bytes = hex::decode(s)?;
        let array: [u8; 32] = bytes.try_into().map_err(|_| ())?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for EntryHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for EntryHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryHash({self})")
    }
}

impl Serialize for EntryHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntryHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(|()| D::Error::custom(format!("invalid entry hash: {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Lamport-style logical clock carried by every log entry.
///
/// A `Clock` is an `(id, time)` pair where `id` names the writing identity
/// (a signing key, or the log id in unsigned mode) and `time` is a logical
/// counter. Comparison is total and deterministic: first by `time`, then by
/// `id` lexicographically. Two clocks equal on both are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clock {
    /// Identity of the writer this clock belongs to.
    pub id: String,
    /// Logical time, strictly increasing per writer.
    pub time: u64,
}

impl Clock {
    /// Create a clock starting at time zero.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_time(id, 0)
    }

    /// Create a clock at a specific time.
    pub fn with_time(id: impl Into<String>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// Return a new clock advanced by one.
    pub fn tick(&self) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time + 1,
        }
    }

    /// Merge with another clock, keeping this clock's identity.
    ///
    /// The result carries `max(self.time, other.time)` so that a writer who
    /// has witnessed a remote clock never goes backwards.
    pub fn merge(&self, other: &Clock) -> Self {
        Self {
            id: self.id.clone(),
            time: self.time.max(other.time),
        }
    }
}

impl Ord for Clock {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Clock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
