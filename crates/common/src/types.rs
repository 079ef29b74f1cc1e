use serde::{Deserialize, Serialize};

/// Identifier of an aggregate instance.
///
/// Identifiers are allocated by the event store from a monotonic sequence,
/// so they are never reused and order by allocation time. Wrapping the raw
/// integer keeps aggregate ids from being mixed up with sequence numbers or
/// other counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(i64);

impl AggregateId {
    /// Creates an aggregate ID from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AggregateId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<AggregateId> for i64 {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}
