//! Typed identifiers shared across tracker components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Stable node identifier.
///
/// Ordering over node ids is the stable sort key used by update-leader
/// election, so the wrapped name must be identical on every node that
/// refers to the same member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Wrap a stable node name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Raw node name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Globally unique job identifier: originating node plus a counter local
/// to that node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId {
    origin: NodeId,
    seq: u64,
}

impl JobId {
    /// Build a job id from its origin node and local sequence number.
    pub fn new(origin: NodeId, seq: u64) -> Self {
        Self { origin, seq }
    }

    /// Node that allocated this id.
    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    /// Local sequence number on the origin node.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.seq)
    }
}

/// Per-node monotonic allocator for [`JobId`]s.
#[derive(Debug)]
pub struct JobIdSource {
    origin: NodeId,
    next: AtomicU64,
}

impl JobIdSource {
    /// Create an allocator for the given node.
    pub fn new(origin: NodeId) -> Self {
        Self {
            origin,
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next job id.
    pub fn next_id(&self) -> JobId {
        JobId::new(self.origin.clone(), self.next.fetch_add(1, Ordering::Relaxed))
    }
}
