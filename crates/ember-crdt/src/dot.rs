//! Dots and dot contexts - causality tracking for delta-state CRDTs
//!
//! A **dot** `(node_id, counter)` uniquely identifies one operation issued by
//! one replica. A **dot context** is the causal history a replica carries:
//!
//! - `clock`: per-node largest *contiguous* counter observed. Everything at or
//!   below the clock has been seen; no gaps allowed.
//! - `dot_cloud`: dots observed out of order, i.e. with a gap below them.
//!
//! Compaction moves dots from the cloud into the clock as the gaps fill in,
//! keeping the representation small.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Replica identifier.
pub type NodeId = String;

/// Globally unique identifier of one CRDT operation.
///
/// Totally ordered within a node by `counter`; counters start at 1.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    pub node_id: NodeId,
    pub counter: u64,
}

impl Dot {
    pub fn new(node_id: impl Into<NodeId>, counter: u64) -> Self {
        Self {
            node_id: node_id.into(),
            counter,
        }
    }
}

impl std::fmt::Display for Dot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.node_id, self.counter)
    }
}

/// Causal history of a replica: compact vector clock plus sparse dot cloud.
///
/// Invariants:
/// - every `(n, c)` with `c <= clock[n]` has been observed;
/// - the cloud never holds a dot already covered by the clock.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotContext {
    clock: BTreeMap<NodeId, u64>,
    dot_cloud: BTreeSet<Dot>,
}

impl DotContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `dot` is covered by the clock or present in the cloud.
    pub fn contains(&self, dot: &Dot) -> bool {
        self.clock
            .get(&dot.node_id)
            .is_some_and(|max| *max >= dot.counter)
            || self.dot_cloud.contains(dot)
    }

    /// Largest contiguous counter observed from `node_id` (0 if none).
    pub fn clock_of(&self, node_id: &str) -> u64 {
        self.clock.get(node_id).copied().unwrap_or(0)
    }

    /// Allocate the next dot for `node_id`, advancing the clock by one.
    ///
    /// Never touches the cloud: locally issued operations are contiguous by
    /// construction.
    pub fn next_dot(&mut self, node_id: &str) -> Dot {
        let counter = match self.clock.get_mut(node_id) {
            Some(counter) => {
                *counter += 1;
                *counter
            }
            None => {
                self.clock.insert(node_id.to_string(), 1);
                1
            }
        };
        Dot::new(node_id, counter)
    }

    /// Record an observed dot.
    ///
    /// Contiguous dots advance the clock directly (followed by compaction, in
    /// case cloud entries become contiguous in turn); gapped dots land in the
    /// cloud; already-contained dots are a no-op.
    pub fn insert_dot(&mut self, dot: Dot) {
        if self.contains(&dot) {
            return;
        }
        if dot.counter == self.clock_of(&dot.node_id) + 1 {
            self.clock.insert(dot.node_id, dot.counter);
            self.compact();
        } else {
            self.dot_cloud.insert(dot);
        }
    }

    /// Join with another context: pointwise clock max, union of clouds,
    /// compaction.
    pub fn merge(&mut self, other: &Self) {
        for (node_id, remote) in &other.clock {
            match self.clock.get_mut(node_id) {
                Some(local) => *local = (*local).max(*remote),
                None => {
                    self.clock.insert(node_id.clone(), *remote);
                }
            }
        }
        for dot in &other.dot_cloud {
            if !self.contains(dot) {
                self.dot_cloud.insert(dot.clone());
            }
        }
        self.compact();
    }

    /// Promote every `(n, clock[n]+1)` from the cloud into the clock until
    /// only gapped dots remain; drops cloud dots the clock already covers.
    ///
    /// A single sorted pass suffices: `BTreeSet` iterates dots per node in
    /// ascending counter order, so contiguous runs collapse as they are
    /// visited.
    pub fn compact(&mut self) {
        let clock = &mut self.clock;
        self.dot_cloud.retain(|dot| {
            let current = clock.get(&dot.node_id).copied().unwrap_or(0);
            if dot.counter == current + 1 {
                clock.insert(dot.node_id.clone(), dot.counter);
                false
            } else {
                dot.counter > current
            }
        });
    }

    /// Number of dots sitting in the cloud (gapped history).
    pub fn cloud_len(&self) -> usize {
        self.dot_cloud.len()
    }

    /// True iff nothing has ever been observed.
    pub fn is_empty(&self) -> bool {
        self.clock.is_empty() && self.dot_cloud.is_empty()
    }
}
