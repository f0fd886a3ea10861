//! Replicated fire state: Add-Wins set of burning cells plus a dot-keyed
//! metadata side table, fed by a fixed admission policy.
//!
//! The admission policy is the only place non-monotonic judgement enters the
//! CRDT. A reading either does nothing, adds its cell, or removes it:
//!
//! | condition                          | action        |
//! |------------------------------------|---------------|
//! | confidence below threshold         | ignored       |
//! | admitted, temperature >= threshold | add cell      |
//! | admitted, temperature <  threshold | remove cell   |
//!
//! Everything downstream of that decision is a plain delta-state merge.

use crate::cell::Cell;
use crate::reading::{FireMeta, SensorReading};
use ember_crdt::{AworSet, Dot, DotContext, DotKernel, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Default minimum confidence for a reading to be considered at all.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 50.0;

/// Default temperature separating "burning" from "extinguished".
pub const DEFAULT_TEMPERATURE_THRESHOLD: f64 = 45.0;

/// Thresholds applied to every incoming reading.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    pub confidence_threshold: f64,
    pub temperature_threshold: f64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            temperature_threshold: DEFAULT_TEMPERATURE_THRESHOLD,
        }
    }
}

/// What a reading did to the local state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOutcome {
    /// Confidence under the floor - silently dropped, not an error.
    Ignored,
    /// Cell added (or re-added) under a fresh dot.
    Added,
    /// Cell removed; at least one dot was dropped.
    Removed,
    /// Remove of a cell that was not present.
    Unchanged,
}

/// One `(dot, cell, meta)` triple of a shipped delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeltaEntry {
    pub dot: Dot,
    pub cell: Cell,
    pub meta: FireMeta,
}

/// Atomic unit of state exchange: a context snapshot plus the entries it
/// covers. Produced both by [`FireState::generate_delta`] (pending ops) and
/// [`FireState::full_state`] (anti-entropy).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FireDelta {
    pub context: DotContext,
    pub entries: Vec<DeltaEntry>,
}

impl FireDelta {
    /// Empty in the strong sense: nothing to merge and no causal history.
    /// A well-formed delta with an empty entry list but a non-empty context
    /// is *not* empty - it may carry removals.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.context.is_empty()
    }
}

/// A cell of the converged fire picture, with the metadata of its freshest
/// surviving detection.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct ActiveFire {
    pub cell: Cell,
    pub meta: FireMeta,
}

/// Local replica of the fleet-wide fire picture.
pub struct FireState {
    node_id: NodeId,
    cells: AworSet<Cell>,
    metadata: BTreeMap<Dot, FireMeta>,
    policy: AdmissionPolicy,
}

impl FireState {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self::with_policy(node_id, AdmissionPolicy::default())
    }

    pub fn with_policy(node_id: impl Into<NodeId>, policy: AdmissionPolicy) -> Self {
        Self {
            node_id: node_id.into(),
            cells: AworSet::new(),
            metadata: BTreeMap::new(),
            policy,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Run a raw reading through the admission policy.
    pub fn apply_reading(&mut self, reading: &SensorReading) -> ReadingOutcome {
        if reading.confidence < self.policy.confidence_threshold {
            trace!(
                cell = %reading.cell,
                confidence = reading.confidence,
                "reading below confidence floor, ignored"
            );
            return ReadingOutcome::Ignored;
        }

        if reading.temperature >= self.policy.temperature_threshold {
            let dot = self.cells.add(&self.node_id, reading.cell);
            self.metadata.insert(dot, reading.meta());
            debug!(cell = %reading.cell, temperature = reading.temperature, "fire detected");
            ReadingOutcome::Added
        } else {
            let dropped = self.cells.remove(&reading.cell);
            if dropped.is_empty() {
                return ReadingOutcome::Unchanged;
            }
            // Reap the side table for the dots that just died.
            for dot in &dropped {
                self.metadata.remove(dot);
            }
            debug!(cell = %reading.cell, "fire cleared");
            ReadingOutcome::Removed
        }
    }

    /// Merge a delta received from a peer.
    ///
    /// The incoming context is deep-copied into a fresh kernel so the merge
    /// never aliases the caller's (possibly shared) message. Metadata is
    /// written unconditionally: it is keyed by dot, and a dot is immutable.
    pub fn merge_delta(&mut self, delta: &FireDelta) {
        let kernel = DotKernel::from_parts(
            delta.context.clone(),
            delta.entries.iter().map(|e| (e.dot.clone(), e.cell)),
        );
        for entry in &delta.entries {
            self.metadata.insert(entry.dot.clone(), entry.meta);
        }
        self.cells.merge(&kernel);
    }

    /// Pending outgoing operations, or `None` if nothing happened since the
    /// last [`clear_delta`](FireState::clear_delta). Does not clear.
    pub fn generate_delta(&self) -> Option<FireDelta> {
        let delta = self.cells.delta()?;
        Some(FireDelta {
            context: delta.context().clone(),
            entries: delta
                .entries()
                .iter()
                .map(|(dot, cell)| DeltaEntry {
                    dot: dot.clone(),
                    cell: *cell,
                    meta: self.metadata.get(dot).copied().unwrap_or_default(),
                })
                .collect(),
        })
    }

    pub fn clear_delta(&mut self) {
        self.cells.clear_delta();
    }

    /// Full causal state as a delta, for anti-entropy repair.
    pub fn full_state(&self) -> FireDelta {
        FireDelta {
            context: self.cells.core().context().clone(),
            entries: self
                .cells
                .core()
                .entries()
                .iter()
                .map(|(dot, cell)| DeltaEntry {
                    dot: dot.clone(),
                    cell: *cell,
                    meta: self.metadata.get(dot).copied().unwrap_or_default(),
                })
                .collect(),
        }
    }

    /// Sorted, deduplicated list of burning cells.
    pub fn active_cells(&self) -> Vec<Cell> {
        let mut cells: Vec<Cell> = self.cells.elements().copied().collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    /// Burning cells with the freshest surviving metadata per cell.
    /// Concurrent adds can leave several dots per cell after a merge; the
    /// one with the newest timestamp represents it.
    pub fn active_fires(&self) -> Vec<ActiveFire> {
        let mut best: BTreeMap<Cell, FireMeta> = BTreeMap::new();
        for (dot, cell) in self.cells.core().entries() {
            let meta = self.metadata.get(dot).copied().unwrap_or_default();
            match best.get(cell) {
                Some(current) if current.timestamp_ms >= meta.timestamp_ms => {}
                _ => {
                    best.insert(*cell, meta);
                }
            }
        }
        best.into_iter()
            .map(|(cell, meta)| ActiveFire { cell, meta })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active_cells().len()
    }

    pub fn is_burning(&self, cell: &Cell) -> bool {
        self.cells.contains(cell)
    }

    pub fn metadata_len(&self) -> usize {
        self.metadata.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(x: i32, y: i32, confidence: f64, temperature: f64) -> SensorReading {
        SensorReading::new(Cell::new(x, y), 1_000, confidence, temperature)
    }

    #[test]
    fn test_low_confidence_is_ignored() {
        let mut state = FireState::new("d1");
        let outcome = state.apply_reading(&reading(3, 4, 30.0, 80.0));
        assert_eq!(outcome, ReadingOutcome::Ignored);
        assert_eq!(state.active_count(), 0);
        assert!(state.generate_delta().is_none());
    }

    #[test]
    fn test_hot_reading_adds_cell() {
        let mut state = FireState::new("d1");
        let outcome = state.apply_reading(&reading(3, 4, 70.0, 60.0));
        assert_eq!(outcome, ReadingOutcome::Added);
        assert!(state.is_burning(&Cell::new(3, 4)));
    }

    #[test]
    fn test_cool_reading_removes_cell() {
        let mut state = FireState::new("d1");
        state.apply_reading(&reading(3, 4, 70.0, 60.0));

        let outcome = state.apply_reading(&reading(3, 4, 70.0, 30.0));
        assert_eq!(outcome, ReadingOutcome::Removed);
        assert!(!state.is_burning(&Cell::new(3, 4)));
        assert_eq!(state.metadata_len(), 0);
    }

    #[test]
    fn test_cool_reading_on_absent_cell_is_noop() {
        let mut state = FireState::new("d1");
        let outcome = state.apply_reading(&reading(3, 4, 70.0, 30.0));
        assert_eq!(outcome, ReadingOutcome::Unchanged);
    }

    #[test]
    fn test_delta_carries_metadata() {
        let mut state = FireState::new("d1");
        state.apply_reading(&reading(1, 2, 88.0, 72.0));

        let delta = state.generate_delta().expect("pending delta");
        assert_eq!(delta.entries.len(), 1);
        let entry = &delta.entries[0];
        assert_eq!(entry.cell, Cell::new(1, 2));
        assert_eq!(entry.meta.confidence, 88.0);
        assert_eq!(entry.meta.temperature, 72.0);
    }

    #[test]
    fn test_generate_does_not_clear() {
        let mut state = FireState::new("d1");
        state.apply_reading(&reading(1, 2, 88.0, 72.0));

        assert!(state.generate_delta().is_some());
        assert!(state.generate_delta().is_some());
        state.clear_delta();
        assert!(state.generate_delta().is_none());
    }

    #[test]
    fn test_merge_delta_converges_two_nodes() {
        let mut a = FireState::new("a");
        let mut b = FireState::new("b");

        a.apply_reading(&reading(1, 1, 90.0, 70.0));
        b.apply_reading(&reading(2, 2, 90.0, 70.0));

        let da = a.generate_delta().unwrap();
        let db = b.generate_delta().unwrap();
        a.merge_delta(&db);
        b.merge_delta(&da);

        assert_eq!(a.active_cells(), b.active_cells());
        assert_eq!(a.active_cells(), vec![Cell::new(1, 1), Cell::new(2, 2)]);
    }

    #[test]
    fn test_remove_delta_clears_remote_cell() {
        let mut a = FireState::new("a");
        let mut b = FireState::new("b");

        a.apply_reading(&reading(1, 1, 90.0, 70.0));
        b.merge_delta(&a.generate_delta().unwrap());
        a.clear_delta();
        assert!(b.is_burning(&Cell::new(1, 1)));

        a.apply_reading(&reading(1, 1, 90.0, 20.0));
        b.merge_delta(&a.generate_delta().unwrap());
        assert!(!b.is_burning(&Cell::new(1, 1)));
    }

    #[test]
    fn test_full_state_repairs_missed_removal() {
        let mut a = FireState::new("a");
        a.apply_reading(&reading(1, 1, 90.0, 70.0));

        // b saw the add but will miss the remove.
        let mut b = FireState::new("b");
        b.merge_delta(&a.generate_delta().unwrap());
        a.clear_delta();
        assert!(b.is_burning(&Cell::new(1, 1)));

        a.apply_reading(&reading(1, 1, 90.0, 20.0));

        let full = a.full_state();
        assert!(full.entries.is_empty());
        assert!(!full.is_empty());

        // Anti-entropy style repair: the full causal state carries the
        // removal even though it has no entries.
        b.merge_delta(&full);
        assert!(!b.is_burning(&Cell::new(1, 1)));

        // A concurrent add on c survives the same repair.
        let mut c = FireState::new("c");
        c.apply_reading(&reading(1, 1, 90.0, 70.0));
        c.merge_delta(&full);
        assert!(c.is_burning(&Cell::new(1, 1)));
    }

    #[test]
    fn test_active_fires_picks_freshest_meta() {
        let mut a = FireState::new("a");
        let mut b = FireState::new("b");

        a.apply_reading(&SensorReading::new(Cell::new(5, 5), 100, 80.0, 50.0));
        b.apply_reading(&SensorReading::new(Cell::new(5, 5), 200, 90.0, 55.0));

        a.merge_delta(&b.generate_delta().unwrap());
        let fires = a.active_fires();
        assert_eq!(fires.len(), 1);
        assert_eq!(fires[0].meta.timestamp_ms, 200);
    }
}
