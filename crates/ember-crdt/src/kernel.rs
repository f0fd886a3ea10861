//! Dot kernel - dot-to-payload map joined against a causal context
//!
//! The kernel is the primitive underneath observed-remove semantics. Each
//! live payload is keyed by the dot that created it; the context remembers
//! every dot ever observed, including dots whose payload was removed. During
//! a join, "the other side observed this dot but no longer carries it" is
//! exactly the signal that the payload was deleted there.

use crate::dot::{Dot, DotContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Map from dots to payloads plus the causal context that covers them.
///
/// Invariant: every key of `entries` is contained by `context`. The converse
/// does not hold - an observed dot with no entry is a removal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DotKernel<V> {
    entries: BTreeMap<Dot, V>,
    context: DotContext,
}

impl<V: Clone + PartialEq> DotKernel<V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            context: DotContext::new(),
        }
    }

    /// Rebuild a kernel from a received delta: a context snapshot plus the
    /// entries it carries. Entry dots are folded into the context, so the
    /// kernel invariant holds even for sloppy senders.
    pub fn from_parts(context: DotContext, entries: impl IntoIterator<Item = (Dot, V)>) -> Self {
        let mut kernel = Self {
            entries: BTreeMap::new(),
            context,
        };
        for (dot, value) in entries {
            kernel.insert(dot, value);
        }
        kernel
    }

    /// Allocate a fresh dot for `node_id` and bind `value` to it.
    pub fn add(&mut self, node_id: &str, value: V) -> Dot {
        let dot = self.context.next_dot(node_id);
        self.entries.insert(dot.clone(), value);
        dot
    }

    /// Bind `value` to an externally allocated dot, observing the dot.
    pub fn insert(&mut self, dot: Dot, value: V) {
        self.context.insert_dot(dot.clone());
        self.entries.insert(dot, value);
    }

    /// Observe a dot and drop any entry it carries - the observed-removed
    /// shape. Used when mirroring removals into a delta kernel: the dot must
    /// not travel as a live entry, only as context.
    pub fn tombstone(&mut self, dot: Dot) {
        self.entries.remove(&dot);
        self.context.insert_dot(dot);
    }

    /// Drop every entry holding `value`, returning the dots that carried it.
    /// The context is untouched: those dots stay observed, which is what
    /// makes the removal visible to peers.
    pub fn remove_value(&mut self, value: &V) -> Vec<Dot> {
        let dots: Vec<Dot> = self
            .entries
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(d, _)| d.clone())
            .collect();
        for dot in &dots {
            self.entries.remove(dot);
        }
        dots
    }

    /// Observed-remove join.
    ///
    /// 1. Drop local entries the other side has observed but no longer
    ///    carries (removed there).
    /// 2. Adopt remote entries this side has never observed.
    /// 3. Join the contexts.
    ///
    /// The order matters: an entry present on either side survives; only
    /// context-only knowledge kills.
    pub fn merge(&mut self, other: &Self) {
        self.entries
            .retain(|dot, _| other.entries.contains_key(dot) || !other.context.contains(dot));

        for (dot, value) in &other.entries {
            if !self.context.contains(dot) {
                self.entries.insert(dot.clone(), value.clone());
            }
        }

        self.context.merge(&other.context);
    }

    pub fn context(&self) -> &DotContext {
        &self.context
    }

    pub fn entries(&self) -> &BTreeMap<Dot, V> {
        &self.entries
    }

    /// Iterator over live payloads.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.entries.values().any(|v| v == value)
    }

    /// Dots currently carrying `value`.
    pub fn dots_for(&self, value: &V) -> Vec<&Dot> {
        self.entries
            .iter()
            .filter(|(_, v)| *v == value)
            .map(|(d, _)| d)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Empty in the strong sense: no entries and no causal history.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.context.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_allocates_contained_dot() {
        let mut kernel: DotKernel<&str> = DotKernel::new();
        let dot = kernel.add("a", "x");

        assert_eq!(dot, Dot::new("a", 1));
        assert!(kernel.context().contains(&dot));
        assert!(kernel.contains_value(&"x"));
    }

    #[test]
    fn test_remove_keeps_dot_observed() {
        let mut kernel: DotKernel<&str> = DotKernel::new();
        let dot = kernel.add("a", "x");

        let dropped = kernel.remove_value(&"x");
        assert_eq!(dropped, vec![dot.clone()]);
        assert!(!kernel.contains_value(&"x"));
        assert!(kernel.context().contains(&dot));
    }

    #[test]
    fn test_merge_removal_propagates() {
        let mut left: DotKernel<&str> = DotKernel::new();
        left.add("a", "x");

        // Right has observed the add and removed it.
        let mut right = left.clone();
        right.remove_value(&"x");

        left.merge(&right);
        assert!(!left.contains_value(&"x"));
    }

    #[test]
    fn test_merge_unobserved_entry_survives() {
        let mut left: DotKernel<&str> = DotKernel::new();
        left.add("a", "x");

        // Right never saw a:1, so its context must not kill it.
        let mut right: DotKernel<&str> = DotKernel::new();
        right.add("b", "y");

        left.merge(&right);
        assert!(left.contains_value(&"x"));
        assert!(left.contains_value(&"y"));
    }

    #[test]
    fn test_merge_entry_on_either_side_wins() {
        let mut left: DotKernel<&str> = DotKernel::new();
        let dot = left.add("a", "x");

        // Right observed the dot and still carries the entry.
        let right = left.clone();

        left.merge(&right);
        assert!(left.entries().contains_key(&dot));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut kernel: DotKernel<&str> = DotKernel::new();
        kernel.add("a", "x");
        kernel.add("b", "y");
        kernel.remove_value(&"y");

        let snapshot = kernel.clone();
        kernel.merge(&snapshot);
        assert_eq!(kernel, snapshot);
    }

    #[test]
    fn test_from_parts_observes_entry_dots() {
        let ctx = DotContext::new();
        let kernel = DotKernel::from_parts(ctx, [(Dot::new("a", 3), "x")]);

        assert!(kernel.context().contains(&Dot::new("a", 3)));
        assert!(kernel.contains_value(&"x"));
    }
}
