//! Vector-clock algebra.
//!
//! A vector clock is a mapping from device identity to a monotonic counter.
//! Absent keys are treated as zero everywhere in this module; callers never
//! need to pre-populate a clock with zeros for devices it hasn't seen yet.

use crate::ids::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A mapping from device identifier to non-negative counter.
///
/// `BTreeMap` gives deterministic iteration order, which matters for the
/// content-hash (`Task::checksum`) computed over a clock's entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(pub BTreeMap<DeviceId, u64>);

/// Result of comparing two vector clocks for causal ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrdering {
    Equal,
    Before,
    After,
    Concurrent,
}

impl VectorClock {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn single(device: DeviceId, counter: u64) -> Self {
        let mut map = BTreeMap::new();
        map.insert(device, counter);
        Self(map)
    }

    pub fn get(&self, device: &DeviceId) -> u64 {
        self.0.get(device).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(|&v| v == 0)
    }
}

/// Raise `device`'s counter in `clock` by exactly one.
///
/// Satisfies invariant I1: every local mutation increments the mutating
/// device's own counter by exactly one, regardless of how many fields
/// changed in that mutation.
#[must_use]
pub fn increment(clock: &VectorClock, device: &DeviceId) -> VectorClock {
    let mut next = clock.0.clone();
    let counter = next.entry(device.clone()).or_insert(0);
    *counter += 1;
    VectorClock(next)
}

/// Pointwise maximum over the union of keys of `a` and `b`.
#[must_use]
pub fn merge(a: &VectorClock, b: &VectorClock) -> VectorClock {
    let mut out = a.0.clone();
    for (device, &counter) in &b.0 {
        let entry = out.entry(device.clone()).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }
    VectorClock(out)
}

/// Compare `a` to `b`, determining causal ordering.
///
/// Computes two booleans — "a has some key strictly greater than b" and
/// "b has some key strictly greater than a" — and derives the ordering
/// from their combination. Absent keys compare as zero.
#[must_use]
pub fn compare(a: &VectorClock, b: &VectorClock) -> ClockOrdering {
    let a_greater = a
        .0
        .iter()
        .any(|(device, &counter)| counter > b.get(device));
    let b_greater = b
        .0
        .iter()
        .any(|(device, &counter)| counter > a.get(device));

    match (a_greater, b_greater) {
        (false, false) => ClockOrdering::Equal,
        (false, true) => ClockOrdering::Before,
        (true, false) => ClockOrdering::After,
        (true, true) => ClockOrdering::Concurrent,
    }
}

/// True iff `a` causally dominates `b` (i.e. `compare(a, b)` is `After` or `Equal`).
#[must_use]
pub fn dominates(a: &VectorClock, b: &VectorClock) -> bool {
    matches!(compare(a, b), ClockOrdering::After | ClockOrdering::Equal)
}

/// Exponential backoff in seconds, capped. Not invoked by the sync protocol
/// in this implementation;
/// kept available so a future retry policy change doesn't need new plumbing.
#[must_use]
pub fn backoff_seconds(consecutive_failures: u32) -> u64 {
    const MAX_EXPONENT: u32 = 8;
    const BASE_DELAY_SECONDS: u64 = 5;
    let capped = consecutive_failures.min(MAX_EXPONENT);
    2_u64.pow(capped) * BASE_DELAY_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[test]
    fn compare_with_self_is_equal() {
        let a = increment(&VectorClock::new(), &dev("a"));
        assert_eq!(compare(&a, &a), ClockOrdering::Equal);
    }

    #[test]
    fn merge_is_commutative() {
        let a = increment(&VectorClock::new(), &dev("a"));
        let b = increment(&VectorClock::new(), &dev("b"));
        assert_eq!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn merge_is_associative() {
        let a = increment(&VectorClock::new(), &dev("a"));
        let b = increment(&VectorClock::new(), &dev("b"));
        let c = increment(&VectorClock::new(), &dev("c"));
        assert_eq!(merge(&a, &merge(&b, &c)), merge(&merge(&a, &b), &c));
    }

    #[test]
    fn dominates_merge_always_holds() {
        let a = increment(&VectorClock::new(), &dev("a"));
        let b = increment(&VectorClock::new(), &dev("b"));
        let merged = merge(&a, &b);
        assert!(dominates(&merged, &a));
        assert!(dominates(&merged, &b));
    }

    #[test]
    fn independent_increments_are_concurrent() {
        let a = increment(&VectorClock::new(), &dev("a"));
        let b = increment(&VectorClock::new(), &dev("b"));
        assert_eq!(compare(&a, &b), ClockOrdering::Concurrent);
    }

    #[test]
    fn increment_then_merge_then_increment_is_after() {
        let a0 = increment(&VectorClock::new(), &dev("a"));
        let b0 = increment(&VectorClock::new(), &dev("b"));
        let merged = merge(&a0, &b0);
        let a1 = increment(&merged, &dev("a"));
        assert_eq!(compare(&a1, &b0), ClockOrdering::After);
        assert_eq!(compare(&b0, &a1), ClockOrdering::Before);
    }

    #[test]
    fn absent_keys_treated_as_zero() {
        let a = VectorClock::single(dev("a"), 3);
        let b = VectorClock::new();
        assert_eq!(compare(&a, &b), ClockOrdering::After);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_seconds(0), 5);
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(2), 20);
        assert_eq!(backoff_seconds(9), backoff_seconds(8));
    }
}
