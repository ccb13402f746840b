//! Device-side change applicator.
//!
//! These functions are pure decision logic: given clock values and a flag
//! for whether the local copy has pending outbox entries, decide what the
//! store and outbox should do. The actual store/outbox mutations live in
//! `sync-storage`; this module only answers "what should happen".

use crate::clock::{compare, ClockOrdering, VectorClock};

/// Outcome of applying a remote entity against a (possibly absent) local copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyDecision {
    /// No local copy existed, or the local copy has no pending changes and
    /// the remote clock strictly dominates: store the remote value as-is.
    AcceptRemote,
    /// Local copy has no pending changes but its clock is not dominated by
    /// the remote's: the server hasn't seen our push yet. Drop the remote.
    DiscardRemoteStale,
    /// Local copy has pending changes and the remote dominates (or is
    /// equal): remote wins, overwrite local, and the corresponding outbox
    /// entry should be discarded (server already has the desired state).
    AcceptRemoteDiscardOutbox,
    /// Local copy has pending changes and causally dominates the remote:
    /// keep local, the remote is stale.
    KeepLocal,
    /// Local and remote clocks are concurrent and local has pending
    /// changes: the device does not auto-resolve on pull. Tag local with a
    /// conflict marker and surface to the UI.
    Conflict,
}

/// Decide how to apply a remote entity `remote_clock` against a local
/// record with clock `local_clock`, given whether local has outbox entries.
pub fn apply_remote(
    local_clock: Option<&VectorClock>,
    remote_clock: &VectorClock,
    local_has_pending_changes: bool,
) -> ApplyDecision {
    let Some(local_clock) = local_clock else {
        return ApplyDecision::AcceptRemote;
    };

    if !local_has_pending_changes {
        return if compare(remote_clock, local_clock) == ClockOrdering::After {
            ApplyDecision::AcceptRemote
        } else {
            ApplyDecision::DiscardRemoteStale
        };
    }

    match compare(local_clock, remote_clock) {
        ClockOrdering::Equal | ClockOrdering::Before => ApplyDecision::AcceptRemoteDiscardOutbox,
        ClockOrdering::After => ApplyDecision::KeepLocal,
        ClockOrdering::Concurrent => ApplyDecision::Conflict,
    }
}

/// Tombstone cascade: which locally-present child comment ids should be
/// soft-deleted, and which outbox entries (for the entity itself and its
/// children) should be dropped, when a tombstone for `entity_id` arrives.
///
/// This function takes the already-known set of local child comment ids and
/// outbox entity ids so it stays pure; `sync-storage` resolves those sets
/// from the database before calling it.
pub struct TombstoneCascade {
    pub soft_delete_entity_ids: Vec<crate::ids::EntityId>,
    pub drop_outbox_entity_ids: Vec<crate::ids::EntityId>,
}

pub fn cascade_tombstone(
    entity_id: crate::ids::EntityId,
    local_child_comment_ids: &[crate::ids::EntityId],
    outbox_entity_ids_for_entity_and_children: &[crate::ids::EntityId],
) -> TombstoneCascade {
    let mut soft_delete_entity_ids = vec![entity_id];
    soft_delete_entity_ids.extend(local_child_comment_ids.iter().copied());

    TombstoneCascade {
        soft_delete_entity_ids,
        drop_outbox_entity_ids: outbox_entity_ids_for_entity_and_children.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::increment;
    use crate::ids::DeviceId;

    fn dev(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[test]
    fn absent_local_accepts_remote() {
        let remote = increment(&VectorClock::new(), &dev("server"));
        assert_eq!(
            apply_remote(None, &remote, false),
            ApplyDecision::AcceptRemote
        );
    }

    #[test]
    fn no_pending_changes_remote_dominates_accepts() {
        let local = increment(&VectorClock::new(), &dev("a"));
        let remote = increment(&local, &dev("server"));
        assert_eq!(
            apply_remote(Some(&local), &remote, false),
            ApplyDecision::AcceptRemote
        );
    }

    #[test]
    fn no_pending_changes_remote_dominated_discards() {
        let remote = VectorClock::new();
        let local = increment(&remote, &dev("a"));
        assert_eq!(
            apply_remote(Some(&local), &remote, false),
            ApplyDecision::DiscardRemoteStale
        );
    }

    #[test]
    fn pending_changes_remote_dominates_accepts_and_clears_outbox() {
        let local = increment(&VectorClock::new(), &dev("a"));
        let remote = increment(&local, &dev("server"));
        assert_eq!(
            apply_remote(Some(&local), &remote, true),
            ApplyDecision::AcceptRemoteDiscardOutbox
        );
    }

    #[test]
    fn pending_changes_local_dominates_keeps_local() {
        let remote = VectorClock::new();
        let local = increment(&remote, &dev("a"));
        assert_eq!(
            apply_remote(Some(&local), &remote, true),
            ApplyDecision::KeepLocal
        );
    }

    #[test]
    fn pending_changes_concurrent_is_conflict() {
        let local = increment(&VectorClock::new(), &dev("a"));
        let remote = increment(&VectorClock::new(), &dev("b"));
        assert_eq!(
            apply_remote(Some(&local), &remote, true),
            ApplyDecision::Conflict
        );
    }

    #[test]
    fn cascade_includes_entity_and_children() {
        let task_id = crate::ids::EntityId::new();
        let comment_id = crate::ids::EntityId::new();
        let cascade = cascade_tombstone(task_id, &[comment_id], &[task_id, comment_id]);
        assert_eq!(cascade.soft_delete_entity_ids, vec![task_id, comment_id]);
        assert_eq!(cascade.drop_outbox_entity_ids, vec![task_id, comment_id]);
    }
}
