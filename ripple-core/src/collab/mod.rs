//! Collaborator Contracts
//!
//! The scheduler does not render, diff, store bindings or compute styles.
//! It drives collaborators that do, through the traits in this module.
//!
//! Collaborators that can cause further mutations while they run receive a
//! `&Scheduler`, so they can register more work (or open a nested batch)
//! without holding a reference cycle back to the scheduler.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::keypath::ChangeMap;
use crate::runloop::Scheduler;

/// Unique identifier for a viewmodel.
///
/// The scheduler uses this to keep a viewmodel in the pending set at most
/// once per batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewmodelId(u64);

impl ViewmodelId {
    /// Generate a new unique viewmodel ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ViewmodelId {
    fn default() -> Self {
        Self::new()
    }
}

/// The model side of a component: holds observed state and its pending
/// mutations.
pub trait Viewmodel {
    /// Identity used for pending-set membership.
    fn id(&self) -> ViewmodelId;

    /// Apply pending mutations, returning what changed.
    ///
    /// Returns `None` (or an empty map) when nothing changed.
    fn apply_changes(&self, scheduler: &Scheduler) -> Option<ChangeMap>;

    /// Fire the "change" notification to observers of this viewmodel.
    fn fire_change(&self, changes: &ChangeMap);
}

/// A rendered fragment that needs to be brought up to date.
pub trait View {
    fn update(&self, scheduler: &Scheduler);
}

/// A two-way binding's attribute, locked while a pass runs so that writing
/// the new value to the view does not feed back into the model.
///
/// Implementations only store the flag. They are called while the
/// scheduler's lock list is borrowed and must not call back into it.
pub trait Lockable {
    fn is_locked(&self) -> bool;

    fn set_locked(&self, locked: bool);
}

/// The presentation subsystem. `update` applies pending style recomputation.
pub trait Styles {
    fn update(&self);
}

/// A plain lock flag for bindings that need nothing more.
#[derive(Debug, Default)]
pub struct LockFlag(Cell<bool>);

impl LockFlag {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Lockable for LockFlag {
    fn is_locked(&self) -> bool {
        self.0.get()
    }

    fn set_locked(&self, locked: bool) {
        self.0.set(locked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewmodel_ids_are_unique() {
        let id1 = ViewmodelId::new();
        let id2 = ViewmodelId::new();
        assert_ne!(id1, id2);
        assert!(id2.raw() > id1.raw());
    }

    #[test]
    fn lock_flag_toggles() {
        let flag = LockFlag::new();
        assert!(!flag.is_locked());

        flag.set_locked(true);
        assert!(flag.is_locked());

        flag.set_locked(false);
        assert!(!flag.is_locked());
    }
}
