//! Unresolved-Reference Resolution
//!
//! References that cannot be bound when they are created wait in a working
//! set. The scheduler retries the whole set on every flush pass while the
//! batch is dirty, so forward references (used before their data exists)
//! become consistent as soon as the data arrives.
//!
//! # One Attempt
//!
//! 1. Snapshot and clear the working set.
//! 2. For each item, most recently added first:
//!    - Skip it if it was resolved some other way in the meantime.
//!    - Ask the `Resolver` for a keypath.
//!    - If found, resolve the item. Otherwise put it back.
//!
//! Because the set is cleared before any item is resolved, resolve
//! callbacks may add or remove references (or trigger a nested attempt)
//! without disturbing the attempt in progress.
//!
//! A reference that never resolves is not an error. It is retried on every
//! future batch.

mod reference;

pub use reference::{Reference, ReferenceId, RootId, ScopeId};

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::keypath::Keypath;
use crate::runloop::Scheduler;

/// Finds the concrete keypath for a symbolic reference.
pub trait Resolver {
    fn resolve(&self, root: RootId, reference: &str, scope: Option<ScopeId>) -> Option<Keypath>;
}

impl<F> Resolver for F
where
    F: Fn(RootId, &str, Option<ScopeId>) -> Option<Keypath>,
{
    fn resolve(&self, root: RootId, reference: &str, scope: Option<ScopeId>) -> Option<Keypath> {
        self(root, reference, scope)
    }
}

/// A resolver that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverResolves;

impl Resolver for NeverResolves {
    fn resolve(&self, _root: RootId, _reference: &str, _scope: Option<ScopeId>) -> Option<Keypath> {
        None
    }
}

/// The working set of references awaiting resolution.
#[derive(Default)]
pub struct UnresolvedSet {
    items: RefCell<Vec<Rc<Reference>>>,
}

impl UnresolvedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: Rc<Reference>) {
        self.items.borrow_mut().push(reference);
    }

    /// Remove a reference so no later attempt considers it.
    ///
    /// Returns `true` if it was in the set.
    pub fn remove(&self, id: ReferenceId) -> bool {
        let mut items = self.items.borrow_mut();
        let before = items.len();
        items.retain(|item| item.id() != id);
        items.len() != before
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn contains(&self, id: ReferenceId) -> bool {
        self.items.borrow().iter().any(|item| item.id() == id)
    }

    /// Run one resolution attempt over the whole set.
    ///
    /// Returns the number of references resolved. `warn_after` is the
    /// failure count at which a reference is reported as suspicious.
    pub fn attempt(
        &self,
        resolver: &dyn Resolver,
        scheduler: &Scheduler,
        warn_after: Option<u32>,
    ) -> usize {
        let mut snapshot = Snapshot {
            set: self,
            pending: std::mem::take(&mut *self.items.borrow_mut()),
        };
        if snapshot.pending.is_empty() {
            return 0;
        }

        let mut resolved = 0;
        // An item leaves the snapshot only once it has been handled, so a
        // panic in the resolver or a callback puts it back with the rest.
        while let Some(item) = snapshot.pending.last().cloned() {
            if item.is_resolved() {
                snapshot.pending.pop();
                continue;
            }

            match resolver.resolve(item.root(), item.text(), item.scope()) {
                Some(keypath) => {
                    trace!(reference = item.text(), %keypath, "reference resolved");
                    item.resolve(scheduler, keypath);
                    snapshot.pending.pop();
                    resolved += 1;
                }
                None => {
                    snapshot.pending.pop();
                    let attempts = item.record_failed_attempt();
                    if warn_after == Some(attempts) {
                        warn!(
                            reference = item.text(),
                            root = item.root().raw(),
                            attempts,
                            "reference still unresolved"
                        );
                    }
                    self.insert(item);
                }
            }
        }

        resolved
    }
}

/// Items of an attempt that have not been handled yet.
///
/// Returned to the front of the set if dropped early, keeping their order
/// ahead of anything inserted since.
struct Snapshot<'a> {
    set: &'a UnresolvedSet,
    pending: Vec<Rc<Reference>>,
}

impl Drop for Snapshot<'_> {
    fn drop(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            returned = self.pending.len(),
            "resolution attempt interrupted, keeping unhandled references"
        );
        let mut items = self.set.items.borrow_mut();
        items.splice(0..0, self.pending.drain(..));
    }
}
