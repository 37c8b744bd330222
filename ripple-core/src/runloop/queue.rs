//! Stack-Ordered Work Queues
//!
//! Deferred tasks, pending views and locked attributes are all drained
//! most-recently-added first. The order is observable (tests and
//! collaborators rely on it), so these queues are explicit LIFO sequences.
//!
//! The queues live inside `RefCell`s on the scheduler. Callers pop one item
//! at a time and release the borrow before running it, because running an
//! item may push more work onto the same queue.

use std::rc::Rc;

use smallvec::SmallVec;

use crate::collab::Lockable;

/// A last-in-first-out queue.
///
/// Most batches queue only a handful of items, so the first few are stored
/// inline.
pub struct LifoQueue<T> {
    items: SmallVec<[T; 4]>,
}

impl<T> LifoQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            items: SmallVec::new(),
        }
    }

    /// Add an item on top.
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Take the most recently added item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Remove everything, returning the items in pop order.
    pub fn take_all(&mut self) -> Vec<T> {
        let mut items: Vec<T> = std::mem::take(&mut self.items).into_vec();
        items.reverse();
        items
    }
}

impl<T> Default for LifoQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Attributes locked during the current flush pass.
///
/// Locking an attribute that is already locked is a no-op, so each
/// attribute is recorded (and later unlocked) once.
#[derive(Default)]
pub struct LockedAttributes {
    locked: LifoQueue<Rc<dyn Lockable>>,
}

impl LockedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock an attribute and record it for release at the end of the pass.
    ///
    /// Returns `false` if the attribute was already locked.
    pub fn lock(&mut self, attribute: Rc<dyn Lockable>) -> bool {
        if attribute.is_locked() {
            return false;
        }
        attribute.set_locked(true);
        self.locked.push(attribute);
        true
    }

    /// Take the most recently locked attribute, still locked.
    pub fn next(&mut self) -> Option<Rc<dyn Lockable>> {
        self.locked.pop()
    }

    /// Number of attributes awaiting release.
    pub fn len(&self) -> usize {
        self.locked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locked.is_empty()
    }
}
