//! Transition Manager Implementation
//!
//! A manager is shared between the scheduler (while its batch is open), its
//! children (through their parent links) and the handles of its running
//! transitions. Whoever drops the last outstanding unit triggers completion.
//!
//! # Counting
//!
//! `outstanding` counts registered transitions that have not finished plus
//! child managers that have not completed. Transitions are counted when they
//! are pushed, not when they start, so a transition that finishes
//! synchronously inside `start` can never complete the manager early.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace, warn};

use super::{Detachable, Transition};
use crate::runloop::queue::LifoQueue;

/// Callback fired once a batch and all of its transitions have finished.
pub type Completion = Box<dyn FnOnce()>;

/// Unique identifier for a transition manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerId(u64);

impl ManagerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Tracks the asynchronous completions belonging to one batch.
pub struct TransitionManager {
    id: ManagerId,

    /// The manager of the enclosing batch, if any.
    parent: Option<Rc<TransitionManager>>,

    state: RefCell<ManagerState>,
}

struct ManagerState {
    /// Fired once on completion. `None` if the batch had no callback or
    /// was abandoned.
    on_complete: Option<Completion>,

    /// Transitions pushed before `init`, not yet started.
    registered: Vec<Rc<dyn Transition>>,

    /// Unfinished transitions plus incomplete child managers.
    outstanding: usize,

    /// Set by `init`: no more transitions are expected.
    ready: bool,

    /// Set once completion has fired.
    complete: bool,

    /// Nodes waiting for this manager to complete.
    detach_queue: LifoQueue<Rc<dyn Detachable>>,
}

impl TransitionManager {
    /// Create a manager for a new batch.
    ///
    /// If `parent` is given, the new manager counts as outstanding work in
    /// the parent until it completes.
    pub fn new(on_complete: Option<Completion>, parent: Option<Rc<TransitionManager>>) -> Rc<Self> {
        if let Some(parent) = &parent {
            parent.state.borrow_mut().outstanding += 1;
        }

        let manager = Rc::new(Self {
            id: ManagerId::new(),
            parent,
            state: RefCell::new(ManagerState {
                on_complete,
                registered: Vec::new(),
                outstanding: 0,
                ready: false,
                complete: false,
                detach_queue: LifoQueue::new(),
            }),
        });

        trace!(
            manager = manager.id.raw(),
            parent = manager.parent.as_ref().map(|p| p.id.raw()),
            "transition manager created"
        );
        manager
    }

    /// Get the manager's unique ID.
    pub fn id(&self) -> ManagerId {
        self.id
    }

    /// Get the parent manager, if any.
    pub fn parent(&self) -> Option<&Rc<TransitionManager>> {
        self.parent.as_ref()
    }

    /// Register a transition under this manager.
    ///
    /// Transitions registered before `init` are started by `init`. A
    /// transition registered after `init` is started immediately.
    pub fn push(self: &Rc<Self>, transition: Rc<dyn Transition>) {
        let start_now = {
            let mut state = self.state.borrow_mut();
            state.outstanding += 1;
            if state.ready {
                true
            } else {
                state.registered.push(transition.clone());
                false
            }
        };

        if start_now {
            warn!(
                manager = self.id.raw(),
                "transition registered after init, starting immediately"
            );
            transition.start(TransitionHandle::new(Rc::clone(self)));
        }
    }

    /// Queue a node for detachment once this manager completes.
    ///
    /// A manager that has already completed has nothing left to wait for,
    /// so the node is detached immediately.
    pub fn detach_when_ready(&self, node: Rc<dyn Detachable>) {
        let complete = {
            let mut state = self.state.borrow_mut();
            if !state.complete {
                state.detach_queue.push(node.clone());
            }
            state.complete
        };

        if complete {
            node.detach();
        }
    }

    /// Close registration and start every registered transition.
    ///
    /// Completes immediately if nothing is outstanding.
    pub fn init(self: &Rc<Self>) {
        let transitions = {
            let mut state = self.state.borrow_mut();
            state.ready = true;
            std::mem::take(&mut state.registered)
        };

        debug!(
            manager = self.id.raw(),
            transitions = transitions.len(),
            "transition manager init"
        );

        let mut unstarted = Unstarted {
            manager: self,
            remaining: transitions.len(),
        };
        for transition in transitions {
            unstarted.remaining -= 1;
            transition.start(TransitionHandle::new(Rc::clone(self)));
        }
        drop(unstarted);

        self.check();
    }

    /// Give up on this manager's batch.
    ///
    /// The completion callback is dropped unfired and transitions that were
    /// never started are discarded. Queued nodes are still released once
    /// every child manager completes, and the parent is still released.
    pub fn abandon(&self) {
        let discarded = {
            let mut state = self.state.borrow_mut();
            let transitions = std::mem::take(&mut state.registered);
            state.outstanding = state.outstanding.saturating_sub(transitions.len());
            state.ready = true;
            (state.on_complete.take(), transitions)
        };
        drop(discarded);

        debug!(manager = self.id.raw(), "transition manager abandoned");
        self.check();
    }

    /// Number of unfinished transitions and incomplete children.
    pub fn outstanding(&self) -> usize {
        self.state.borrow().outstanding
    }

    /// Check if `init` (or `abandon`) has been called.
    pub fn is_ready(&self) -> bool {
        self.state.borrow().ready
    }

    /// Check if completion has fired.
    pub fn is_complete(&self) -> bool {
        self.state.borrow().complete
    }

    /// Number of nodes waiting to be detached.
    pub fn detach_queue_len(&self) -> usize {
        self.state.borrow().detach_queue.len()
    }

    /// Give up on transitions that will never receive a handle.
    ///
    /// The batch failed, so the completion callback is dropped unfired.
    fn discard_unstarted(&self, count: usize) {
        let on_complete = {
            let mut state = self.state.borrow_mut();
            state.outstanding = state.outstanding.saturating_sub(count);
            state.on_complete.take()
        };
        drop(on_complete);

        warn!(
            manager = self.id.raw(),
            discarded = count,
            "transition failed to start, discarding the rest"
        );
        self.check();
    }

    fn release_one(&self) {
        {
            let mut state = self.state.borrow_mut();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.check();
    }

    fn check(&self) {
        let (detach_queue, on_complete) = {
            let mut state = self.state.borrow_mut();
            if !state.ready || state.outstanding > 0 || state.complete {
                return;
            }
            state.complete = true;
            (state.detach_queue.take_all(), state.on_complete.take())
        };

        debug!(
            manager = self.id.raw(),
            detached = detach_queue.len(),
            "transition manager complete"
        );

        for node in detach_queue {
            node.detach();
        }

        if let Some(on_complete) = on_complete {
            on_complete();
        }

        if let Some(parent) = &self.parent {
            parent.release_one();
        }
    }
}

impl fmt::Debug for TransitionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TransitionManager")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .field("outstanding", &state.outstanding)
            .field("ready", &state.ready)
            .field("complete", &state.complete)
            .field("detach_queue", &state.detach_queue.len())
            .finish()
    }
}

/// Counts the transitions `init` has not started yet.
///
/// If a transition panics in `start`, the ones after it are released on
/// unwind so the manager can still complete.
struct Unstarted<'a> {
    manager: &'a TransitionManager,
    remaining: usize,
}

impl Drop for Unstarted<'_> {
    fn drop(&mut self) {
        if self.remaining > 0 {
            self.manager.discard_unstarted(self.remaining);
        }
    }
}

/// A running transition's claim on its manager.
///
/// Completing or dropping the handle marks the transition finished. Each
/// handle releases its manager exactly once.
pub struct TransitionHandle {
    manager: Rc<TransitionManager>,
}

impl TransitionHandle {
    fn new(manager: Rc<TransitionManager>) -> Self {
        Self { manager }
    }

    /// The manager this transition belongs to.
    pub fn manager(&self) -> &Rc<TransitionManager> {
        &self.manager
    }

    /// Mark the transition finished.
    pub fn complete(self) {}
}

impl Drop for TransitionHandle {
    fn drop(&mut self) {
        self.manager.release_one();
    }
}

impl fmt::Debug for TransitionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransitionHandle")
            .field("manager", &self.manager.id)
            .finish()
    }
}
