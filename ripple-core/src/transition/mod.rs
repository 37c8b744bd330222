//! Transition Managers
//!
//! Transitions are time-based visual effects (fades, slides) attached to
//! nodes. They finish asynchronously, long after the batch that started
//! them has settled. A transition manager tracks the transitions registered
//! during one batch and decides when it is safe to:
//!
//! - Fire the batch's completion callback
//! - Detach nodes that were queued for removal while they were animating
//!
//! # The Manager Tree
//!
//! Each outermost batch gets its own manager. A batch opened while another
//! batch is still open (but not flushing) gets a child manager, linked to
//! its parent. A child counts as one outstanding unit in its parent, so a
//! parent only completes after every descendant has completed:
//!
//! ```text
//! outer  (2 outstanding: fade, child)
//!  ├── fade
//!  └── child  (1 outstanding: slide)
//!       └── slide
//! ```
//!
//! # Lifecycle
//!
//! 1. `TransitionManager::new` creates the manager under its parent.
//! 2. `push` registers transitions while the batch is open.
//! 3. `init` is called once the batch has flushed. It closes registration
//!    and starts each transition with a `TransitionHandle`.
//! 4. Each transition finishes by completing (or dropping) its handle.
//! 5. When nothing is outstanding, the manager detaches its queued nodes,
//!    fires its completion callback and releases its parent.

mod manager;

pub use manager::{Completion, ManagerId, TransitionHandle, TransitionManager};

/// An asynchronous visual effect tracked by a transition manager.
pub trait Transition {
    /// Begin tracking. Called once, after the owning batch has settled.
    ///
    /// The transition is finished when `handle` is completed or dropped.
    fn start(&self, handle: TransitionHandle);
}

/// A node waiting for its transitions to finish before leaving the tree.
pub trait Detachable {
    fn detach(&self);
}
