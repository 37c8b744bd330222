//! The Run Loop
//!
//! This module implements the scheduler that settles batches of mutations.
//!
//! # Overview
//!
//! A batch is one outermost `start()`/`end()` span. While it is open,
//! mutations register dirty viewmodels, views to update, deferred tasks and
//! unresolved references. `end()` then runs flush passes until nothing is
//! left to do:
//!
//! 1. Drain dirty viewmodels, oldest first, firing change notifications
//! 2. Retry unresolved references
//! 3. Settle the model: run post-model tasks and retry references until
//!    no new work appears
//! 4. Update views, most recent first
//! 5. Run post-view tasks, most recent first
//! 6. If the view updates dirtied viewmodels again ("model blowback"),
//!    go back to 1
//! 7. Unlock attributes locked during the pass
//! 8. Apply deferred style recomputation
//!
//! Finally the batch's transition manager is initialized, and fires the
//! batch's completion callback once every transition has finished.
//!
//! # Re-entrancy
//!
//! Collaborators run synchronously inside `end()` and may call back into
//! the scheduler: register more work, or even open and close a nested
//! batch. A nested `start()` while flushing joins the running batch, and a
//! nested `end()` only retries reference resolution. The outermost `end()`
//! owns settlement.
//!
//! # Design Decisions
//!
//! 1. The scheduler is an explicit object, one per rendering engine, rather
//!    than module-level state. Tests construct a fresh one each time.
//!
//! 2. All state sits behind `Cell`/`RefCell`, and no borrow is ever held
//!    while a collaborator runs. Work items are popped one at a time.
//!
//! 3. The scheduler is `!Send` and `!Sync`, which confines it to the thread
//!    that created it. Asynchronous work (transitions finishing) re-enters
//!    through the public operations like any other caller.

pub mod queue;
mod scheduler;

pub use scheduler::{RunloopStats, Scheduler, SchedulerBuilder, Task};
