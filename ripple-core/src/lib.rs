//! Ripple Core
//!
//! This crate provides the update-scheduling core of the Ripple reactive
//! rendering engine. It coordinates how mutations to observed state settle:
//!
//! - Dirty viewmodels apply their pending changes and notify observers
//! - Deferred tasks run after the model settles and after the view settles
//! - Symbolic references that could not be bound yet are retried
//! - Asynchronous transitions are tracked so node detachment waits for them
//!
//! A batch of mutations settles exactly once, no matter how many nested
//! mutations it produces while settling.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `runloop`: The `Scheduler` and its flush loop
//! - `transition`: The transition-manager tree of pending async completions
//! - `resolve`: Retrying unresolved references
//! - `collab`: Contracts for the collaborators the scheduler drives
//! - `keypath`: Keypaths and change maps
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use ripple_core::runloop::Scheduler;
//!
//! let scheduler = Scheduler::new();
//!
//! // Open a batch for the component's viewmodel
//! scheduler.start(Some(viewmodel.clone()), Some(Box::new(|| println!("settled"))));
//!
//! // Mutations register views and deferred work
//! scheduler.add_view(view.clone());
//! scheduler.after_view_update(|_| println!("view updated"));
//!
//! // Settle the batch
//! scheduler.end()?;
//! ```

pub mod collab;
pub mod config;
pub mod error;
pub mod keypath;
pub mod resolve;
pub mod runloop;
pub mod transition;

pub use collab::{Lockable, LockFlag, Styles, View, Viewmodel, ViewmodelId};
pub use config::SchedulerConfig;
pub use error::{Result, SchedulerError};
pub use keypath::{ChangeMap, Keypath};
pub use resolve::{Reference, ReferenceId, Resolver, RootId, ScopeId};
pub use runloop::{RunloopStats, Scheduler, SchedulerBuilder, Task};
pub use transition::{Completion, Detachable, Transition, TransitionHandle, TransitionManager};
