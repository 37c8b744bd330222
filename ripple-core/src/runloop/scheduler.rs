//! Scheduler Implementation
//!
//! See the module documentation in `runloop` for the flush procedure.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use super::queue::{LifoQueue, LockedAttributes};
use crate::collab::{Lockable, Styles, View, Viewmodel, ViewmodelId};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::resolve::{NeverResolves, Reference, ReferenceId, Resolver, UnresolvedSet};
use crate::transition::{Completion, Detachable, Transition, TransitionManager};

/// A deferred callback run after the model or the view has settled.
pub type Task = Box<dyn FnOnce(&Scheduler)>;

/// Counters describing the scheduler's work so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunloopStats {
    /// Batches settled by an outermost `end()`.
    pub batches: u64,

    /// Flush passes run, including blowback passes.
    pub passes: u64,

    /// Passes re-run because view updates dirtied viewmodels.
    pub blowbacks: u64,

    /// References resolved by the scheduler's attempts.
    pub resolved: u64,

    /// Batches abandoned because a collaborator panicked.
    pub abandoned: u64,
}

/// Settles batches of mutations.
///
/// # Example
///
/// ```rust,ignore
/// let scheduler = Scheduler::new();
///
/// scheduler.start(Some(viewmodel), None);
/// scheduler.add_view(view);
/// scheduler.end()?;
///
/// assert!(!scheduler.is_flushing());
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    resolver: Box<dyn Resolver>,
    styles: Option<Rc<dyn Styles>>,

    /// Set for the duration of the outermost `end()`.
    flushing: Cell<bool>,

    /// Outstanding work remains before the batch can close.
    dirty: Cell<bool>,

    /// A style update was requested while flushing.
    pending_css: Cell<bool>,

    /// Viewmodels with changes to apply, in registration order.
    viewmodels: RefCell<IndexMap<ViewmodelId, Rc<dyn Viewmodel>>>,

    views: RefCell<LifoQueue<Rc<dyn View>>>,
    model_tasks: RefCell<LifoQueue<Task>>,
    view_tasks: RefCell<LifoQueue<Task>>,
    locked: RefCell<LockedAttributes>,
    unresolved: UnresolvedSet,

    /// Transition manager of the innermost open batch.
    active: RefCell<Option<Rc<TransitionManager>>>,

    stats: Cell<RunloopStats>,
}

impl Scheduler {
    /// Create a scheduler with default configuration, no style subsystem
    /// and a resolver that never resolves anything.
    pub fn new() -> Self {
        SchedulerBuilder::default().build()
    }

    /// Start building a scheduler with custom collaborators.
    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::default()
    }

    // ------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------

    /// Open a batch, or join the one being flushed.
    ///
    /// `owner` is the viewmodel of the component being mutated. If no batch
    /// is flushing, a new transition manager is created under the current
    /// one and `on_complete` fires once the batch and all of its transitions
    /// have finished. While flushing, the running batch is joined and
    /// `on_complete` is dropped: settlement belongs to the outermost call.
    pub fn start(&self, owner: Option<Rc<dyn Viewmodel>>, on_complete: Option<Completion>) {
        if let Some(viewmodel) = owner {
            self.add_viewmodel(viewmodel);
        }

        if self.flushing.get() {
            trace!("start() while flushing, joining the running batch");
            return;
        }

        let parent = self.active.borrow_mut().take();
        let manager = TransitionManager::new(on_complete, parent);
        debug!(manager = manager.id().raw(), "batch opened");
        *self.active.borrow_mut() = Some(manager);
    }

    /// Settle the current batch.
    ///
    /// Called re-entrantly (by a collaborator while flushing), this only
    /// retries reference resolution and returns. Otherwise it runs flush
    /// passes until nothing is dirty, closes the batch and initializes its
    /// transition manager.
    ///
    /// If a collaborator panics while flushing, the batch is abandoned and
    /// the scheduler is left ready for the next one before the panic
    /// continues to unwind.
    pub fn end(&self) -> Result<()> {
        if self.flushing.get() {
            trace!("end() while flushing, deferring to the outer batch");
            self.attempt_resolution();
            return Ok(());
        }

        if !self.has_active_batch() {
            return Err(SchedulerError::NoActiveBatch { operation: "end" });
        }

        self.flushing.set(true);
        let guard = AbandonOnUnwind::new(self);
        loop {
            self.flush_changes();
            if !self.dirty.get() {
                break;
            }
        }
        guard.disarm();
        self.flushing.set(false);

        self.update_stats(|stats| stats.batches += 1);

        // Restore the parent before init, so that a completion callback
        // opening a new batch nests under the right manager.
        if let Some(manager) = self.pop_manager() {
            debug!(manager = manager.id().raw(), "batch settled");
            manager.init();
        }
        Ok(())
    }

    /// Run `f` inside a batch: `start`, `f`, `end`.
    ///
    /// If `f` panics the batch is abandoned.
    pub fn run<R, F>(
        &self,
        owner: Option<Rc<dyn Viewmodel>>,
        on_complete: Option<Completion>,
        f: F,
    ) -> Result<R>
    where
        F: FnOnce(&Scheduler) -> R,
    {
        self.start(owner, on_complete);

        // While flushing, the outermost end() owns recovery.
        let guard = (!self.flushing.get()).then(|| AbandonOnUnwind::new(self));
        let output = f(self);
        if let Some(guard) = guard {
            guard.disarm();
        }

        self.end()?;
        Ok(output)
    }

    // ------------------------------------------------------------------
    // Registering work
    // ------------------------------------------------------------------

    /// Add a viewmodel to the pending set. Adding it again is a no-op.
    pub fn add_viewmodel(&self, viewmodel: Rc<dyn Viewmodel>) {
        let id = viewmodel.id();
        self.viewmodels.borrow_mut().entry(id).or_insert(viewmodel);
    }

    /// Register a transition with the current batch's manager.
    pub fn register_transition(&self, transition: Rc<dyn Transition>) -> Result<()> {
        let manager = self.active_manager_for("register_transition")?;
        manager.push(transition);
        Ok(())
    }

    /// Queue a view for update. The same view may be queued more than once.
    pub fn add_view(&self, view: Rc<dyn View>) {
        self.dirty.set(true);
        self.views.borrow_mut().push(view);
    }

    /// Lock an attribute until the end of the current flush pass.
    ///
    /// Locking an already locked attribute is a no-op.
    pub fn lock_attribute(&self, attribute: Rc<dyn Lockable>) {
        self.locked.borrow_mut().lock(attribute);
    }

    /// Recompute styles now, or at the end of the pass if flushing.
    pub fn schedule_css_update(&self) {
        if self.flushing.get() {
            self.pending_css.set(true);
        } else {
            self.apply_styles();
        }
    }

    /// Add a reference to the retry set.
    pub fn add_unresolved(&self, reference: Rc<Reference>) {
        self.dirty.set(true);
        self.unresolved.insert(reference);
    }

    /// Withdraw a reference from the retry set.
    ///
    /// Returns `true` if it was waiting.
    pub fn remove_unresolved(&self, id: ReferenceId) -> bool {
        self.unresolved.remove(id)
    }

    /// Detach `node` once every transition of the current batch (and of
    /// any batch nested in it) has finished.
    pub fn detach_when_ready(&self, node: Rc<dyn Detachable>) -> Result<()> {
        let manager = self.active_manager_for("detach_when_ready")?;
        manager.detach_when_ready(node);
        Ok(())
    }

    /// Run `task` once the model has settled, before views update.
    pub fn after_model_update<F>(&self, task: F)
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        self.dirty.set(true);
        self.model_tasks.borrow_mut().push(Box::new(task));
    }

    /// Run `task` once views have updated.
    pub fn after_view_update<F>(&self, task: F)
    where
        F: FnOnce(&Scheduler) + 'static,
    {
        self.dirty.set(true);
        self.view_tasks.borrow_mut().push(Box::new(task));
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Check if an outermost `end()` is flushing.
    pub fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Check if queued work remains before the batch can close.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Check if a batch is open, flushing or not.
    pub fn has_active_batch(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// Get the transition manager of the innermost open batch.
    pub fn active_manager(&self) -> Option<Rc<TransitionManager>> {
        self.active.borrow().clone()
    }

    /// Get the number of viewmodels with changes waiting to be applied.
    pub fn pending_viewmodels(&self) -> usize {
        self.viewmodels.borrow().len()
    }

    /// Get the number of queued view updates.
    pub fn pending_views(&self) -> usize {
        self.views.borrow().len()
    }

    /// Get the number of references waiting to be resolved.
    pub fn unresolved_count(&self) -> usize {
        self.unresolved.len()
    }

    /// Get the work counters so far.
    pub fn stats(&self) -> RunloopStats {
        self.stats.get()
    }

    /// Get the configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    fn flush_changes(&self) {
        let mut blowbacks = 0u32;

        loop {
            self.update_stats(|stats| stats.passes += 1);

            while let Some(viewmodel) = self.next_viewmodel() {
                if let Some(changes) = viewmodel.apply_changes(self) {
                    if !changes.is_empty() {
                        trace!(
                            viewmodel = viewmodel.id().raw(),
                            changes = changes.len(),
                            "viewmodel changed"
                        );
                        viewmodel.fire_change(&changes);
                    }
                }
            }

            self.attempt_resolution();

            // Model tasks may have knock-on effects, so loop until settled
            while self.dirty.replace(false) {
                while let Some(task) = self.next_model_task() {
                    task(self);
                }
                self.attempt_resolution();
            }

            while let Some(view) = self.next_view() {
                view.update(self);
            }

            while let Some(task) = self.next_view_task() {
                task(self);
            }

            if self.viewmodels.borrow().is_empty() {
                break;
            }

            blowbacks += 1;
            self.update_stats(|stats| stats.blowbacks += 1);
            debug!(
                blowbacks,
                pending = self.pending_viewmodels(),
                "view update dirtied the model, flushing again"
            );
            if self.config.blowback_warn_after == Some(blowbacks) {
                warn!(blowbacks, "flush keeps dirtying the model");
            }
        }

        while let Some(attribute) = self.next_locked() {
            attribute.set_locked(false);
        }

        if self.pending_css.replace(false) {
            self.apply_styles();
        }
    }

    fn attempt_resolution(&self) {
        let resolved = self.unresolved.attempt(
            self.resolver.as_ref(),
            self,
            self.config.unresolved_warn_after,
        );
        if resolved > 0 {
            self.update_stats(|stats| stats.resolved += resolved as u64);
        }
    }

    fn apply_styles(&self) {
        if let Some(styles) = &self.styles {
            styles.update();
        }
    }

    /// Reset to a consistent state after a panic inside a batch.
    fn abandon_batch(&self) {
        warn!("collaborator panicked, abandoning batch");

        self.flushing.set(false);
        self.dirty.set(false);
        self.pending_css.set(false);

        let discarded = (
            std::mem::take(&mut *self.viewmodels.borrow_mut()),
            self.views.borrow_mut().take_all(),
            self.model_tasks.borrow_mut().take_all(),
            self.view_tasks.borrow_mut().take_all(),
        );
        drop(discarded);

        while let Some(attribute) = self.next_locked() {
            attribute.set_locked(false);
        }

        if let Some(manager) = self.pop_manager() {
            manager.abandon();
        }
        self.update_stats(|stats| stats.abandoned += 1);
    }

    // Each of these pops under a short borrow, so the item can run freely.

    fn next_viewmodel(&self) -> Option<Rc<dyn Viewmodel>> {
        self.viewmodels
            .borrow_mut()
            .shift_remove_index(0)
            .map(|(_, viewmodel)| viewmodel)
    }

    fn next_view(&self) -> Option<Rc<dyn View>> {
        self.views.borrow_mut().pop()
    }

    fn next_model_task(&self) -> Option<Task> {
        self.model_tasks.borrow_mut().pop()
    }

    fn next_view_task(&self) -> Option<Task> {
        self.view_tasks.borrow_mut().pop()
    }

    fn next_locked(&self) -> Option<Rc<dyn Lockable>> {
        self.locked.borrow_mut().next()
    }

    fn pop_manager(&self) -> Option<Rc<TransitionManager>> {
        let mut active = self.active.borrow_mut();
        let manager = active.take()?;
        *active = manager.parent().cloned();
        Some(manager)
    }

    fn active_manager_for(&self, operation: &'static str) -> Result<Rc<TransitionManager>> {
        self.active_manager()
            .ok_or(SchedulerError::NoActiveBatch { operation })
    }

    fn update_stats(&self, f: impl FnOnce(&mut RunloopStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("flushing", &self.flushing.get())
            .field("dirty", &self.dirty.get())
            .field("pending_viewmodels", &self.pending_viewmodels())
            .field("pending_views", &self.pending_views())
            .field("unresolved", &self.unresolved_count())
            .field("active", &self.active.borrow().as_ref().map(|m| m.id()))
            .field("stats", &self.stats.get())
            .finish()
    }
}

/// Abandons the batch if dropped while armed, i.e. during unwinding.
struct AbandonOnUnwind<'a> {
    scheduler: &'a Scheduler,
    armed: bool,
}

impl<'a> AbandonOnUnwind<'a> {
    fn new(scheduler: &'a Scheduler) -> Self {
        Self {
            scheduler,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnUnwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.scheduler.abandon_batch();
        }
    }
}

/// Builder for a `Scheduler` with custom collaborators.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    resolver: Option<Box<dyn Resolver>>,
    styles: Option<Rc<dyn Styles>>,
}

impl SchedulerBuilder {
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// The resolver used to retry unresolved references.
    pub fn resolver<R>(mut self, resolver: R) -> Self
    where
        R: Resolver + 'static,
    {
        self.resolver = Some(Box::new(resolver));
        self
    }

    /// The style subsystem updated by `schedule_css_update`.
    pub fn styles(mut self, styles: Rc<dyn Styles>) -> Self {
        self.styles = Some(styles);
        self
    }

    pub fn build(self) -> Scheduler {
        Scheduler {
            config: self.config,
            resolver: self.resolver.unwrap_or_else(|| Box::new(NeverResolves)),
            styles: self.styles,
            flushing: Cell::new(false),
            dirty: Cell::new(false),
            pending_css: Cell::new(false),
            viewmodels: RefCell::new(IndexMap::new()),
            views: RefCell::new(LifoQueue::new()),
            model_tasks: RefCell::new(LifoQueue::new()),
            view_tasks: RefCell::new(LifoQueue::new()),
            locked: RefCell::new(LockedAttributes::new()),
            unresolved: UnresolvedSet::new(),
            active: RefCell::new(None),
            stats: Cell::new(RunloopStats::default()),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
