//! Unresolved References
//!
//! A reference is a symbolic path (`foo.bar`, `.name`, `../title`) used in a
//! template before any concrete keypath could be found for it, typically
//! because its scope's data did not exist yet.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::keypath::Keypath;
use crate::runloop::Scheduler;

/// Unique identifier for a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceId(u64);

impl ReferenceId {
    /// Generate a new unique reference ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ReferenceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifies the root context (component instance) a reference lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(u64);

impl From<u64> for RootId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl RootId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Identifies the enclosing template scope a reference is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u64);

impl From<u64> for ScopeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl ScopeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

type OnResolve = Box<dyn FnOnce(&Scheduler, &Keypath)>;

/// A reference awaiting a concrete keypath.
pub struct Reference {
    id: ReferenceId,
    root: RootId,
    text: String,
    scope: Option<ScopeId>,

    /// The concrete keypath, once known.
    resolved: RefCell<Option<Keypath>>,

    /// Initializes whatever owns the reference. Runs at most once.
    on_resolve: RefCell<Option<OnResolve>>,

    /// Failed resolution attempts so far.
    attempts: Cell<u32>,
}

impl Reference {
    /// Create an unresolved reference.
    ///
    /// `on_resolve` runs once, when a keypath is found. It receives the
    /// scheduler so it can register further work.
    pub fn new<F>(root: RootId, text: impl Into<String>, scope: Option<ScopeId>, on_resolve: F) -> Self
    where
        F: FnOnce(&Scheduler, &Keypath) + 'static,
    {
        Self {
            id: ReferenceId::new(),
            root,
            text: text.into(),
            scope,
            resolved: RefCell::new(None),
            on_resolve: RefCell::new(Some(Box::new(on_resolve))),
            attempts: Cell::new(0),
        }
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }

    pub fn root(&self) -> RootId {
        self.root
    }

    /// The reference as written.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// The concrete keypath, if resolved.
    pub fn keypath(&self) -> Option<Keypath> {
        self.resolved.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.borrow().is_some()
    }

    /// Number of failed resolution attempts.
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }

    /// Bind the reference to `keypath` and run its resolve callback.
    ///
    /// Resolving an already resolved reference does nothing. This is also
    /// how an owner resolves a reference "through another path" without
    /// waiting for the scheduler to retry it.
    pub fn resolve(&self, scheduler: &Scheduler, keypath: Keypath) {
        if self.is_resolved() {
            return;
        }
        *self.resolved.borrow_mut() = Some(keypath.clone());

        let on_resolve = self.on_resolve.borrow_mut().take();
        if let Some(on_resolve) = on_resolve {
            on_resolve(scheduler, &keypath);
        }
    }

    pub(crate) fn record_failed_attempt(&self) -> u32 {
        let attempts = self.attempts.get().saturating_add(1);
        self.attempts.set(attempts);
        attempts
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("root", &self.root)
            .field("text", &self.text)
            .field("scope", &self.scope)
            .field("resolved", &self.resolved.borrow())
            .field("attempts", &self.attempts.get())
            .finish()
    }
}
