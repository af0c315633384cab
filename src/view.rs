//! Path-scoped read/write handles over a state host.
//!
//! A [`PathView`] identifies one path into the tree and delegates actual
//! mutation to its host through the [`Action`] protocol. Views are cheap
//! handles: deriving a child view allocates nothing in the host, and two
//! views over the same host with equal paths are interchangeable.

use crate::action::{Action, ActionLabel};
use crate::holder::{RootCallback, RootSubscription, StateHost};
use crate::path::{Key, Path};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

struct ViewCore {
    host: Arc<dyn StateHost>,
    path: Path,
    /// Memoized child views; present only in cached mode.
    children: Option<RwLock<HashMap<Key, PathView>>>,
}

/// A lightweight handle for reading and writing at one path.
///
/// Cloning shares the handle. [`derive`](Self::derive) produces child
/// handles; in cached mode ([`cached`](Self::cached)) repeated derivation
/// of the same key returns the identical handle
/// ([`PathView::ptr_eq`]), which reference-equality-based consumers rely
/// on.
#[derive(Clone)]
pub struct PathView {
    core: Arc<ViewCore>,
}

impl PathView {
    /// A view of the host's root.
    pub fn root(host: Arc<dyn StateHost>) -> Self {
        Self::with_mode(host, Path::root(), false)
    }

    /// A view of an arbitrary path.
    pub fn new(host: Arc<dyn StateHost>, path: Path) -> Self {
        Self::with_mode(host, path, false)
    }

    fn with_mode(host: Arc<dyn StateHost>, path: Path, cached: bool) -> Self {
        Self {
            core: Arc::new(ViewCore {
                host,
                path,
                children: cached.then(|| RwLock::new(HashMap::new())),
            }),
        }
    }

    /// This view's path.
    pub fn path(&self) -> &Path {
        &self.core.path
    }

    /// The host this view writes through.
    pub fn host(&self) -> Arc<dyn StateHost> {
        self.core.host.clone()
    }

    /// True if both handles are the very same object.
    pub fn ptr_eq(a: &PathView, b: &PathView) -> bool {
        Arc::ptr_eq(&a.core, &b.core)
    }

    /// A caching twin of this view: derivation memoizes one child handle
    /// per key, recursively. The default mode returns a fresh handle on
    /// every call.
    pub fn cached(&self) -> PathView {
        Self::with_mode(self.core.host.clone(), self.core.path.clone(), true)
    }

    /// True if this view memoizes derived children.
    pub fn is_cached(&self) -> bool {
        self.core.children.is_some()
    }

    /// A view of `path + key`.
    pub fn derive(&self, key: impl Into<Key>) -> PathView {
        let key = key.into();
        match &self.core.children {
            None => Self::with_mode(
                self.core.host.clone(),
                self.core.path.child(key),
                false,
            ),
            Some(cache) => {
                if let Some(child) = cache.read().get(&key) {
                    return child.clone();
                }
                let child = Self::with_mode(
                    self.core.host.clone(),
                    self.core.path.child(key.clone()),
                    true,
                );
                cache.write().entry(key).or_insert(child).clone()
            }
        }
    }

    /// A view of `path + relative`, deriving one key at a time.
    pub fn at(&self, relative: &Path) -> PathView {
        let mut view = self.clone();
        for key in relative.iter() {
            view = view.derive(key.clone());
        }
        view
    }

    /// The value at this path, or `None` when the path (or an ancestor)
    /// is absent.
    pub fn get(&self) -> Option<Value> {
        self.core.host.current().at(&self.core.path).cloned()
    }

    /// Replace the value at this path.
    ///
    /// An identity-equal value is a no-op with zero notifications. A write
    /// through a missing ancestor is logged and abandoned; state is left
    /// untouched and no error is raised.
    pub fn set(&self, value: impl Into<Value>) {
        let value = value.into();
        if let Some(current) = self.get() {
            if current.same(&value) {
                return;
            }
        }
        self.core
            .host
            .apply(Action::set(self.core.path.clone(), value));
    }

    /// Shallow-merge a partial object into the value at this path.
    ///
    /// A no-op when every member of `partial` is already identity-equal in
    /// place; otherwise behaves as `set` with the merged value.
    pub fn assign(&self, partial: impl Into<Value>) {
        self.core
            .host
            .apply(Action::assign(self.core.path.clone(), partial.into()));
    }

    /// Remove this path's key from its parent. At the root, clears the
    /// root to null.
    pub fn delete(&self) {
        self.core.host.apply(Action::delete(self.core.path.clone()));
    }

    /// Set to `f(current)`. `f` must not mutate; it receives the current
    /// value (or `None` when absent) and returns the replacement.
    pub fn set_using(&self, f: impl FnOnce(Option<Value>) -> Value) {
        self.set_computed(ActionLabel::new("set"), f);
    }

    /// [`set_using`](Self::set_using) with a function name for
    /// diagnostics; the mutation is labeled `set:<name>`.
    pub fn set_using_named(&self, name: &str, f: impl FnOnce(Option<Value>) -> Value) {
        self.set_computed(ActionLabel::new("set").with_func(name), f);
    }

    /// Shallow-clone the current value, let `f` edit the clone in place,
    /// then set the result. Children untouched by `f` stay shared. An
    /// absent current value is presented as null.
    ///
    /// If `f` panics, nothing is applied.
    pub fn mutate_using(&self, f: impl FnOnce(&mut Value)) {
        self.mutate_computed(ActionLabel::new("mutate"), f);
    }

    /// [`mutate_using`](Self::mutate_using) labeled `mutate:<name>`.
    pub fn mutate_using_named(&self, name: &str, f: impl FnOnce(&mut Value)) {
        self.mutate_computed(ActionLabel::new("mutate").with_func(name), f);
    }

    fn set_computed(&self, label: ActionLabel, f: impl FnOnce(Option<Value>) -> Value) {
        let next = f(self.get());
        self.core
            .host
            .apply(Action::set(self.core.path.clone(), next).with_label(label));
    }

    fn mutate_computed(&self, label: ActionLabel, f: impl FnOnce(&mut Value)) {
        let mut value = self.get().unwrap_or(Value::Null);
        f(&mut value);
        self.core
            .host
            .apply(Action::set(self.core.path.clone(), value).with_label(label));
    }

    /// Run `f` against a private fork of this view.
    ///
    /// Writes inside `f` are immediately visible to reads on the forked
    /// view but reach the shared host only when `f` returns, as a single
    /// commit producing at most one notification. Batches nest: an inner
    /// batch forks the outer fork and commits into it silently.
    ///
    /// If `f` panics, the fork is discarded and nothing commits.
    pub fn batch<R>(&self, f: impl FnOnce(&PathView) -> R) -> R {
        let fork = Arc::new(BatchFork {
            parent: self.core.host.clone(),
            root: RwLock::new(self.core.host.current()),
        });
        let view = Self::with_mode(
            fork.clone(),
            self.core.path.clone(),
            self.core.children.is_some(),
        );
        let result = f(&view);
        fork.commit();
        result
    }
}

impl PartialEq for PathView {
    /// Interchangeability: same backing state and equal paths. Separate
    /// `Arc` wrappers around clones of one holder compare equal.
    fn eq(&self, other: &Self) -> bool {
        self.core.host.host_id() == other.core.host.host_id()
            && self.core.path == other.core.path
    }
}

impl fmt::Debug for PathView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathView")
            .field("path", &self.core.path.to_string())
            .field("cached", &self.is_cached())
            .finish()
    }
}

/// Private fork backing a batch: a working root that absorbs writes until
/// commit.
struct BatchFork {
    parent: Arc<dyn StateHost>,
    root: RwLock<Value>,
}

impl BatchFork {
    fn commit(&self) {
        let root = self.root.read().clone();
        // Identity-checked by the parent: an untouched fork commits
        // nothing and notifies no one.
        self.parent.apply(
            Action::set(Path::root(), root).with_label(ActionLabel::new("batch")),
        );
    }
}

impl StateHost for BatchFork {
    fn current(&self) -> Value {
        self.root.read().clone()
    }

    fn apply(&self, action: Action) {
        let old = self.current();
        let new = action.apply_or_log(&old);
        if !new.same(&old) {
            *self.root.write() = new;
        }
    }

    fn subscribe(&self, callback: RootCallback) -> RootSubscription {
        // A fork has no live stream; fire once with the working root.
        callback(&self.current());
        RootSubscription::detached()
    }

    fn host_id(&self) -> usize {
        // Each fork is its own state; two views are interchangeable only
        // within one fork.
        self as *const BatchFork as usize
    }
}
