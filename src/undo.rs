//! Undo/redo management over a path view.
//!
//! [`UndoManager`] keeps a bounded stack of extracted snapshots with a
//! single cursor. Restoring a historical entry goes back through the same
//! write path as any other mutation, inside a single batch, so one
//! undo/redo step produces exactly one notification.

use crate::error::{Result, StoreError};
use crate::value::Value;
use crate::view::PathView;

/// Extracts the snapshot to record from the current state.
pub type ExtractFn = Box<dyn Fn(&PathView) -> Value + Send + Sync>;

/// Applies a recorded snapshot back to the view. Runs inside one batch.
pub type RestoreFn = Box<dyn Fn(&PathView, &Value) + Send + Sync>;

/// Decides whether a newly observed state differs enough from the entry at
/// the cursor to warrant a new stack entry.
pub type PushPolicy = Box<dyn Fn(&Value, Option<&Value>) -> bool + Send + Sync>;

/// Undo manager configuration.
#[derive(Clone, Debug)]
pub struct UndoConfig {
    /// Maximum stack depth; the oldest entry is evicted when exceeded.
    /// `0` means unbounded.
    pub max_depth: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { max_depth: 0 }
    }
}

/// Snapshot-and-replay history over one [`PathView`].
///
/// By default the snapshot is the full value at the view's path and
/// restore is a plain `set`; both are hooks, so a host can record an
/// extracted, smaller-than-full-state shape instead.
pub struct UndoManager {
    view: PathView,
    config: UndoConfig,
    extract: ExtractFn,
    restore: RestoreFn,
    should_push: PushPolicy,
    stack: Vec<Value>,
    cursor: Option<usize>,
}

impl UndoManager {
    pub fn new(view: PathView) -> Self {
        Self::with_config(view, UndoConfig::default())
    }

    pub fn with_config(view: PathView, config: UndoConfig) -> Self {
        Self {
            view,
            config,
            extract: Box::new(|view| view.get().unwrap_or(Value::Null)),
            restore: Box::new(|view, snapshot| view.set(snapshot.clone())),
            should_push: Box::new(|_, _| true),
            stack: Vec::new(),
            cursor: None,
        }
    }

    /// Replace the snapshot-extraction hook.
    pub fn with_extract(mut self, extract: impl Fn(&PathView) -> Value + Send + Sync + 'static) -> Self {
        self.extract = Box::new(extract);
        self
    }

    /// Replace the restore hook.
    pub fn with_restore(
        mut self,
        restore: impl Fn(&PathView, &Value) + Send + Sync + 'static,
    ) -> Self {
        self.restore = Box::new(restore);
        self
    }

    /// Replace the push policy (default: always push).
    pub fn with_push_policy(
        mut self,
        policy: impl Fn(&Value, Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_push = Box::new(policy);
        self
    }

    /// Extract the current state and push it if the policy approves.
    /// Returns whether an entry was pushed.
    pub fn record(&mut self) -> bool {
        let snapshot = (self.extract)(&self.view);
        if !(self.should_push)(&snapshot, self.current()) {
            return false;
        }
        self.push(snapshot);
        true
    }

    /// Append a snapshot at `cursor + 1`, truncating any redo-able tail
    /// and evicting the oldest entry when over the size bound.
    pub fn push(&mut self, snapshot: Value) {
        let keep = self.cursor.map_or(0, |i| i + 1);
        self.stack.truncate(keep);
        self.stack.push(snapshot);
        if self.config.max_depth > 0 && self.stack.len() > self.config.max_depth {
            self.stack.remove(0);
        }
        self.cursor = Some(self.stack.len() - 1);
    }

    /// Step back one entry and restore it.
    pub fn undo(&mut self) -> Result<()> {
        let Some(i) = self.cursor.filter(|i| *i > 0) else {
            return Err(StoreError::CannotUndo);
        };
        self.cursor = Some(i - 1);
        self.apply_entry(i - 1);
        Ok(())
    }

    /// Step forward one entry and restore it.
    pub fn redo(&mut self) -> Result<()> {
        let Some(i) = self.cursor.filter(|i| i + 1 < self.stack.len()) else {
            return Err(StoreError::CannotRedo);
        };
        self.cursor = Some(i + 1);
        self.apply_entry(i + 1);
        Ok(())
    }

    /// Truncate history to a single entry: the current state.
    pub fn reset(&mut self) {
        let snapshot = (self.extract)(&self.view);
        self.stack.clear();
        self.stack.push(snapshot);
        self.cursor = Some(0);
    }

    /// Remove the entry just before the cursor without moving the cursor
    /// off its entry. Coalesces near-simultaneous pushes.
    pub fn drop_current_undo_state(&mut self) -> Result<()> {
        let Some(i) = self.cursor.filter(|i| *i > 0) else {
            return Err(StoreError::NothingToDrop);
        };
        self.stack.remove(i - 1);
        self.cursor = Some(i - 1);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some_and(|i| i > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.cursor.is_some_and(|i| i + 1 < self.stack.len())
    }

    /// Number of entries on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Cursor position, `None` when the stack is empty.
    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The entry at the cursor.
    pub fn current(&self) -> Option<&Value> {
        self.cursor.map(|i| &self.stack[i])
    }

    fn apply_entry(&self, index: usize) {
        let snapshot = self.stack[index].clone();
        let restore = &self.restore;
        self.view.batch(|view| restore(view, &snapshot));
    }
}
