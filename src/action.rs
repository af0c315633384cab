//! The mutation protocol.
//!
//! An [`Action`] describes how to transform state at a path. Application is
//! pure: the old root is never touched, and when nothing would change the
//! *identical* root (same allocations) comes back, so callers can
//! short-circuit on identity and skip notification entirely.

use crate::error::{Result, StoreError};
use crate::path::Path;
use crate::value::Value;
use std::fmt;

/// Human-readable label identifying a mutation for diagnostics.
///
/// Renders as `set` or, when the mutation came from a named function,
/// `set:increment`. The full diagnostic line is produced by
/// [`Action::describe`]: `[set:increment] nested.counter`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionLabel {
    op: &'static str,
    func: Option<String>,
}

impl ActionLabel {
    pub fn new(op: &'static str) -> Self {
        Self { op, func: None }
    }

    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }

    /// The operation kind (`set`, `assign`, `delete`, `mutate`, `batch`).
    pub fn op(&self) -> &'static str {
        self.op
    }

    /// The originating function name, if any.
    pub fn func(&self) -> Option<&str> {
        self.func.as_deref()
    }
}

impl fmt::Display for ActionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.func {
            Some(func) => write!(f, "{}:{}", self.op, func),
            None => write!(f, "{}", self.op),
        }
    }
}

/// A structural mutation at a path.
#[derive(Clone, Debug)]
pub enum Action {
    /// Replace the value at `path`.
    Set {
        path: Path,
        value: Value,
        label: ActionLabel,
    },

    /// Shallow-merge a partial object into the value at `path`.
    ///
    /// Falls back to `Set` semantics when the target is absent or not an
    /// object.
    Merge {
        path: Path,
        value: Value,
        label: ActionLabel,
    },

    /// Remove the entry at `path` from its parent. At the root, clears
    /// the root to null (the root slot itself cannot be absent).
    Delete { path: Path, label: ActionLabel },

    /// Apply child actions in order against a running root.
    ///
    /// A child that fails on a missing ancestor is logged and skipped;
    /// the rest of the batch still applies.
    Batch(Vec<Action>),
}

impl Action {
    pub fn set(path: Path, value: impl Into<Value>) -> Self {
        Action::Set {
            path,
            value: value.into(),
            label: ActionLabel::new("set"),
        }
    }

    pub fn assign(path: Path, value: impl Into<Value>) -> Self {
        Action::Merge {
            path,
            value: value.into(),
            label: ActionLabel::new("assign"),
        }
    }

    pub fn delete(path: Path) -> Self {
        Action::Delete {
            path,
            label: ActionLabel::new("delete"),
        }
    }

    pub fn batch(actions: Vec<Action>) -> Self {
        Action::Batch(actions)
    }

    /// Replace the diagnostic label (used by function-derived writes).
    pub fn with_label(mut self, new: ActionLabel) -> Self {
        match &mut self {
            Action::Set { label, .. }
            | Action::Merge { label, .. }
            | Action::Delete { label, .. } => *label = new,
            Action::Batch(_) => {}
        }
        self
    }

    /// The path this action targets. `None` for a batch.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Action::Set { path, .. }
            | Action::Merge { path, .. }
            | Action::Delete { path, .. } => Some(path),
            Action::Batch(_) => None,
        }
    }

    pub fn label(&self) -> Option<&ActionLabel> {
        match self {
            Action::Set { label, .. }
            | Action::Merge { label, .. }
            | Action::Delete { label, .. } => Some(label),
            Action::Batch(_) => None,
        }
    }

    /// The diagnostic line: `[<op>:<func>] <dot-path>`.
    pub fn describe(&self) -> String {
        match self {
            Action::Batch(actions) => format!("[batch] {} actions", actions.len()),
            _ => format!(
                "[{}] {}",
                self.label().expect("non-batch action has a label"),
                self.path().expect("non-batch action has a path"),
            ),
        }
    }

    /// Apply this action to `root`, returning the new root.
    ///
    /// Returns the identical root when nothing changed. The only error is
    /// [`StoreError::MissingAncestor`]; batches handle it internally
    /// (log-and-skip) and never fail.
    pub fn apply(&self, root: &Value) -> Result<Value> {
        match self {
            Action::Set { path, value, label } => set_at(root, path, value.clone(), label),
            Action::Merge { path, value, label } => merge_at(root, path, value, label),
            Action::Delete { path, label } => delete_at(root, path, label),
            Action::Batch(actions) => {
                let mut current = root.clone();
                for action in actions {
                    current = action.apply_or_log(&current);
                }
                Ok(current)
            }
        }
    }

    /// Apply, downgrading a missing-ancestor failure to a warning.
    ///
    /// The write is abandoned and the old root returned untouched. This is
    /// the versioned policy for bad writes: log, never throw, so one bad
    /// write cannot abort an otherwise valid batch.
    pub fn apply_or_log(&self, root: &Value) -> Value {
        match self.apply(root) {
            Ok(next) => next,
            Err(err) => {
                tracing::warn!(target: "arbor", "{}", err);
                root.clone()
            }
        }
    }
}

/// Resolve the values at every proper prefix of `path` (the target's
/// ancestors, root first). Errors on the first absent ancestor.
fn ancestor_chain<'a>(root: &'a Value, path: &Path, label: &ActionLabel) -> Result<Vec<&'a Value>> {
    let mut chain = Vec::with_capacity(path.len());
    let mut cur = root;
    chain.push(cur);
    for (depth, key) in path.keys()[..path.len() - 1].iter().enumerate() {
        match cur.get(key) {
            Some(next) => {
                cur = next;
                chain.push(next);
            }
            None => {
                return Err(StoreError::MissingAncestor {
                    ancestor: path.prefix(depth + 1),
                    label: label.clone(),
                    path: path.clone(),
                })
            }
        }
    }
    Ok(chain)
}

/// Rebuild the spine from the target's parent up to the root, substituting
/// `child` at each level. `chain[i]` holds the old value at `path.prefix(i)`.
fn rebuild(
    chain: &[&Value],
    path: &Path,
    mut child: Value,
    label: &ActionLabel,
) -> Result<Value> {
    for depth in (0..chain.len()).rev() {
        child = chain[depth].with_entry(&path[depth], child).ok_or_else(|| {
            StoreError::MissingAncestor {
                ancestor: path.prefix(depth),
                label: label.clone(),
                path: path.clone(),
            }
        })?;
    }
    Ok(child)
}

fn set_at(root: &Value, path: &Path, value: Value, label: &ActionLabel) -> Result<Value> {
    if path.is_root() {
        return Ok(if root.same(&value) { root.clone() } else { value });
    }

    let chain = ancestor_chain(root, path, label)?;
    let parent = chain[chain.len() - 1];
    if let Some(current) = parent.get(path.last().expect("non-root path")) {
        if current.same(&value) {
            return Ok(root.clone());
        }
    }

    rebuild(&chain, path, value, label)
}

fn merge_at(root: &Value, path: &Path, partial: &Value, label: &ActionLabel) -> Result<Value> {
    let merged = match (root.at(path), partial) {
        (Some(Value::Object(current)), Value::Object(incoming)) => {
            let unchanged = incoming
                .iter()
                .all(|(k, v)| current.get(k).is_some_and(|cur| cur.same(v)));
            if unchanged {
                return Ok(root.clone());
            }
            let mut map = (**current).clone();
            for (k, v) in incoming.iter() {
                map.insert(k.clone(), v.clone());
            }
            Value::from(map)
        }
        // Absent or non-object target: plain set.
        _ => partial.clone(),
    };

    set_at(root, path, merged, label)
}

fn delete_at(root: &Value, path: &Path, label: &ActionLabel) -> Result<Value> {
    if path.is_root() {
        return Ok(if root.is_null() { root.clone() } else { Value::Null });
    }

    // Deleting below an absent ancestor is a no-op, not a failure.
    let Ok(chain) = ancestor_chain(root, path, label) else {
        return Ok(root.clone());
    };
    let parent = chain[chain.len() - 1];
    let Some(new_parent) = parent.without_entry(path.last().expect("non-root path")) else {
        return Ok(root.clone());
    };
    if new_parent.same(parent) {
        return Ok(root.clone());
    }

    rebuild(&chain[..chain.len() - 1], path, new_parent, label)
}
