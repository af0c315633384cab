//! The tree-based observable cache.
//!
//! [`ObservableTree`] mirrors the actively-observed part of the state tree
//! as an arena of cache nodes, one per subscribed path. Nodes are created
//! lazily top-down on subscribe and torn down bottom-up on unsubscribe; a
//! node exists iff it has at least one subscriber or at least one child
//! node. All subscribers at a path share one node, so propagation cost per
//! path is paid once per change regardless of subscriber count.
//!
//! A root change runs in two phases: phase one walks only materialized
//! nodes top-down, recomputing each child from its parent's new value and
//! marking it dirty on identity change; phase two emits to dirty nodes'
//! subscribers. No emission fires until every cached value is updated, so
//! a callback at an ancestor path can never read a stale descendant.

use crate::holder::{RootSubscription, StateHost};
use crate::path::{Key, Path};
use crate::value::Value;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with the value at a subscribed path (`None` when the
/// path or an ancestor is absent).
pub type PathCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// One cache node: the last-known value at a path plus its direct
/// subscribers and the keys of materialized children.
struct Node {
    value: Option<Value>,
    dirty: bool,
    subscribers: HashMap<u64, PathCallback>,
    children: HashSet<Key>,
}

impl Node {
    fn new(value: Option<Value>) -> Self {
        Self {
            value,
            dirty: false,
            subscribers: HashMap::new(),
            children: HashSet::new(),
        }
    }

    fn releasable(&self) -> bool {
        self.subscribers.is_empty() && self.children.is_empty()
    }
}

struct TreeShared {
    host: Arc<dyn StateHost>,
    nodes: RwLock<HashMap<Path, Node>>,
    next_id: AtomicU64,
}

/// Per-path change-notification streams over one state host.
///
/// Dropping the tree releases its root-stream subscription; outstanding
/// [`ObserverGuard`]s become inert.
pub struct ObservableTree {
    shared: Arc<TreeShared>,
    _root_subscription: RootSubscription,
}

impl ObservableTree {
    pub fn new(host: Arc<dyn StateHost>) -> Self {
        let shared = Arc::new(TreeShared {
            host: host.clone(),
            nodes: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });

        // The root stream callback must not keep the tree alive.
        let weak = Arc::downgrade(&shared);
        let root_subscription = host.subscribe(Arc::new(move |root: &Value| {
            if let Some(shared) = weak.upgrade() {
                shared.on_root_change(root);
            }
        }));

        Self {
            shared,
            _root_subscription: root_subscription,
        }
    }

    /// Observe the value at `path`.
    ///
    /// Materializes (or reuses) a cache node at every prefix of `path`,
    /// fires `callback` immediately with the current value, then once per
    /// distinct change. Returns a guard whose drop releases the
    /// subscription.
    pub fn subscribe(&self, path: &Path, callback: PathCallback) -> ObserverGuard {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let initial = {
            let mut nodes = self.shared.nodes.write();
            self.shared.materialize_chain(&mut nodes, path);
            let node = nodes.get_mut(path).expect("chain materialized");
            node.subscribers.insert(id, callback.clone());
            node.value.clone()
        };
        callback(initial.as_ref());

        ObserverGuard {
            tree: Arc::downgrade(&self.shared),
            path: path.clone(),
            id: Some(id),
        }
    }

    /// Number of materialized cache nodes.
    pub fn node_count(&self) -> usize {
        self.shared.nodes.read().len()
    }

    /// True if a cache node exists at `path`.
    pub fn has_node(&self, path: &Path) -> bool {
        self.shared.nodes.read().contains_key(path)
    }
}

impl TreeShared {
    /// Ensure a node at every prefix of `path`, top-down. Each new node's
    /// initial value comes from its parent's cached value (the root pulls
    /// from the host).
    fn materialize_chain(&self, nodes: &mut HashMap<Path, Node>, path: &Path) {
        for depth in 0..=path.len() {
            let prefix = path.prefix(depth);
            if !nodes.contains_key(&prefix) {
                let value = match prefix.parent() {
                    None => Some(self.host.current()),
                    Some(parent) => {
                        let key = prefix.last().expect("non-root prefix");
                        nodes
                            .get(&parent)
                            .expect("parent materialized first")
                            .value
                            .as_ref()
                            .and_then(|v| v.get(key))
                            .cloned()
                    }
                };
                nodes.insert(prefix.clone(), Node::new(value));
            }
            if let Some(parent) = prefix.parent() {
                let key = prefix.last().expect("non-root prefix").clone();
                nodes
                    .get_mut(&parent)
                    .expect("parent materialized first")
                    .children
                    .insert(key);
            }
        }
    }

    fn on_root_change(self: &Arc<Self>, new_root: &Value) {
        // Phase one: assign new values across the whole materialized tree.
        let mut dirty_paths = Vec::new();
        {
            let mut nodes = self.nodes.write();
            assign_values(
                &mut nodes,
                Path::root(),
                Some(new_root.clone()),
                &mut dirty_paths,
            );
        }

        // Phase two: emit. The dirty flag is cleared before invoking, so a
        // re-entrant write from inside a callback re-runs both phases and
        // cannot leave this loop emitting a stale value afterwards.
        for path in dirty_paths {
            let emission = {
                let mut nodes = self.nodes.write();
                match nodes.get_mut(&path) {
                    Some(node) if node.dirty => {
                        node.dirty = false;
                        Some((
                            node.value.clone(),
                            node.subscribers.values().cloned().collect::<Vec<_>>(),
                        ))
                    }
                    _ => None,
                }
            };
            if let Some((value, subscribers)) = emission {
                for callback in subscribers {
                    callback(value.as_ref());
                }
            }
        }
    }

    /// Drop one subscriber, then release nodes bottom-up while both the
    /// subscriber count and the child count are zero. Tolerates absent
    /// nodes and ids (idempotent teardown).
    fn unsubscribe(&self, path: &Path, id: u64) {
        let mut nodes = self.nodes.write();
        if let Some(node) = nodes.get_mut(path) {
            node.subscribers.remove(&id);
        }

        let mut current = path.clone();
        while let Some(node) = nodes.get(&current) {
            if !node.releasable() {
                break;
            }
            nodes.remove(&current);
            let Some(parent) = current.parent() else { break };
            if let Some(parent_node) = nodes.get_mut(&parent) {
                parent_node
                    .children
                    .remove(current.last().expect("non-root path"));
            }
            current = parent;
        }
    }
}

/// Recompute cached values for the node at `path` and its materialized
/// descendants, collecting paths whose value changed by identity.
fn assign_values(
    nodes: &mut HashMap<Path, Node>,
    path: Path,
    new_value: Option<Value>,
    dirty_paths: &mut Vec<Path>,
) {
    let Some(node) = nodes.get_mut(&path) else {
        return;
    };
    let changed = !same_option(node.value.as_ref(), new_value.as_ref());
    node.value = new_value.clone();
    if changed {
        node.dirty = true;
        dirty_paths.push(path.clone());
    }
    let children: Vec<Key> = node.children.iter().cloned().collect();

    for key in children {
        let child_value = new_value.as_ref().and_then(|v| v.get(&key)).cloned();
        assign_values(nodes, path.child(key), child_value, dirty_paths);
    }
}

fn same_option(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same(b),
        _ => false,
    }
}

/// Scoped handle for one path observation.
///
/// Release (explicit or on drop) is idempotent and tolerates a tree that
/// has already been dropped.
pub struct ObserverGuard {
    tree: Weak<TreeShared>,
    path: Path,
    id: Option<u64>,
}

impl ObserverGuard {
    /// Release the observation now. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(tree) = self.tree.upgrade() {
                tree.unsubscribe(&self.path, id);
            }
        }
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
