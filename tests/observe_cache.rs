//! Observable-cache lifecycle and emission tests.

use arbor::{path, ObservableTree, Path, PathCallback, PathView, StateHolder, StateHost, Value};
use parking_lot::Mutex;
use serde_json::json;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

fn setup(json: serde_json::Value) -> (Arc<StateHolder>, ObservableTree) {
    let holder = Arc::new(StateHolder::new(Value::from_json(json)));
    let tree = ObservableTree::new(holder.clone());
    (holder, tree)
}

fn recording() -> (PathCallback, Arc<Mutex<Vec<Option<Value>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: PathCallback = Arc::new(move |v: Option<&Value>| sink.lock().push(v.cloned()));
    (callback, seen)
}

// --- Node Lifecycle ---

#[test]
fn test_sibling_subscriptions_share_prefix_nodes() {
    let (_holder, tree) = setup(json!({"a": {"x": 1, "y": 2}}));
    let (cb_x, _) = recording();
    let (cb_y, _) = recording();

    let mut x = tree.subscribe(&path!("a", "x"), cb_x);
    let _y = tree.subscribe(&path!("a", "y"), cb_y);

    // Root, "a", "a.x", "a.y" — the "a" node is shared.
    assert_eq!(tree.node_count(), 4);

    x.unsubscribe();
    // "a" survives: it still has the "y" child.
    assert_eq!(tree.node_count(), 3);
    assert!(tree.has_node(&path!("a")));
    assert!(!tree.has_node(&path!("a", "x")));
}

#[test]
fn test_guard_outliving_tree_is_inert() {
    let (_holder, tree) = setup(json!({"a": 1}));
    let (callback, _) = recording();
    let mut guard = tree.subscribe(&path!("a"), callback);

    drop(tree);
    // Neither call panics on a dead tree.
    guard.unsubscribe();
    drop(guard);
}

#[test]
fn test_array_index_paths() {
    let (holder, tree) = setup(json!({"items": [{"n": 1}, {"n": 2}]}));
    let (callback, seen) = recording();
    let _guard = tree.subscribe(&path!("items", 1, "n"), callback);

    assert_eq!(seen.lock()[0].as_ref().and_then(Value::as_i64), Some(2));

    PathView::root(holder)
        .derive("items")
        .derive(1usize)
        .derive("n")
        .set(9i64);
    assert_eq!(seen.lock()[1].as_ref().and_then(Value::as_i64), Some(9));
}

// --- Emission Semantics ---

#[test]
fn test_deleting_ancestor_emits_none() {
    let (holder, tree) = setup(json!({"a": {"b": {"c": 1}}}));
    let (callback, seen) = recording();
    let _guard = tree.subscribe(&path!("a", "b", "c"), callback);

    PathView::root(holder).derive("a").delete();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1], None);
}

#[test]
fn test_batch_coalesces_to_one_emission_per_path() {
    let (holder, tree) = setup(json!({"a": 0, "b": 0}));
    let (cb_a, seen_a) = recording();
    let (cb_b, seen_b) = recording();
    let _a = tree.subscribe(&path!("a"), cb_a);
    let _b = tree.subscribe(&path!("b"), cb_b);

    PathView::root(holder).batch(|forked| {
        forked.derive("a").set(1i64);
        forked.derive("a").set(2i64);
        forked.derive("b").set(3i64);
    });

    // One commit, one cascade: each path hears its final value once.
    let seen_a = seen_a.lock();
    let seen_b = seen_b.lock();
    assert_eq!(seen_a.len(), 2);
    assert_eq!(seen_a[1].as_ref().and_then(Value::as_i64), Some(2));
    assert_eq!(seen_b.len(), 2);
    assert_eq!(seen_b[1].as_ref().and_then(Value::as_i64), Some(3));
}

#[test]
fn test_reentrant_write_from_callback() {
    let (holder, tree) = setup(json!({"stage": 0, "echo": 0}));

    // First stage write triggers a second write from inside the callback.
    let holder_inner = holder.clone();
    let stage_cb: PathCallback = Arc::new(move |v: Option<&Value>| {
        if v.and_then(Value::as_i64) == Some(1) {
            PathView::root(holder_inner.clone()).derive("echo").set(1i64);
        }
    });
    let _stage = tree.subscribe(&path!("stage"), stage_cb);

    let (echo_cb, echo_seen) = recording();
    let _echo = tree.subscribe(&path!("echo"), echo_cb);

    PathView::root(holder.clone()).derive("stage").set(1i64);

    // The nested cascade delivered the echo write, exactly once, and the
    // final state holds both.
    let echo_seen = echo_seen.lock();
    assert_eq!(echo_seen.len(), 2);
    assert_eq!(echo_seen[1].as_ref().and_then(Value::as_i64), Some(1));
    assert_eq!(holder.current().to_json(), json!({"stage": 1, "echo": 1}));
}

#[test]
fn test_state_survives_panicking_subscriber() {
    let (holder, tree) = setup(json!({"n": 0}));

    let fired = Arc::new(Mutex::new(0usize));
    let fired_inner = fired.clone();
    let panicking: PathCallback = Arc::new(move |v: Option<&Value>| {
        *fired_inner.lock() += 1;
        if v.and_then(Value::as_i64) == Some(1) {
            panic!("subscriber failure");
        }
    });
    let _guard = tree.subscribe(&path!("n"), panicking);

    let view = PathView::root(holder.clone()).derive("n");
    let result = catch_unwind(AssertUnwindSafe(|| view.set(1i64)));
    assert!(result.is_err());

    // The write itself landed before the emission panicked, and the
    // stream keeps delivering afterwards.
    assert_eq!(view.get().unwrap().as_i64(), Some(1));
    view.set(2i64);
    assert_eq!(*fired.lock(), 3); // immediate + panicking + recovered
}

#[test]
fn test_root_subscription_sees_whole_tree() {
    let (holder, tree) = setup(json!({"a": 1}));
    let (callback, seen) = recording();
    let _guard = tree.subscribe(&Path::root(), callback);

    PathView::root(holder).derive("a").set(2i64);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].as_ref().unwrap().to_json(), json!({"a": 2}));
}
