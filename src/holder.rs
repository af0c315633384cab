//! The canonical state owner.
//!
//! [`StateHolder`] owns the single root value and is the only writer.
//! Everything above it (path views, the observable tree, the undo manager)
//! talks to it through the narrow [`StateHost`] capability: read the current
//! root, apply an action, subscribe to the root change stream.
//!
//! Notification is synchronous and single-threaded: a write completes, the
//! new root is installed, and every root subscriber runs before the write
//! call returns. `run_batched` is the only deferral: notification waits for
//! the outermost batch exit and fires at most once.

use crate::action::Action;
use crate::value::Value;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback invoked with each new root value.
pub type RootCallback = Arc<dyn Fn(&Value) + Send + Sync>;

type SubscriberTable = RwLock<HashMap<u64, RootCallback>>;

/// The capability a host state container provides to the core.
///
/// `subscribe` fires immediately with the current value, then on every
/// committed change. `apply` installs a new root, deferring notification
/// while inside a batch. Multiple independent view trees rooted at distinct
/// keys may share one host.
pub trait StateHost: Send + Sync {
    /// The latest root value.
    fn current(&self) -> Value;

    /// Route an action through structural application and install the
    /// result. Missing-ancestor failures are logged, not returned.
    fn apply(&self, action: Action);

    /// Subscribe to the root change stream.
    fn subscribe(&self, callback: RootCallback) -> RootSubscription;

    /// Stable identity of the backing shared state. Two hosts with equal
    /// ids read and write the same root, whatever handles wrap them.
    fn host_id(&self) -> usize;
}

struct HolderShared {
    current: RwLock<Value>,
    subscribers: SubscriberTable,
    next_id: AtomicU64,
    /// Batch nesting depth and whether a notification is pending.
    batch: Mutex<(usize, bool)>,
}

/// Owner of the canonical immutable root value.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct StateHolder {
    shared: Arc<HolderShared>,
}

impl StateHolder {
    pub fn new(initial: Value) -> Self {
        Self {
            shared: Arc::new(HolderShared {
                current: RwLock::new(initial),
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                batch: Mutex::new((0, false)),
            }),
        }
    }

    /// Install a new root value.
    ///
    /// Outside a batch this synchronously notifies every root subscriber
    /// before returning. Inside a batch the notification is deferred to the
    /// outermost exit. No identity check is performed here; `apply` is the
    /// identity-aware entry point.
    pub fn replace(&self, new_root: Value) {
        *self.shared.current.write() = new_root.clone();

        let deferred = {
            let mut batch = self.shared.batch.lock();
            if batch.0 > 0 {
                batch.1 = true;
                true
            } else {
                false
            }
        };
        if !deferred {
            self.notify(&new_root);
        }
    }

    /// Run `f`, deferring root notification until it returns.
    ///
    /// Nested calls coalesce: exactly one notification fires at the
    /// outermost exit, and only if some `replace` happened inside.
    pub fn run_batched<R>(&self, f: impl FnOnce() -> R) -> R {
        self.shared.batch.lock().0 += 1;
        let guard = BatchDepthGuard { holder: self };
        let result = f();
        drop(guard);
        result
    }

    /// Number of active root subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.read().len()
    }

    fn notify(&self, value: &Value) {
        // Snapshot under the read lock, invoke outside it: callbacks may
        // re-enter (read, write, subscribe, unsubscribe).
        let callbacks: Vec<RootCallback> =
            self.shared.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(value);
        }
    }

    fn exit_batch(&self) {
        let pending = {
            let mut batch = self.shared.batch.lock();
            batch.0 -= 1;
            if batch.0 == 0 && batch.1 {
                batch.1 = false;
                true
            } else {
                false
            }
        };
        if pending {
            let value = self.shared.current.read().clone();
            self.notify(&value);
        }
    }
}

/// Decrements batch depth on every exit path, including unwinding out of
/// a panicking batch body.
struct BatchDepthGuard<'a> {
    holder: &'a StateHolder,
}

impl Drop for BatchDepthGuard<'_> {
    fn drop(&mut self) {
        self.holder.exit_batch();
    }
}

impl StateHost for StateHolder {
    fn current(&self) -> Value {
        self.shared.current.read().clone()
    }

    fn apply(&self, action: Action) {
        tracing::debug!(target: "arbor", "{}", action.describe());
        let old = self.current();
        let new = action.apply_or_log(&old);
        if !new.same(&old) {
            self.replace(new);
        }
    }

    fn subscribe(&self, callback: RootCallback) -> RootSubscription {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .subscribers
            .write()
            .insert(id, callback.clone());

        let current = self.current();
        callback(&current);

        RootSubscription {
            table: Arc::downgrade(&self.shared).into(),
            id,
        }
    }

    fn host_id(&self) -> usize {
        Arc::as_ptr(&self.shared) as usize
    }
}

/// Where a root subscription is registered. Weak so a live guard does not
/// keep a dropped holder alive.
enum SubscriptionSite {
    Holder(Weak<HolderShared>),
    Detached,
}

impl From<Weak<HolderShared>> for SubscriptionSite {
    fn from(weak: Weak<HolderShared>) -> Self {
        SubscriptionSite::Holder(weak)
    }
}

/// Scoped handle for a root subscription.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) releases the
/// subscription; release is idempotent and tolerates an already-dropped
/// holder.
pub struct RootSubscription {
    table: SubscriptionSite,
    id: u64,
}

impl RootSubscription {
    /// A guard tied to nothing; used by hosts with no live stream (batch
    /// forks).
    pub(crate) fn detached() -> Self {
        Self {
            table: SubscriptionSite::Detached,
            id: 0,
        }
    }

    /// Release the subscription now. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let SubscriptionSite::Holder(weak) = &self.table {
            if let Some(shared) = weak.upgrade() {
                shared.subscribers.write().remove(&self.id);
            }
        }
        self.table = SubscriptionSite::Detached;
    }
}

impl Drop for RootSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use parking_lot::Mutex as PMutex;
    use serde_json::json;

    fn counting_callback() -> (RootCallback, Arc<PMutex<Vec<Value>>>) {
        let seen = Arc::new(PMutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: RootCallback = Arc::new(move |v: &Value| sink.lock().push(v.clone()));
        (callback, seen)
    }

    #[test]
    fn test_subscribe_fires_immediately() {
        let holder = StateHolder::new(Value::from_json(json!({"a": 1})));
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        assert_eq!(seen.lock().len(), 1);
        assert_eq!(seen.lock()[0].to_json(), json!({"a": 1}));
    }

    #[test]
    fn test_replace_notifies_synchronously() {
        let holder = StateHolder::new(Value::Null);
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        holder.replace(Value::from(1i64));
        assert_eq!(seen.lock().len(), 2);
        assert_eq!(holder.current().as_i64(), Some(1));
    }

    #[test]
    fn test_identity_apply_is_silent() {
        let holder = StateHolder::new(Value::from_json(json!({"a": 1})));
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        let root = holder.current();
        holder.apply(Action::set(path!(), root));
        assert_eq!(seen.lock().len(), 1); // only the initial fire
    }

    #[test]
    fn test_batched_replaces_coalesce() {
        let holder = StateHolder::new(Value::from_json(json!({})));
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        holder.run_batched(|| {
            holder.apply(Action::set(path!("a"), 1i64));
            holder.run_batched(|| {
                holder.apply(Action::set(path!("b"), 2i64));
            });
            holder.apply(Action::set(path!("c"), 3i64));
        });

        assert_eq!(seen.lock().len(), 2); // initial + one coalesced
        assert_eq!(holder.current().to_json(), json!({"a": 1, "b": 2, "c": 3}));
    }

    #[test]
    fn test_empty_batch_is_silent() {
        let holder = StateHolder::new(Value::Null);
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        holder.run_batched(|| {});
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let holder = StateHolder::new(Value::Null);
        let (callback, seen) = counting_callback();
        let mut sub = holder.subscribe(callback);

        sub.unsubscribe();
        sub.unsubscribe();
        holder.replace(Value::from(2i64));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(holder.subscriber_count(), 0);
    }

    #[test]
    fn test_clones_share_host_identity() {
        let holder = StateHolder::new(Value::Null);
        let clone = holder.clone();
        assert_eq!(holder.host_id(), clone.host_id());
        assert_ne!(holder.host_id(), StateHolder::new(Value::Null).host_id());
    }

    #[test]
    fn test_missing_ancestor_apply_leaves_state() {
        let holder = StateHolder::new(Value::from_json(json!({"a": 1})));
        let (callback, seen) = counting_callback();
        let _sub = holder.subscribe(callback);

        holder.apply(Action::set(path!("ghost", "x"), 1i64));
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(holder.current().to_json(), json!({"a": 1}));
    }
}
