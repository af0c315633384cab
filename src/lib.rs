//! # Arbor
//!
//! A path-addressable observable state tree: one large, centrally-held
//! immutable state value behaves like many independently observable,
//! independently writable sub-stores, one per path, without materializing
//! an observable or a write path for every possible path up front.
//!
//! ## Core Concepts
//!
//! - **StateHolder**: owns the single canonical root value; sole writer
//! - **PathView**: a cheap handle reading/writing at one path, with
//!   copy-on-write structural sharing and transactional batching
//! - **ObservableTree**: lazily materialized, reference-counted cache
//!   nodes delivering one change stream per actively-subscribed path
//! - **UndoManager**: bounded snapshot stack replaying history through
//!   the same write path
//!
//! ## Example
//!
//! ```
//! use arbor::{ObservableTree, PathView, StateHolder, Value};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let holder = Arc::new(StateHolder::new(Value::from_json(json!({
//!     "counter": 0,
//!     "nested": { "state": 0 },
//! }))));
//!
//! let root = PathView::root(holder.clone());
//! root.derive("nested").derive("state").set(5i64);
//! assert_eq!(root.derive("counter").get().unwrap().as_i64(), Some(0));
//!
//! let tree = ObservableTree::new(holder);
//! let _observer = tree.subscribe(
//!     &arbor::path!("nested"),
//!     Arc::new(|value| println!("nested is now {:?}", value)),
//! );
//! ```
//!
//! Mutation is synchronous and single-writer: a write completes, the new
//! root is installed, and every affected subscriber has run before the
//! call returns. `PathView::batch` is the only deferral, coalescing many
//! writes into one notification.

pub mod action;
pub mod error;
pub mod holder;
pub mod observe;
pub mod path;
pub mod undo;
pub mod value;
pub mod view;

// Re-exports
pub use action::{Action, ActionLabel};
pub use error::{Result, StoreError};
pub use holder::{RootCallback, RootSubscription, StateHolder, StateHost};
pub use observe::{ObservableTree, ObserverGuard, PathCallback};
pub use path::{Key, Path};
pub use undo::{UndoConfig, UndoManager};
pub use value::{Object, Value};
pub use view::PathView;
