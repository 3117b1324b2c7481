//! Serialized dispatch pipeline and action registry for the Arbor state
//! container.
//!
//! State lives in one nested [`Value`] tree owned by a [`Store`]. Handlers
//! are registered independently, each owning one selector path into the
//! tree, keyed by one or more action kinds; at store creation they are
//! compiled into a single composed reducer. Consumers subscribe to any
//! sub-path through [`Store::get`] and are notified only when that
//! sub-path's value changes.
//!
//! Dispatches are fully serialized: a dispatch issued while another is in
//! flight (including from inside a handler or side effect) is queued and
//! runs strictly after the current one completes, in issuance order.
//!
//! # Example
//!
//! ```
//! use arbor_store::{ActionRegistry, HandlerEntry};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! tokio_test::block_on(async {
//!     let mut registry = ActionRegistry::new();
//!     registry
//!         .register(
//!             "increment",
//!             "increment",
//!             HandlerEntry::new("counter", |slice, _ctx| match slice {
//!                 None => Some(json!(0)),
//!                 Some(v) => Some(json!(v.as_i64().unwrap_or(0) + 1)),
//!             }),
//!         )
//!         .unwrap();
//!
//!     let store = registry.create_store(None).await.unwrap();
//!
//!     let seen = Arc::new(Mutex::new(Vec::new()));
//!     let sink = seen.clone();
//!     let sub = store
//!         .get("counter")
//!         .subscribe(move |v: Option<&serde_json::Value>| {
//!             sink.lock().unwrap().push(v.cloned());
//!         });
//!
//!     store.dispatch_named("increment", None).await.unwrap();
//!     store.dispatch_named("increment", None).await.unwrap();
//!
//!     assert_eq!(
//!         *seen.lock().unwrap(),
//!         vec![Some(json!(0)), Some(json!(1)), Some(json!(2))]
//!     );
//!     sub.unsubscribe();
//! });
//! ```

mod action;
mod error;
mod reducer;
mod registry;
mod store;

pub use action::{
    effect_fn, Action, ActionKinds, EffectContext, Handler, HandlerContext, HandlerEntry,
    SideEffect,
};
pub use error::{BoxError, StoreError, StoreResult};
pub use reducer::Reducer;
pub use registry::ActionRegistry;
pub use store::{ActionCreator, Dispatch, DispatchFuture, Store};

// The reactive layer's types appear throughout this crate's API.
pub use arbor_reactive::{
    get_at_path, path, value_changed, Getter, Node, Observable, Observer, Path, Query, Seg,
    SubscriberId, Subscription,
};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
