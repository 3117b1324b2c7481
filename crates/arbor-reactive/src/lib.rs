//! Reactive value tree for the Arbor state container.
//!
//! State is one nested [`serde_json::Value`]; consumers observe any sub-path
//! of it and are notified only when that sub-path's value changes. Nothing is
//! declared up front: reactive nodes are materialized lazily along the paths
//! that are actually subscribed, and prune themselves the moment they lose
//! their last observer.
//!
//! # Layers
//!
//! - [`Observable`]: the primitive. A current value, an ordered subscriber
//!   list, replay-on-subscribe, and lifecycle hooks.
//! - [`Node`]: a tree of observables mirroring the observed parts of the
//!   state tree; each child re-derives its value from its parent's emissions
//!   and detaches deterministically when unobserved.
//! - [`Query`]: an immutable (root, path) pair; cheap to build and refine,
//!   it materializes nodes only on subscribe.
//! - [`Getter`]: total, absent-tolerant navigation into a plain value.
//!
//! # Example
//!
//! ```
//! use arbor_reactive::{Node, Path, Query};
//! use serde_json::json;
//! use std::sync::{Arc, Mutex};
//!
//! let root = Node::root();
//! root.observable().next(Some(json!({"clock": {"sec": 0}})));
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let sub = Query::new(root.clone(), Path::root())
//!     .get("clock.sec")
//!     .subscribe(move |v: Option<&serde_json::Value>| {
//!         sink.lock().unwrap().push(v.cloned());
//!     });
//!
//! root.observable().next(Some(json!({"clock": {"sec": 1}})));
//! assert_eq!(*seen.lock().unwrap(), vec![Some(json!(0)), Some(json!(1))]);
//!
//! sub.unsubscribe();
//! ```

mod getter;
mod node;
mod observable;
mod path;
mod query;

pub use getter::{get_at_path, Getter};
pub use node::Node;
pub use observable::{Observable, Observer, SubscriberId};
pub use path::{Path, Seg};
pub use query::{value_changed, Query, Subscription};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
