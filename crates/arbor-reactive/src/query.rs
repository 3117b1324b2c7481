//! Deferred path queries over the reactive tree.
//!
//! A [`Query`] is an immutable (root, path) pair. Building one is free:
//! `get` only concatenates paths. Reading `value` resolves the path against
//! the root's current value, and `subscribe` is what actually materializes
//! reactive nodes along the path; the tree only ever contains nodes for
//! paths somebody observes.

use crate::getter::get_at_path;
use crate::node::Node;
use crate::observable::{Observer, SubscriberId};
use crate::path::Path;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The default change detector: deliver when the candidate value differs
/// structurally from the previously delivered one.
pub fn value_changed(previous: Option<&Value>, candidate: Option<&Value>) -> bool {
    previous != candidate
}

/// An active subscription on a tree node.
///
/// Dropping the handle does **not** unsubscribe; call
/// [`unsubscribe`](Subscription::unsubscribe). Unsubscribing the last
/// observer of a node prunes the node from the tree synchronously.
#[must_use = "dropping a Subscription leaves it active; call unsubscribe() to detach"]
pub struct Subscription {
    node: Arc<Node>,
    id: SubscriberId,
}

impl Subscription {
    pub(crate) fn new(node: Arc<Node>, id: SubscriberId) -> Self {
        Self { node, id }
    }

    /// Detach the observer. Returns false if it was already gone.
    pub fn unsubscribe(self) -> bool {
        self.node.observable().unsubscribe(self.id)
    }
}

/// Wraps a subscriber so the change detector gates every delivery after the
/// first. The first value always passes; the comparison baseline advances
/// only when a delivery actually occurs.
struct FilteredObserver<O, D> {
    inner: O,
    detector: D,
    delivered: bool,
    previous: Option<Value>,
}

impl<O, D> Observer for FilteredObserver<O, D>
where
    O: Observer,
    D: Fn(Option<&Value>, Option<&Value>) -> bool + Send,
{
    fn next(&mut self, value: Option<&Value>) {
        if !self.delivered || (self.detector)(self.previous.as_ref(), value) {
            self.delivered = true;
            self.previous = value.cloned();
            self.inner.next(value);
        }
    }

    fn complete(&mut self) {
        self.inner.complete()
    }
}

/// An immutable path query rooted at a reactive tree.
///
/// # Examples
///
/// ```
/// use arbor_reactive::{Node, Query};
/// use serde_json::json;
///
/// let root = Node::root();
/// root.observable().next(Some(json!({"clock": {"sec": 3}})));
///
/// let query = Query::new(root, "clock".into());
/// assert_eq!(query.get("sec").value(), Some(json!(3)));
/// ```
#[derive(Clone)]
pub struct Query {
    root: Arc<Node>,
    path: Path,
}

impl Query {
    /// Build a query over `root` at `path`.
    pub fn new(root: Arc<Node>, path: Path) -> Self {
        Self { root, path }
    }

    /// The path this query addresses.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Concatenate `path` onto this query, returning a new query.
    ///
    /// Accepts a dotted string, a segment, a segment list, or another path.
    /// No tree mutation happens here.
    pub fn get(&self, path: impl Into<Path>) -> Query {
        Query {
            root: self.root.clone(),
            path: self.path.join(&path.into()),
        }
    }

    /// Resolve the path against the tree's current value.
    ///
    /// Returns `None` if any segment is absent.
    pub fn value(&self) -> Option<Value> {
        let root_value = self.root.observable().value();
        root_value
            .as_ref()
            .and_then(|v| get_at_path(v, &self.path))
            .cloned()
    }

    /// Subscribe with the default (structural inequality) change detector.
    pub fn subscribe(&self, observer: impl Observer + 'static) -> Subscription {
        self.subscribe_with(observer, value_changed)
    }

    /// Subscribe with a custom change detector.
    ///
    /// The detector receives `(previously delivered, candidate)` and returns
    /// whether the candidate should be delivered. The first delivery always
    /// passes. Because tree nodes replay on subscribe, the observer receives
    /// the current value synchronously.
    ///
    /// Descends through live tree nodes as far as they exist, then upgrades
    /// the remaining path segments into live nodes and subscribes at the
    /// terminal node. Subscribing to a path absent from the current state is
    /// tolerated: the nodes are created with no value and start emitting
    /// once the path becomes populated.
    pub fn subscribe_with<D>(&self, observer: impl Observer + 'static, detector: D) -> Subscription
    where
        D: Fn(Option<&Value>, Option<&Value>) -> bool + Send + 'static,
    {
        let wrapped = FilteredObserver {
            inner: observer,
            detector,
            delivered: false,
            previous: None,
        };

        if self.path.is_empty() {
            let id = self.root.observable().subscribe(wrapped);
            return Subscription::new(self.root.clone(), id);
        }

        // Descend while live nodes exist.
        let mut current = self.root.clone();
        let mut first_dead = self.path.len();
        for (i, seg) in self.path.iter().enumerate() {
            match current.get(seg) {
                Some(child) => current = child,
                None => {
                    first_dead = i;
                    break;
                }
            }
        }

        if first_dead < self.path.len() {
            // The rest of the path lives (or not) inside the last live
            // node's plain value; probe it before materializing nodes.
            let remaining: Path = self.path.segments()[first_dead..].to_vec().into();
            let base = current.observable().value();
            let exists = base
                .as_ref()
                .and_then(|v| get_at_path(v, &remaining))
                .is_some();
            if !exists {
                debug!(path = %self.path, "subscribing to a path absent from the current state");
            }
            for seg in &remaining {
                current = current.upgrade(seg);
            }
        }

        let id = current.observable().subscribe(wrapped);
        Subscription::new(current, id)
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query").field("path", &self.path).finish()
    }
}
