//! The lazily-materialized tree of reactive nodes.
//!
//! A [`Node`] exists for the state-tree root and for every sub-path that
//! currently has an observer on or below it. Each non-root node is wired to
//! re-derive its value whenever its parent emits, and detaches from the tree
//! the instant its own subscriber count reaches zero (deterministically,
//! inside the unsubscribe call that dropped the count, never deferred to a
//! collector).

use crate::getter::Getter;
use crate::observable::{Observable, SubscriberId};
use crate::path::Seg;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tracing::trace;

/// Wiring from a child node back to its parent.
struct ParentLink {
    seg: Seg,
    parent: Weak<Node>,
    subscription: SubscriberId,
}

/// One reactive location in the state tree.
///
/// The root node always exists and holds the whole state value. Child nodes
/// are created on demand by [`upgrade`](Node::upgrade) and owned by their
/// parent's child map; a child's value is always the parent's value narrowed
/// by one segment.
pub struct Node {
    observable: Observable,
    children: Mutex<HashMap<Seg, Arc<Node>>>,
    parent: Mutex<Option<ParentLink>>,
}

/// Narrow a parent value by one segment, absent-tolerant.
fn derive(parent: Option<&Value>, seg: &Seg) -> Option<Value> {
    Getter::from_option(parent).get_seg(seg).value().cloned()
}

impl Node {
    /// Create a detached root node with no value.
    pub fn root() -> Arc<Node> {
        Self::build(None, None)
    }

    fn build(initial: Option<Value>, link: Option<ParentLink>) -> Arc<Node> {
        let node = Arc::new(Node {
            observable: Observable::new(initial, true),
            children: Mutex::new(HashMap::new()),
            parent: Mutex::new(link),
        });
        let weak = Arc::downgrade(&node);
        node.observable.on_unsubscribe(move || {
            if let Some(node) = weak.upgrade() {
                Node::maybe_prune(&node);
            }
        });
        node
    }

    /// The node's underlying reactive primitive.
    #[inline]
    pub fn observable(&self) -> &Observable {
        &self.observable
    }

    /// Look up a live child. Never creates.
    pub fn get(&self, seg: &Seg) -> Option<Arc<Node>> {
        self.children.lock().unwrap().get(seg).cloned()
    }

    /// Return the live child at `seg`, creating and wiring it if absent.
    ///
    /// A new child is seeded from the parent's current value, replays on
    /// subscribe, re-derives its value on every parent emission, and prunes
    /// itself when its own subscriber count reaches zero.
    pub fn upgrade(self: &Arc<Self>, seg: &Seg) -> Arc<Node> {
        let mut children = self.children.lock().unwrap();
        if let Some(child) = children.get(seg) {
            return child.clone();
        }

        let parent_value = self.observable.value();
        let initial = derive(parent_value.as_ref(), seg);
        let child = Self::build(initial, None);

        let weak_child = Arc::downgrade(&child);
        let link_seg = seg.clone();
        let subscription = self.observable.subscribe(move |parent_value: Option<&Value>| {
            if let Some(child) = weak_child.upgrade() {
                child.observable.next(derive(parent_value, &link_seg));
            }
        });
        *child.parent.lock().unwrap() = Some(ParentLink {
            seg: seg.clone(),
            parent: Arc::downgrade(self),
            subscription,
        });

        trace!(seg = %seg, "upgraded child node");
        children.insert(seg.clone(), child.clone());
        child
    }

    /// Detach this node if nothing subscribes to it anymore.
    ///
    /// Runs from the observable's on-unsubscribe hook. Removing the parent
    /// link unsubscribes from the parent's observable, which decrements the
    /// parent's own count and cascades the check bottom-up.
    fn maybe_prune(node: &Arc<Node>) {
        if node.observable.len() > 0 {
            return;
        }
        let link = node.parent.lock().unwrap().take();
        if let Some(link) = link {
            if let Some(parent) = link.parent.upgrade() {
                parent.children.lock().unwrap().remove(&link.seg);
                parent.observable.unsubscribe(link.subscription);
                trace!(seg = %link.seg, "pruned unobserved node");
            }
        }
        node.children.lock().unwrap().clear();
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("observable", &self.observable)
            .field("children", &self.children.lock().unwrap().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collect() -> (Arc<Mutex<Vec<Option<Value>>>>, impl FnMut(Option<&Value>) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: Option<&Value>| {
            sink.lock().unwrap().push(v.cloned())
        })
    }

    #[test]
    fn test_get_never_creates() {
        let root = Node::root();
        assert!(root.get(&Seg::key("missing")).is_none());
    }

    #[test]
    fn test_upgrade_is_idempotent() {
        let root = Node::root();
        let a = root.upgrade(&Seg::key("a"));
        let b = root.upgrade(&Seg::key("a"));
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_upgrade_seeds_from_parent_value() {
        let root = Node::root();
        root.observable().next(Some(json!({"counter": 41})));

        let child = root.upgrade(&Seg::key("counter"));
        assert_eq!(child.observable().value(), Some(json!(41)));

        let missing = root.upgrade(&Seg::key("missing"));
        assert_eq!(missing.observable().value(), None);
    }

    #[test]
    fn test_child_rederives_on_parent_emission() {
        let root = Node::root();
        root.observable().next(Some(json!({"counter": 0})));
        let child = root.upgrade(&Seg::key("counter"));

        let (seen, cb) = collect();
        child.observable().subscribe(cb);

        root.observable().next(Some(json!({"counter": 1})));
        root.observable().next(Some(json!({})));

        // replay of 0, then 1, then absent
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(json!(0)), Some(json!(1)), None]
        );
    }

    #[test]
    fn test_propagation_through_two_levels() {
        let root = Node::root();
        root.observable().next(Some(json!({"clock": {"sec": 1}})));
        let clock = root.upgrade(&Seg::key("clock"));
        let sec = clock.upgrade(&Seg::key("sec"));

        let (seen, cb) = collect();
        sec.observable().subscribe(cb);

        root.observable().next(Some(json!({"clock": {"sec": 2}})));
        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1)), Some(json!(2))]);
    }

    #[test]
    fn test_prune_on_last_unsubscribe() {
        let root = Node::root();
        root.observable().next(Some(json!({"a": {"b": 1}})));
        let a = root.upgrade(&Seg::key("a"));
        let b = a.upgrade(&Seg::key("b"));

        let id = b.observable().subscribe(|_: Option<&Value>| {});
        assert!(root.get(&Seg::key("a")).is_some());
        assert!(a.get(&Seg::key("b")).is_some());

        b.observable().unsubscribe(id);

        // b detached from a, and a (now unobserved) detached from root
        assert!(a.get(&Seg::key("b")).is_none());
        assert!(root.get(&Seg::key("a")).is_none());
        assert_eq!(root.observable().len(), 0);
    }

    #[test]
    fn test_descendant_keeps_ancestors_alive() {
        let root = Node::root();
        root.observable().next(Some(json!({"a": {"b": 1}})));
        let a = root.upgrade(&Seg::key("a"));
        let b = a.upgrade(&Seg::key("b"));

        let keep = b.observable().subscribe(|_: Option<&Value>| {});
        let drop_me = a.observable().subscribe(|_: Option<&Value>| {});

        a.observable().unsubscribe(drop_me);
        // a still has b's parent-link subscriber, so the chain stays
        assert!(root.get(&Seg::key("a")).is_some());
        assert!(a.get(&Seg::key("b")).is_some());

        b.observable().unsubscribe(keep);
        assert!(root.get(&Seg::key("a")).is_none());
    }

    #[test]
    fn test_reupgrade_after_prune_sees_fresh_value() {
        let root = Node::root();
        root.observable().next(Some(json!({"counter": 1})));
        let child = root.upgrade(&Seg::key("counter"));
        let id = child.observable().subscribe(|_: Option<&Value>| {});
        child.observable().unsubscribe(id);
        assert!(root.get(&Seg::key("counter")).is_none());

        // mutate while unobserved, then re-upgrade
        root.observable().next(Some(json!({"counter": 5})));
        let fresh = root.upgrade(&Seg::key("counter"));
        assert_eq!(fresh.observable().value(), Some(json!(5)));
        assert!(!Arc::ptr_eq(&fresh, &child));
    }

    #[test]
    fn test_sibling_unaffected_by_prune() {
        let root = Node::root();
        root.observable().next(Some(json!({"a": 1, "b": 2})));
        let a = root.upgrade(&Seg::key("a"));
        let b = root.upgrade(&Seg::key("b"));

        let (seen, cb) = collect();
        b.observable().subscribe(cb);

        let id = a.observable().subscribe(|_: Option<&Value>| {});
        a.observable().unsubscribe(id);
        assert!(root.get(&Seg::key("a")).is_none());

        root.observable().next(Some(json!({"a": 1, "b": 3})));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(json!(2)), Some(json!(3))]
        );
    }

    #[test]
    fn test_index_segment_child() {
        let root = Node::root();
        root.observable().next(Some(json!({"items": ["x", "y"]})));
        let items = root.upgrade(&Seg::key("items"));
        let first = items.upgrade(&Seg::index(0));
        assert_eq!(first.observable().value(), Some(json!("x")));
    }
}
