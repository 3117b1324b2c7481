//! Dynamic reducer composition.
//!
//! At store-creation time the registry's entries are compiled once into an
//! ordered list of slots, `(parent keys, leaf key, handlers)`, applied by
//! a single generic read-modify-write-leaf routine. Root-level selectors
//! come first, then nested selectors grouped by parent path, both in
//! first-registration order; entries sharing one selector compose, each
//! feeding its output to the next.

use crate::action::{Action, Handler, HandlerContext};
use crate::error::{StoreError, StoreResult};
use crate::registry::Registration;
use crate::store::Dispatch;
use arbor_reactive::{get_at_path, Path, Seg};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Computes the next whole state value for a dispatch.
///
/// The store drives one reducer per dispatch: `state` is the current tree
/// value (`None` before initialization), `action` is `None` for the
/// initialization pass. [`ActionRegistry::create_store`] compiles one from
/// the registered entries; implement it directly to drive a store with a
/// hand-written reducer.
///
/// [`ActionRegistry::create_store`]: crate::ActionRegistry::create_store
#[async_trait]
pub trait Reducer: Send + Sync {
    /// Produce the new state value.
    async fn reduce(
        &self,
        state: Option<Value>,
        action: Option<&Action>,
        dispatch: &Dispatch,
    ) -> StoreResult<Value>;
}

/// A registered handler lifted to the full action-handler shape.
struct Wrapped {
    name: String,
    kinds: Vec<String>,
    handler: Arc<dyn Handler>,
}

impl Wrapped {
    /// Apply the init / pass-through / match rules for one dispatch.
    ///
    /// An absent slice is always the initialization case, even mid-stream:
    /// a handler that removed its slice re-initializes on the next dispatch.
    async fn apply(
        &self,
        slice: Option<Value>,
        action: Option<&Action>,
        dispatch: &Dispatch,
    ) -> StoreResult<Option<Value>> {
        match slice {
            None => self.invoke(None, None, None, dispatch).await,
            Some(value) => match action {
                Some(action) if self.kinds.iter().any(|k| *k == action.kind) => {
                    self.invoke(
                        Some(value),
                        action.payload.clone(),
                        Some(action.kind.clone()),
                        dispatch,
                    )
                    .await
                }
                _ => Ok(Some(value)),
            },
        }
    }

    async fn invoke(
        &self,
        slice: Option<Value>,
        payload: Option<Value>,
        kind: Option<String>,
        dispatch: &Dispatch,
    ) -> StoreResult<Option<Value>> {
        let ctx = HandlerContext {
            payload,
            kind,
            dispatch: dispatch.clone(),
        };
        self.handler
            .reduce(slice, &ctx)
            .await
            .map_err(|source| StoreError::handler(&self.name, source))
    }
}

/// One distinct selector: where to read/write, and the handlers that own it.
struct Slot {
    selector: Path,
    parent: Vec<String>,
    leaf: String,
    handlers: Vec<Wrapped>,
}

/// The reducer compiled from an [`ActionRegistry`](crate::ActionRegistry).
pub(crate) struct ComposedReducer {
    slots: Vec<Slot>,
}

impl ComposedReducer {
    /// Partition registrations into root and nested slots, composing
    /// same-selector entries in registration order.
    pub(crate) fn compile(entries: &[Registration]) -> Self {
        let mut roots: Vec<Slot> = Vec::new();
        let mut nested: Vec<(Vec<String>, Vec<Slot>)> = Vec::new();

        for entry in entries {
            let keys: Vec<String> = entry
                .selector
                .iter()
                .map(|seg| match seg {
                    Seg::Key(key) => key.clone(),
                    Seg::Index(idx) => idx.to_string(),
                })
                .collect();
            let (leaf, parent) = keys.split_last().expect("registry rejects empty selectors");
            let wrapped = Wrapped {
                name: entry.name.clone(),
                kinds: entry.kinds.clone(),
                handler: entry.handler.clone(),
            };

            let group = if parent.is_empty() {
                &mut roots
            } else {
                match nested.iter().position(|(p, _)| p.as_slice() == parent) {
                    Some(i) => &mut nested[i].1,
                    None => {
                        nested.push((parent.to_vec(), Vec::new()));
                        &mut nested.last_mut().unwrap().1
                    }
                }
            };
            match group.iter_mut().find(|slot| slot.leaf == *leaf) {
                Some(slot) => slot.handlers.push(wrapped),
                None => group.push(Slot {
                    selector: entry.selector.clone(),
                    parent: parent.to_vec(),
                    leaf: leaf.clone(),
                    handlers: vec![wrapped],
                }),
            }
        }

        let mut slots = roots;
        for (_, group) in nested {
            slots.extend(group);
        }
        ComposedReducer { slots }
    }
}

#[async_trait]
impl Reducer for ComposedReducer {
    async fn reduce(
        &self,
        state: Option<Value>,
        action: Option<&Action>,
        dispatch: &Dispatch,
    ) -> StoreResult<Value> {
        let mut state = state.unwrap_or_else(|| Value::Object(Map::new()));
        for slot in &self.slots {
            let mut slice = get_at_path(&state, &slot.selector).cloned();
            for handler in &slot.handlers {
                slice = handler.apply(slice, action, dispatch).await?;
            }
            write_leaf(&mut state, &slot.parent, &slot.leaf, slice);
        }
        Ok(state)
    }
}

/// Write (or remove, for `None`) a leaf key under a parent key path,
/// creating intermediate objects as needed. Non-object values in the way
/// are replaced by objects.
fn write_leaf(state: &mut Value, parent: &[String], leaf: &str, value: Option<Value>) {
    let mut current = state;
    for key in parent {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    let obj = current.as_object_mut().unwrap();
    match value {
        Some(v) => {
            obj.insert(leaf.to_owned(), v);
        }
        None => {
            obj.remove(leaf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::HandlerEntry;
    use serde_json::json;

    fn registration(name: &str, selector: &str) -> Registration {
        let entry = HandlerEntry::new(selector, |slice, _| slice);
        Registration {
            name: name.to_owned(),
            kinds: vec![name.to_owned()],
            selector: entry.selector,
            handler: entry.handler,
        }
    }

    #[test]
    fn test_write_leaf_at_root() {
        let mut state = json!({});
        write_leaf(&mut state, &[], "counter", Some(json!(1)));
        assert_eq!(state, json!({"counter": 1}));
    }

    #[test]
    fn test_write_leaf_creates_intermediates() {
        let mut state = json!({});
        write_leaf(
            &mut state,
            &["clock".to_owned(), "inner".to_owned()],
            "sec",
            Some(json!(59)),
        );
        assert_eq!(state, json!({"clock": {"inner": {"sec": 59}}}));
    }

    #[test]
    fn test_write_leaf_preserves_siblings() {
        let mut state = json!({"clock": {"sec": 1, "min": 2}});
        write_leaf(&mut state, &["clock".to_owned()], "sec", Some(json!(3)));
        assert_eq!(state, json!({"clock": {"sec": 3, "min": 2}}));
    }

    #[test]
    fn test_write_leaf_replaces_scalar_in_the_way() {
        let mut state = json!({"clock": 5});
        write_leaf(&mut state, &["clock".to_owned()], "sec", Some(json!(0)));
        assert_eq!(state, json!({"clock": {"sec": 0}}));
    }

    #[test]
    fn test_write_leaf_none_removes_key() {
        let mut state = json!({"counter": 1, "other": 2});
        write_leaf(&mut state, &[], "counter", None);
        assert_eq!(state, json!({"other": 2}));
    }

    #[test]
    fn test_compile_orders_roots_before_nested() {
        let entries = vec![
            registration("a", "clock.sec"),
            registration("b", "counter"),
            registration("c", "clock.min"),
            registration("d", "flag"),
        ];
        let reducer = ComposedReducer::compile(&entries);
        let selectors: Vec<String> = reducer
            .slots
            .iter()
            .map(|s| s.selector.to_string())
            .collect();
        assert_eq!(
            selectors,
            vec!["$.counter", "$.flag", "$.clock.sec", "$.clock.min"]
        );
    }

    #[test]
    fn test_compile_composes_shared_selectors() {
        let entries = vec![
            registration("first", "counter"),
            registration("second", "counter"),
        ];
        let reducer = ComposedReducer::compile(&entries);
        assert_eq!(reducer.slots.len(), 1);
        assert_eq!(reducer.slots[0].handlers.len(), 2);
        assert_eq!(reducer.slots[0].handlers[0].name, "first");
        assert_eq!(reducer.slots[0].handlers[1].name, "second");
    }

    #[test]
    fn test_compile_groups_nested_by_parent() {
        let entries = vec![
            registration("a", "clock.sec"),
            registration("b", "alarm.hour"),
            registration("c", "clock.min"),
        ];
        let reducer = ComposedReducer::compile(&entries);
        let selectors: Vec<String> = reducer
            .slots
            .iter()
            .map(|s| s.selector.to_string())
            .collect();
        // slots for one parent stay adjacent, parents in first-seen order
        assert_eq!(
            selectors,
            vec!["$.clock.sec", "$.clock.min", "$.alarm.hour"]
        );
    }
}
