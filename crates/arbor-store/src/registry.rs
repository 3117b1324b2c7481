//! Registration of action handlers and side effects.
//!
//! The registry is the setup surface: handlers and side effects are
//! registered up front, then compiled into one composed reducer when the
//! store is created. Registration errors are raised here, synchronously,
//! never deferred to dispatch time.

use crate::action::{ActionKinds, Handler, HandlerEntry, SideEffect};
use crate::error::{StoreError, StoreResult};
use crate::reducer::ComposedReducer;
use crate::store::Store;
use arbor_reactive::{Path, Seg};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A resolved registration, stored in order.
pub(crate) struct Registration {
    pub(crate) name: String,
    pub(crate) kinds: Vec<String>,
    pub(crate) selector: Path,
    pub(crate) handler: Arc<dyn Handler>,
}

/// Registry of action handlers and side effects.
///
/// # Examples
///
/// ```
/// use arbor_store::{ActionRegistry, HandlerEntry};
/// use serde_json::json;
///
/// let mut registry = ActionRegistry::new();
/// registry
///     .register("increment", "increment", HandlerEntry::new("counter", |slice, _| {
///         match slice {
///             None => Some(json!(0)),
///             Some(v) => Some(json!(v.as_i64().unwrap_or(0) + 1)),
///         }
///     }))
///     .unwrap();
///
/// // the same name cannot be registered twice
/// let err = registry
///     .register("increment", "other", HandlerEntry::new("counter", |slice, _| slice))
///     .unwrap_err();
/// assert!(err.to_string().contains("already registered"));
/// ```
#[derive(Default)]
pub struct ActionRegistry {
    entries: Vec<Registration>,
    names: HashMap<String, Vec<String>>,
    kinds: HashSet<String>,
    effects: HashMap<String, Vec<Arc<dyn SideEffect>>>,
    synthetic: u64,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler entry under `name` for one or more action kinds.
    ///
    /// `kinds` accepts a single string or a list. Multiple registrations may
    /// share a kind (all run per dispatch) or a selector (their handlers
    /// compose in registration order). Fails on a duplicate `name`, an empty
    /// kind list, or a malformed selector.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kinds: impl Into<ActionKinds>,
        entry: HandlerEntry,
    ) -> StoreResult<()> {
        self.insert(name.into(), kinds.into(), entry)
    }

    /// Register a handler entry that is only reachable through its name.
    ///
    /// A synthetic action kind is generated from a registry-scoped counter,
    /// skipping any collision with kinds registered so far, so the result is
    /// deterministic and independent of registration order.
    pub fn register_default(
        &mut self,
        name: impl Into<String>,
        entry: HandlerEntry,
    ) -> StoreResult<()> {
        let kind = self.next_synthetic_kind();
        self.insert(name.into(), ActionKinds(vec![kind]), entry)
    }

    /// Register a side effect for one or more action kinds.
    ///
    /// All effects registered for a kind run, in registration order, before
    /// the reducer handles that kind.
    pub fn side_effect(
        &mut self,
        kinds: impl Into<ActionKinds>,
        effect: impl SideEffect + 'static,
    ) -> StoreResult<()> {
        let kinds = kinds.into();
        if kinds.is_empty() {
            return Err(StoreError::EffectEmptyKinds);
        }
        let effect: Arc<dyn SideEffect> = Arc::new(effect);
        for kind in kinds.0 {
            self.effects.entry(kind).or_default().push(effect.clone());
        }
        Ok(())
    }

    /// The number of registered handler entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handler entries are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The kinds registered under `name`, if any.
    pub fn kinds_for(&self, name: &str) -> Option<&[String]> {
        self.names.get(name).map(Vec::as_slice)
    }

    /// Compile the registrations and build an initialized store.
    ///
    /// The composed reducer runs once with `state = initial` and no action,
    /// letting every handler whose slice is absent produce its default.
    pub async fn create_store(&self, initial: Option<Value>) -> StoreResult<Store> {
        let reducer = ComposedReducer::compile(&self.entries);
        let store =
            Store::with_registrations(Box::new(reducer), self.names.clone(), self.effects.clone());
        store.init(initial).await?;
        Ok(store)
    }

    fn insert(&mut self, name: String, kinds: ActionKinds, entry: HandlerEntry) -> StoreResult<()> {
        if self.names.contains_key(&name) {
            return Err(StoreError::duplicate_action(name));
        }
        if kinds.is_empty() {
            return Err(StoreError::EmptyKinds { name });
        }
        if entry.selector.is_empty() {
            return Err(StoreError::EmptySelector { name });
        }
        if entry.selector.iter().any(|seg| matches!(seg, Seg::Index(_))) {
            return Err(StoreError::InvalidSelector {
                name,
                selector: entry.selector.to_string(),
            });
        }

        let kinds = kinds.0;
        debug!(name = %name, kinds = ?kinds, selector = %entry.selector, "registered action handler");
        self.names.insert(name.clone(), kinds.clone());
        self.kinds.extend(kinds.iter().cloned());
        self.entries.push(Registration {
            name,
            kinds,
            selector: entry.selector,
            handler: entry.handler,
        });
        Ok(())
    }

    fn next_synthetic_kind(&mut self) -> String {
        loop {
            let candidate = format!("__arbor/{}", self.synthetic);
            self.synthetic += 1;
            if !self.kinds.contains(&candidate) {
                return candidate;
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("entries", &self.entries.len())
            .field("kinds", &self.kinds.len())
            .finish()
    }
}
