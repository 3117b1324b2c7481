//! Actions, handler registrations, and side effects.
//!
//! An [`Action`] is the unit of intent: a kind string plus an optional
//! payload. State transitions are described by [`HandlerEntry`] values: a
//! selector path into the state tree plus a [`Handler`] that produces the
//! new value for that slice. [`SideEffect`]s observe dispatches without
//! owning state.

use crate::error::BoxError;
use crate::store::Dispatch;
use arbor_reactive::{Getter, Path};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A dispatched action: a kind string and an optional payload.
///
/// Serializes with the conventional `"type"` field name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The action kind (the `type` field on the wire).
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload delivered to matching handlers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl Action {
    /// Create an action with no payload.
    #[inline]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: None,
        }
    }

    /// Attach a payload (builder pattern).
    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// One or more action kinds named at registration time.
///
/// Converts from a single string or a list, so `register` accepts either
/// shape without runtime argument sniffing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionKinds(pub(crate) Vec<String>);

impl ActionKinds {
    /// The kinds in registration order.
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Whether no kinds were named.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ActionKinds {
    fn from(kind: &str) -> Self {
        ActionKinds(vec![kind.to_owned()])
    }
}

impl From<String> for ActionKinds {
    fn from(kind: String) -> Self {
        ActionKinds(vec![kind])
    }
}

impl From<Vec<String>> for ActionKinds {
    fn from(kinds: Vec<String>) -> Self {
        ActionKinds(kinds)
    }
}

impl From<Vec<&str>> for ActionKinds {
    fn from(kinds: Vec<&str>) -> Self {
        ActionKinds(kinds.into_iter().map(str::to_owned).collect())
    }
}

impl From<&[&str]> for ActionKinds {
    fn from(kinds: &[&str]) -> Self {
        ActionKinds(kinds.iter().map(|k| (*k).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ActionKinds {
    fn from(kinds: [&str; N]) -> Self {
        kinds.as_slice().into()
    }
}

/// Context passed to a [`Handler`] invocation.
pub struct HandlerContext {
    /// The matched action's payload. `None` in the initialization case.
    pub payload: Option<Value>,
    /// The matched action's kind. `None` in the initialization case.
    pub kind: Option<String>,
    /// Dispatch handle; dispatches issued here are deferred until the
    /// current dispatch completes.
    pub dispatch: Dispatch,
}

/// Produces the new value of one selector slice.
///
/// A handler owns nothing but its slice: it receives the current value at
/// its selector (`None` when absent, which is also the initialization
/// case, where it should return its default) and returns the new value.
/// Returning `None` removes the slice, so the next dispatch re-initializes
/// it.
///
/// Synchronous handlers are written as plain closures via
/// [`HandlerEntry::new`]; implement this trait directly for async or
/// stateful handlers.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Compute the new slice value.
    async fn reduce(
        &self,
        slice: Option<Value>,
        ctx: &HandlerContext,
    ) -> Result<Option<Value>, BoxError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(Option<Value>, &HandlerContext) -> Option<Value> + Send + Sync,
{
    async fn reduce(
        &self,
        slice: Option<Value>,
        ctx: &HandlerContext,
    ) -> Result<Option<Value>, BoxError> {
        Ok((self.0)(slice, ctx))
    }
}

struct TryFnHandler<F>(F);

#[async_trait]
impl<F> Handler for TryFnHandler<F>
where
    F: Fn(Option<Value>, &HandlerContext) -> Result<Option<Value>, BoxError> + Send + Sync,
{
    async fn reduce(
        &self,
        slice: Option<Value>,
        ctx: &HandlerContext,
    ) -> Result<Option<Value>, BoxError> {
        (self.0)(slice, ctx)
    }
}

/// A selector path paired with the handler responsible for it.
///
/// # Examples
///
/// ```
/// use arbor_store::HandlerEntry;
/// use serde_json::json;
///
/// let entry = HandlerEntry::new("counter", |slice, _ctx| {
///     let current = slice.and_then(|v| v.as_i64()).unwrap_or(0);
///     Some(json!(current + 1))
/// });
/// assert_eq!(entry.selector().to_string(), "$.counter");
/// ```
pub struct HandlerEntry {
    pub(crate) selector: Path,
    pub(crate) handler: Arc<dyn Handler>,
}

impl HandlerEntry {
    /// Entry with a synchronous, infallible handler closure (the common
    /// case).
    pub fn new<F>(selector: impl Into<Path>, handler: F) -> Self
    where
        F: Fn(Option<Value>, &HandlerContext) -> Option<Value> + Send + Sync + 'static,
    {
        Self::with_handler(selector, FnHandler(handler))
    }

    /// Entry with a synchronous, fallible handler closure.
    pub fn try_new<F>(selector: impl Into<Path>, handler: F) -> Self
    where
        F: Fn(Option<Value>, &HandlerContext) -> Result<Option<Value>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self::with_handler(selector, TryFnHandler(handler))
    }

    /// Entry with any [`Handler`] implementation (async and/or stateful).
    pub fn with_handler(selector: impl Into<Path>, handler: impl Handler + 'static) -> Self {
        Self {
            selector: selector.into(),
            handler: Arc::new(handler),
        }
    }

    /// The selector this entry owns.
    #[inline]
    pub fn selector(&self) -> &Path {
        &self.selector
    }
}

impl std::fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("selector", &self.selector)
            .finish()
    }
}

/// Context passed to a [`SideEffect`] invocation.
pub struct EffectContext {
    state: Option<Value>,
    /// The dispatched action's kind.
    pub kind: String,
    /// Dispatch handle; dispatches issued here are deferred until the
    /// current dispatch completes.
    pub dispatch: Dispatch,
}

impl EffectContext {
    pub(crate) fn new(state: Option<Value>, kind: String, dispatch: Dispatch) -> Self {
        Self {
            state,
            kind,
            dispatch,
        }
    }

    /// Read-only view over the state snapshot taken when the effect ran
    /// (before the reducer applied the triggering action).
    pub fn state(&self) -> Getter<'_> {
        Getter::from_option(self.state.as_ref())
    }
}

/// Observes dispatches of registered kinds before the reducer runs.
///
/// Side effects never own state; they read the pre-reduction snapshot and
/// may issue (deferred) dispatches of their own.
#[async_trait]
pub trait SideEffect: Send + Sync {
    /// Run the effect for one dispatch.
    async fn run(&self, ctx: &EffectContext) -> Result<(), BoxError>;
}

struct FnSideEffect<F>(F);

#[async_trait]
impl<F> SideEffect for FnSideEffect<F>
where
    F: Fn(&EffectContext) + Send + Sync,
{
    async fn run(&self, ctx: &EffectContext) -> Result<(), BoxError> {
        (self.0)(ctx);
        Ok(())
    }
}

/// Wrap a synchronous, infallible closure as a [`SideEffect`].
pub fn effect_fn<F>(f: F) -> impl SideEffect
where
    F: Fn(&EffectContext) + Send + Sync + 'static,
{
    FnSideEffect(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_builder() {
        let action = Action::new("increment").with_payload(json!(2));
        assert_eq!(action.kind, "increment");
        assert_eq!(action.payload, Some(json!(2)));
    }

    #[test]
    fn test_action_serde_uses_type_field() {
        let action = Action::new("increment").with_payload(json!(1));
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({"type": "increment", "payload": 1}));

        let parsed: Action = serde_json::from_value(json!({"type": "decrement"})).unwrap();
        assert_eq!(parsed, Action::new("decrement"));
    }

    #[test]
    fn test_action_kinds_conversions() {
        assert_eq!(ActionKinds::from("a").as_slice(), &["a".to_owned()]);
        assert_eq!(
            ActionKinds::from(vec!["a", "b"]).as_slice(),
            &["a".to_owned(), "b".to_owned()]
        );
        assert_eq!(ActionKinds::from(["a", "b"]).as_slice().len(), 2);
        assert!(ActionKinds::from(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_handler_entry_selector_parsing() {
        let entry = HandlerEntry::new("clock.sec", |slice, _| slice);
        assert_eq!(entry.selector().len(), 2);
    }
}
