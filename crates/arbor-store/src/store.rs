//! The store: tree ownership and the serialized dispatch pipeline.
//!
//! Every dispatch runs to full completion (side effects, then the reducer,
//! then publication through the reactive tree) before the next one starts.
//! The pipeline is an explicit state machine: a busy flag plus a FIFO queue
//! of pending actions. A dispatch issued while another is in flight is
//! appended to the queue *at call time* (not at first poll), so handlers and
//! side effects can issue a dispatch and drop the returned future, exactly
//! like calling a promise-returning dispatch without awaiting it.

use crate::action::{Action, EffectContext, SideEffect};
use crate::error::{StoreError, StoreResult};
use crate::reducer::Reducer;
use arbor_reactive::{Node, Observer, Path, Query, Subscription, Value};
use futures::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::debug;

struct Pending {
    action: Action,
    done: oneshot::Sender<StoreResult<()>>,
}

/// The `Idle → Dispatching → Idle` state machine and its FIFO queue.
struct Schedule {
    busy: bool,
    queue: VecDeque<Pending>,
}

struct StoreInner {
    root: Arc<Node>,
    reducer: Box<dyn Reducer>,
    actions: HashMap<String, Vec<String>>,
    effects: HashMap<String, Vec<Arc<dyn SideEffect>>>,
    schedule: Mutex<Schedule>,
}

/// A reactive, path-addressable state store.
///
/// `Store` is a cheap-to-clone handle; clones share the same state tree and
/// dispatch queue. Build one from an
/// [`ActionRegistry`](crate::ActionRegistry), or from a hand-written
/// [`Reducer`] via [`Store::new`] followed by [`Store::init`].
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Build an uninitialized store around a hand-written reducer, with no
    /// named actions or side effects. Call [`init`](Store::init) before use.
    pub fn new(reducer: impl Reducer + 'static) -> Self {
        Self::with_registrations(Box::new(reducer), HashMap::new(), HashMap::new())
    }

    pub(crate) fn with_registrations(
        reducer: Box<dyn Reducer>,
        actions: HashMap<String, Vec<String>>,
        effects: HashMap<String, Vec<Arc<dyn SideEffect>>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                root: Node::root(),
                reducer,
                actions,
                effects,
                schedule: Mutex::new(Schedule {
                    busy: false,
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    /// Derive the initial state by running the reducer once with no action,
    /// then publish it as the tree value.
    ///
    /// Handlers see their slice of `initial` (or `None`, producing their
    /// default). Dispatches deferred by initialization handlers are drained
    /// before this returns.
    pub async fn init(&self, initial: Option<Value>) -> StoreResult<()> {
        self.inner.schedule.lock().unwrap().busy = true;
        let dispatch = self.handle();
        let result = match self.inner.reducer.reduce(initial, None, &dispatch).await {
            Ok(state) => {
                self.inner.root.observable().next(Some(state));
                Ok(())
            }
            Err(err) => Err(err),
        };
        self.clone().drain_queue().await;
        result
    }

    /// Build a [`Query`] rooted at this store's tree.
    ///
    /// Accepts a dotted string, a segment list, or a [`Path`].
    pub fn get(&self, path: impl Into<Path>) -> Query {
        Query::new(self.inner.root.clone(), path.into())
    }

    /// Observe the whole state value (default change detector).
    pub fn subscribe(&self, observer: impl Observer + 'static) -> Subscription {
        self.get(Path::root()).subscribe(observer)
    }

    /// Observe the whole state value with a custom change detector.
    pub fn subscribe_with<D>(&self, observer: impl Observer + 'static, detector: D) -> Subscription
    where
        D: Fn(Option<&Value>, Option<&Value>) -> bool + Send + 'static,
    {
        self.get(Path::root()).subscribe_with(observer, detector)
    }

    /// The current state value (`None` before [`init`](Store::init)).
    pub fn state(&self) -> Option<Value> {
        self.inner.root.observable().value()
    }

    /// Dispatch an action.
    ///
    /// The action joins the FIFO queue immediately, in this call. If the
    /// pipeline is idle, the returned future is the runner: polling it
    /// drains the queue (this action included), each action running to full
    /// completion (matching side effects in registration order, then the
    /// composed reducer, then publication) before the next. If a dispatch
    /// is already in flight, the future resolves once the in-flight drain
    /// reaches this action; dropping it does not cancel the action.
    ///
    /// A handler or side effect that *awaits* a dispatch it issued deadlocks
    /// (the queue only advances after it returns); issue-and-drop, or use
    /// [`Dispatch::defer`].
    pub fn dispatch(&self, action: Action) -> DispatchFuture {
        let (tx, rx) = oneshot::channel();
        let runner = {
            let mut sched = self.inner.schedule.lock().unwrap();
            sched.queue.push_back(Pending { action, done: tx });
            if sched.busy {
                false
            } else {
                sched.busy = true;
                true
            }
        };
        let driver: Option<BoxFuture<'static, ()>> =
            runner.then(|| -> BoxFuture<'static, ()> { Box::pin(self.clone().drain_queue()) });
        DispatchFuture {
            store: self.clone(),
            rx: Some(rx),
            driver,
            immediate: None,
        }
    }

    /// Dispatch a registered action by name (the `do` operation).
    ///
    /// Resolves to an unknown-action error for unregistered names.
    pub fn dispatch_named(&self, name: &str, payload: Option<Value>) -> DispatchFuture {
        match self.action(name) {
            Some(creator) => creator.dispatch(payload),
            None => DispatchFuture::failed(self.clone(), StoreError::unknown_action(name)),
        }
    }

    /// The action creator registered under `name`, if any.
    pub fn action(&self, name: &str) -> Option<ActionCreator> {
        self.inner.actions.get(name).map(|kinds| ActionCreator {
            store: self.clone(),
            name: name.to_owned(),
            kinds: kinds.clone(),
        })
    }

    /// All named action creators, sorted by name.
    pub fn actions(&self) -> Vec<ActionCreator> {
        let mut names: Vec<&String> = self.inner.actions.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| self.action(name))
            .collect()
    }

    /// All registered action names, sorted.
    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// A dispatch handle for passing into handlers and side effects.
    pub fn handle(&self) -> Dispatch {
        Dispatch {
            store: self.clone(),
        }
    }

    /// Run queued actions to completion, in order, until the queue is empty.
    async fn drain_queue(self) {
        loop {
            let pending = {
                let mut sched = self.inner.schedule.lock().unwrap();
                match sched.queue.pop_front() {
                    Some(pending) => pending,
                    None => {
                        sched.busy = false;
                        return;
                    }
                }
            };
            let result = self.run_action(&pending.action).await;
            if let Err(err) = &result {
                debug!(kind = %pending.action.kind, error = %err, "dispatch failed");
            }
            let _ = pending.done.send(result);
        }
    }

    /// One full dispatch: side effects, reducer, publish.
    async fn run_action(&self, action: &Action) -> StoreResult<()> {
        debug!(kind = %action.kind, "dispatching");
        if let Some(effects) = self.inner.effects.get(&action.kind) {
            for effect in effects.clone() {
                let ctx = EffectContext::new(self.state(), action.kind.clone(), self.handle());
                effect
                    .run(&ctx)
                    .await
                    .map_err(|source| StoreError::side_effect(&action.kind, source))?;
            }
        }

        let state = self.inner.root.observable().value();
        let dispatch = self.handle();
        let new_state = self
            .inner
            .reducer
            .reduce(state, Some(action), &dispatch)
            .await?;
        self.inner.root.observable().next(Some(new_state));
        Ok(())
    }

    /// Mark the pipeline idle after a runner future is dropped unfinished.
    fn release_pipeline(&self) {
        self.inner.schedule.lock().unwrap().busy = false;
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sched = self.inner.schedule.lock().unwrap();
        f.debug_struct("Store")
            .field("dispatching", &sched.busy)
            .field("queued", &sched.queue.len())
            .finish()
    }
}

/// Dispatch handle passed to handlers and side effects.
#[derive(Clone)]
pub struct Dispatch {
    store: Store,
}

impl Dispatch {
    /// Dispatch an action; see [`Store::dispatch`].
    pub fn dispatch(&self, action: Action) -> DispatchFuture {
        self.store.dispatch(action)
    }

    /// Dispatch a registered action by name; see [`Store::dispatch_named`].
    pub fn dispatch_named(&self, name: &str, payload: Option<Value>) -> DispatchFuture {
        self.store.dispatch_named(name, payload)
    }

    /// Issue an action and return immediately.
    ///
    /// Inside a handler or side effect a dispatch is always in flight, so
    /// the action is queued and runs, strictly after the current dispatch and
    /// in issuance order, before the in-flight dispatch's future resolves.
    /// On an idle store the action is parked until the next dispatch drains
    /// the queue.
    pub fn defer(&self, action: Action) {
        drop(self.store.dispatch(action));
    }

    /// [`defer`](Dispatch::defer) by registered name.
    ///
    /// Name resolution is immediate: unknown names error here, not later.
    pub fn defer_named(&self, name: &str, payload: Option<Value>) -> StoreResult<()> {
        match self.store.action(name) {
            Some(creator) => {
                drop(creator.dispatch(payload));
                Ok(())
            }
            None => Err(StoreError::unknown_action(name)),
        }
    }
}

/// A zero/one-argument dispatch shortcut for one registered name.
#[derive(Clone)]
pub struct ActionCreator {
    store: Store,
    name: String,
    kinds: Vec<String>,
}

impl ActionCreator {
    /// The registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The action kinds registered under this name.
    pub fn kinds(&self) -> &[String] {
        &self.kinds
    }

    /// Dispatch with no payload.
    pub fn call(&self) -> DispatchFuture {
        self.dispatch(None)
    }

    /// Dispatch with a payload.
    pub fn call_with(&self, payload: impl Into<Value>) -> DispatchFuture {
        self.dispatch(Some(payload.into()))
    }

    /// Build the action and dispatch it.
    ///
    /// A name registered under a single kind dispatches that kind with the
    /// payload as given. A name registered under several kinds requires a
    /// string payload naming one of them: that kind is dispatched (still
    /// carrying the string as payload); any other payload is an
    /// unknown-action error.
    pub fn dispatch(&self, payload: Option<Value>) -> DispatchFuture {
        match self.build(payload) {
            Ok(action) => self.store.dispatch(action),
            Err(err) => DispatchFuture::failed(self.store.clone(), err),
        }
    }

    fn build(&self, payload: Option<Value>) -> StoreResult<Action> {
        if let [kind] = self.kinds.as_slice() {
            return Ok(Action {
                kind: kind.clone(),
                payload,
            });
        }
        match payload {
            Some(Value::String(kind)) if self.kinds.iter().any(|k| *k == kind) => Ok(Action {
                payload: Some(Value::String(kind.clone())),
                kind,
            }),
            Some(Value::String(kind)) => Err(StoreError::unknown_action(kind)),
            _ => Err(StoreError::unknown_action(&self.name)),
        }
    }
}

/// Future returned by every dispatch.
///
/// Resolves with the dispatched action's outcome. When the dispatch found
/// the pipeline idle, this future is also the runner that drains the queue;
/// dropping it unfinished releases the pipeline (queued actions run on the
/// next dispatch). The action itself was enqueued when `dispatch` was
/// called and is never lost by dropping the future.
#[must_use = "the dispatch is already queued, but an idle store is only driven by polling this future"]
pub struct DispatchFuture {
    store: Store,
    rx: Option<oneshot::Receiver<StoreResult<()>>>,
    driver: Option<BoxFuture<'static, ()>>,
    immediate: Option<StoreError>,
}

impl DispatchFuture {
    fn failed(store: Store, err: StoreError) -> Self {
        Self {
            store,
            rx: None,
            driver: None,
            immediate: Some(err),
        }
    }
}

impl Future for DispatchFuture {
    type Output = StoreResult<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(err) = this.immediate.take() {
            return Poll::Ready(Err(err));
        }
        if let Some(driver) = this.driver.as_mut() {
            match driver.as_mut().poll(cx) {
                Poll::Ready(()) => this.driver = None,
                Poll::Pending => return Poll::Pending,
            }
        }
        let rx = this
            .rx
            .as_mut()
            .expect("DispatchFuture polled after completion");
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => {
                this.rx = None;
                Poll::Ready(result)
            }
            Poll::Ready(Err(_)) => {
                this.rx = None;
                Poll::Ready(Err(StoreError::Interrupted))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for DispatchFuture {
    fn drop(&mut self) {
        if self.driver.is_some() {
            self.store.release_pipeline();
        }
    }
}
