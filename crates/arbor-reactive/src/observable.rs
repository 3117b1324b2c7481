//! The primitive reactive value.
//!
//! An [`Observable`] holds a current value and an ordered subscriber list.
//! It can replay its current value to new subscribers, exposes lifecycle
//! hooks (on-subscribe, on-unsubscribe, on-complete), and has an idempotent
//! terminal `complete` state.
//!
//! All methods take `&self`; internal state lives behind a mutex so the
//! primitive is `Send + Sync`. Subscriber callbacks and hooks are invoked
//! after the internal lock is released, so an observer may re-enter
//! `subscribe`/`unsubscribe`/`next` on the same observable.

use serde_json::Value;
use std::sync::{Arc, Mutex};

/// A consumer of observable emissions.
///
/// Implemented for any `FnMut(Option<&Value>)` closure; implement the trait
/// directly when a `complete` notification is needed.
pub trait Observer: Send {
    /// Receive the next value. `None` means the observed location is absent.
    fn next(&mut self, value: Option<&Value>);

    /// The observable has terminated; no further `next` calls will follow.
    fn complete(&mut self) {}
}

impl<F: FnMut(Option<&Value>) + Send> Observer for F {
    fn next(&mut self, value: Option<&Value>) {
        self(value)
    }
}

/// Identifies one subscription on one [`Observable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type SharedObserver = Arc<Mutex<dyn Observer>>;
type SubscribeHook = Arc<Mutex<dyn FnMut(SubscriberId) + Send>>;
type UnsubscribeHook = Arc<Mutex<dyn FnMut() + Send>>;
type CompleteHook = Box<dyn FnOnce() + Send>;

struct Inner {
    value: Option<Value>,
    replay_on_subscribe: bool,
    is_complete: bool,
    next_id: u64,
    subscribers: Vec<(SubscriberId, SharedObserver)>,
    on_subscribe: Vec<SubscribeHook>,
    on_unsubscribe: Vec<UnsubscribeHook>,
    on_complete: Vec<CompleteHook>,
}

/// A reactive value with subscribers and lifecycle hooks.
///
/// # Examples
///
/// ```
/// use arbor_reactive::Observable;
/// use serde_json::json;
/// use std::sync::{Arc, Mutex};
///
/// let obs = Observable::new(Some(json!(0)), true);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// let id = obs.subscribe(move |v: Option<&serde_json::Value>| {
///     sink.lock().unwrap().push(v.cloned());
/// });
/// obs.next(Some(json!(1)));
/// obs.unsubscribe(id);
/// obs.next(Some(json!(2)));
///
/// // replay delivered 0, then 1; 2 arrived after unsubscribe
/// assert_eq!(seen.lock().unwrap().len(), 2);
/// ```
pub struct Observable {
    inner: Mutex<Inner>,
}

impl Observable {
    /// Create an observable with an initial value.
    ///
    /// When `replay_on_subscribe` is set, each new subscriber is immediately
    /// invoked with the current value.
    pub fn new(initial: Option<Value>, replay_on_subscribe: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: initial,
                replay_on_subscribe,
                is_complete: false,
                next_id: 0,
                subscribers: Vec::new(),
                on_subscribe: Vec::new(),
                on_unsubscribe: Vec::new(),
                on_complete: Vec::new(),
            }),
        }
    }

    /// Append an observer; returns the id used to unsubscribe it.
    ///
    /// If the observable replays and is not complete, the new observer is
    /// invoked with the current value before any on-subscribe hook fires.
    pub fn subscribe(&self, observer: impl Observer + 'static) -> SubscriberId {
        let shared: SharedObserver = Arc::new(Mutex::new(observer));
        let (id, replay, hooks) = {
            let mut inner = self.inner.lock().unwrap();
            let id = SubscriberId(inner.next_id);
            inner.next_id += 1;
            inner.subscribers.push((id, shared.clone()));
            let replay = if inner.replay_on_subscribe && !inner.is_complete {
                Some(inner.value.clone())
            } else {
                None
            };
            (id, replay, inner.on_subscribe.clone())
        };
        if let Some(value) = replay {
            shared.lock().unwrap().next(value.as_ref());
        }
        for hook in hooks {
            (hook.lock().unwrap())(id);
        }
        id
    }

    /// Remove the observer with the given id.
    ///
    /// On-unsubscribe hooks fire only if a subscriber was actually removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let hooks = {
            let mut inner = self.inner.lock().unwrap();
            let before = inner.subscribers.len();
            inner.subscribers.retain(|(sid, _)| *sid != id);
            if inner.subscribers.len() == before {
                return false;
            }
            inner.on_unsubscribe.clone()
        };
        for hook in hooks {
            (hook.lock().unwrap())();
        }
        true
    }

    /// Store `value` as current and emit it to every observer in
    /// subscription order. No-op once complete.
    ///
    /// Observers are notified from a snapshot of the subscriber list, so an
    /// unsubscribe performed by an earlier observer does not suppress the
    /// delivery already in flight to a later one.
    pub fn next(&self, value: Option<Value>) {
        let snapshot = {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_complete {
                return;
            }
            inner.value = value.clone();
            inner
                .subscribers
                .iter()
                .map(|(_, obs)| obs.clone())
                .collect::<Vec<_>>()
        };
        for observer in snapshot {
            observer.lock().unwrap().next(value.as_ref());
        }
    }

    /// Terminate the observable. Idempotent.
    ///
    /// The first call notifies every observer's `complete`, invokes and
    /// clears the on-complete hooks, then clears all subscriber and hook
    /// lists. Observers never receive `next` after this.
    pub fn complete(&self) {
        let (subscribers, complete_hooks) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.is_complete {
                return;
            }
            inner.is_complete = true;
            inner.on_subscribe.clear();
            inner.on_unsubscribe.clear();
            (
                std::mem::take(&mut inner.subscribers),
                std::mem::take(&mut inner.on_complete),
            )
        };
        for (_, observer) in subscribers {
            observer.lock().unwrap().complete();
        }
        for hook in complete_hooks {
            hook();
        }
    }

    /// The last value stored by `next` (or the initial value).
    pub fn value(&self) -> Option<Value> {
        self.inner.lock().unwrap().value.clone()
    }

    /// The number of current subscribers.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    /// Whether there are no current subscribers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `complete` has been called.
    pub fn is_complete(&self) -> bool {
        self.inner.lock().unwrap().is_complete
    }

    /// Register a hook invoked with each new subscriber's id.
    /// No-op after completion.
    pub fn on_subscribe(&self, hook: impl FnMut(SubscriberId) + Send + 'static) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_complete {
            return;
        }
        inner.on_subscribe.push(Arc::new(Mutex::new(hook)));
    }

    /// Register a hook invoked after each effective unsubscribe.
    /// No-op after completion.
    pub fn on_unsubscribe(&self, hook: impl FnMut() + Send + 'static) {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_complete {
            return;
        }
        inner.on_unsubscribe.push(Arc::new(Mutex::new(hook)));
    }

    /// Register a hook invoked once when the observable completes.
    ///
    /// Registered after completion, the hook is invoked immediately instead
    /// of being queued.
    pub fn on_complete(&self, hook: impl FnOnce() + Send + 'static) {
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.is_complete {
                inner.on_complete.push(Box::new(hook));
                return;
            }
        }
        hook();
    }
}

impl Default for Observable {
    fn default() -> Self {
        Self::new(None, false)
    }
}

impl std::fmt::Debug for Observable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Observable")
            .field("value", &inner.value)
            .field("subscribers", &inner.subscribers.len())
            .field("is_complete", &inner.is_complete)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recorder() -> (Arc<Mutex<Vec<Option<Value>>>>, impl FnMut(Option<&Value>) + Send) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: Option<&Value>| {
            sink.lock().unwrap().push(v.cloned())
        })
    }

    #[test]
    fn test_next_updates_value_and_notifies() {
        let obs = Observable::new(None, false);
        let (seen, cb) = recorder();
        obs.subscribe(cb);

        obs.next(Some(json!(1)));
        obs.next(Some(json!(2)));

        assert_eq!(obs.value(), Some(json!(2)));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(json!(1)), Some(json!(2))]
        );
    }

    #[test]
    fn test_replay_on_subscribe() {
        let obs = Observable::new(Some(json!("initial")), true);
        let (seen, cb) = recorder();
        obs.subscribe(cb);

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!("initial"))]);
    }

    #[test]
    fn test_no_replay_when_disabled() {
        let obs = Observable::new(Some(json!("initial")), false);
        let (seen, cb) = recorder();
        obs.subscribe(cb);

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let obs = Observable::new(None, false);
        let (seen, cb) = recorder();
        let id = obs.subscribe(cb);

        obs.next(Some(json!(1)));
        assert!(obs.unsubscribe(id));
        obs.next(Some(json!(2)));

        assert_eq!(*seen.lock().unwrap(), vec![Some(json!(1))]);
        assert_eq!(obs.len(), 0);
    }

    #[test]
    fn test_unsubscribe_unknown_id_is_false_and_silent() {
        let obs = Observable::new(None, false);
        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        obs.on_unsubscribe(move || *counter.lock().unwrap() += 1);

        let id = obs.subscribe(|_: Option<&Value>| {});
        assert!(obs.unsubscribe(id));
        assert!(!obs.unsubscribe(id));

        // hook fired only for the effective removal
        assert_eq!(*fired.lock().unwrap(), 1);
    }

    #[test]
    fn test_subscription_order_preserved() {
        let obs = Observable::new(None, false);
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            obs.subscribe(move |_: Option<&Value>| order.lock().unwrap().push(tag));
        }
        obs.next(Some(json!(())));

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_complete_is_idempotent_and_terminal() {
        let obs = Observable::new(Some(json!(1)), false);
        let completions = Arc::new(Mutex::new(0));

        struct Completer(Arc<Mutex<u32>>, Arc<Mutex<Vec<Option<Value>>>>);
        impl Observer for Completer {
            fn next(&mut self, value: Option<&Value>) {
                self.1.lock().unwrap().push(value.cloned());
            }
            fn complete(&mut self) {
                *self.0.lock().unwrap() += 1;
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        obs.subscribe(Completer(completions.clone(), seen.clone()));

        obs.complete();
        obs.complete();
        obs.next(Some(json!(2)));

        assert_eq!(*completions.lock().unwrap(), 1);
        assert!(seen.lock().unwrap().is_empty());
        assert!(obs.is_complete());
        assert_eq!(obs.len(), 0);
        // value is frozen at completion time
        assert_eq!(obs.value(), Some(json!(1)));
    }

    #[test]
    fn test_on_complete_after_completion_runs_immediately() {
        let obs = Observable::new(None, false);
        obs.complete();

        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        obs.on_complete(move || *flag.lock().unwrap() = true);

        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_hooks_after_completion_are_ignored() {
        let obs = Observable::new(None, true);
        obs.complete();

        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        obs.on_subscribe(move |_| *flag.lock().unwrap() = true);

        obs.subscribe(|_: Option<&Value>| {});
        assert!(!*fired.lock().unwrap());
    }

    #[test]
    fn test_on_subscribe_hook_receives_id() {
        let obs = Observable::new(None, false);
        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = ids.clone();
        obs.on_subscribe(move |id| sink.lock().unwrap().push(id));

        let id = obs.subscribe(|_: Option<&Value>| {});
        assert_eq!(*ids.lock().unwrap(), vec![id]);
    }

    #[test]
    fn test_replay_fires_before_on_subscribe_hook() {
        let obs = Observable::new(Some(json!(7)), true);
        let order = Arc::new(Mutex::new(Vec::new()));

        let hook_order = order.clone();
        obs.on_subscribe(move |_| hook_order.lock().unwrap().push("hook"));

        let next_order = order.clone();
        obs.subscribe(move |_: Option<&Value>| next_order.lock().unwrap().push("next"));

        assert_eq!(*order.lock().unwrap(), vec!["next", "hook"]);
    }

    #[test]
    fn test_reentrant_unsubscribe_from_callback() {
        // An observer that unsubscribes itself on first delivery must not
        // deadlock, and must not be notified again.
        let obs = Arc::new(Observable::new(None, false));
        let seen = Arc::new(Mutex::new(0));

        let obs_handle = obs.clone();
        let count = seen.clone();
        let id_slot: Arc<Mutex<Option<SubscriberId>>> = Arc::new(Mutex::new(None));
        let slot = id_slot.clone();
        let id = obs.subscribe(move |_: Option<&Value>| {
            *count.lock().unwrap() += 1;
            if let Some(id) = *slot.lock().unwrap() {
                obs_handle.unsubscribe(id);
            }
        });
        *id_slot.lock().unwrap() = Some(id);

        obs.next(Some(json!(1)));
        obs.next(Some(json!(2)));

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
