//! Error types for registration and dispatch.

use thiserror::Error;

/// Boxed error type accepted from user handlers and side effects.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the registry and the dispatch pipeline.
///
/// Registration errors are raised synchronously at registration time;
/// dispatch-time errors resolve the failing dispatch's future.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An action with this name is already registered.
    #[error("action named {name:?} is already registered")]
    DuplicateAction {
        /// The name that was registered twice.
        name: String,
    },

    /// A handler was registered with an empty action kind list.
    #[error("registration {name:?} has an empty action kind list")]
    EmptyKinds {
        /// The offending registration's name.
        name: String,
    },

    /// A side effect was registered with an empty action kind list.
    #[error("side effect registered with an empty action kind list")]
    EffectEmptyKinds,

    /// A handler was registered with an empty selector path.
    #[error("registration {name:?} has an empty selector")]
    EmptySelector {
        /// The offending registration's name.
        name: String,
    },

    /// A selector contained an array-index segment; selectors address
    /// object keys only.
    #[error("registration {name:?} has selector {selector:?} with an index segment; selectors address object keys")]
    InvalidSelector {
        /// The offending registration's name.
        name: String,
        /// The selector as written.
        selector: String,
    },

    /// Dispatch by a name that is not in the action map, or a multi-kind
    /// creator whose payload does not select a registered kind.
    #[error("unknown action: {name:?}")]
    UnknownAction {
        /// The unresolved name.
        name: String,
    },

    /// A registered handler returned an error.
    #[error("handler {name:?} failed: {source}")]
    Handler {
        /// The registration name of the failing handler.
        name: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// A registered side effect returned an error.
    #[error("side effect for kind {kind:?} failed: {source}")]
    SideEffect {
        /// The action kind the effect ran for.
        kind: String,
        /// The effect's error.
        #[source]
        source: BoxError,
    },

    /// A queued dispatch's runner was dropped before the queue reached it.
    #[error("dispatch was interrupted before completion")]
    Interrupted,
}

impl StoreError {
    /// Create a duplicate-action error.
    #[inline]
    pub fn duplicate_action(name: impl Into<String>) -> Self {
        StoreError::DuplicateAction { name: name.into() }
    }

    /// Create an unknown-action error.
    #[inline]
    pub fn unknown_action(name: impl Into<String>) -> Self {
        StoreError::UnknownAction { name: name.into() }
    }

    /// Wrap a handler failure with its registration name.
    #[inline]
    pub fn handler(name: impl Into<String>, source: BoxError) -> Self {
        StoreError::Handler {
            name: name.into(),
            source,
        }
    }

    /// Wrap a side-effect failure with the kind it ran for.
    #[inline]
    pub fn side_effect(kind: impl Into<String>, source: BoxError) -> Self {
        StoreError::SideEffect {
            kind: kind.into(),
            source,
        }
    }
}
