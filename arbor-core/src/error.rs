//! Error types for Arbor.
//!
//! Programmer misuse (cycles, re-parenting, double resumes, bad casts) is
//! reported through the enums below and returned at the call site:
//!
//! - [`TreeError`] - Tree construction and registration errors
//! - [`ContinuationError`] - Continuation misuse
//! - [`FilterError`] - Handle extraction on an event of the wrong type
//! - [`ListenerBuildError`] - Invalid listener builder state
//!
//! Errors raised *by* listeners are carried as [`BoxError`].

use thiserror::Error;

/// A boxed error type for listener-supplied errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building or mutating an event tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Adding the child would make a node its own descendant.
    #[error("adding node `{child}` to `{parent}` would create a cycle")]
    Cycle {
        /// Name of the node the child was being added to.
        parent: String,
        /// Name of the rejected child.
        child: String,
    },

    /// The node is already attached to a different parent.
    #[error("node `{child}` is already a child of `{current_parent}`")]
    AlreadyParented {
        /// Name of the rejected child.
        child: String,
        /// Name of the parent it is currently attached to.
        current_parent: String,
    },

    /// The event type of a child node or listener is not assignable to the
    /// event type of the node it is attached to.
    #[error("`{found}` is not assignable to node `{node}` of type `{expected}`")]
    IncompatibleType {
        /// Name of the receiving node.
        node: String,
        /// Event type the node accepts.
        expected: &'static str,
        /// Event type of the rejected child or listener.
        found: &'static str,
    },
}

/// Errors raised by misusing a [`Continuation`](crate::Continuation).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContinuationError {
    /// `resume` or `resume_with_error` was called after the continuation had
    /// already been resolved.
    #[error("continuation for listener `{listener}` was already resumed")]
    AlreadyResumed {
        /// Diagnostic label of the listener that owns the continuation.
        listener: String,
    },
}

/// Errors raised by [`EventFilter::cast_handler`](crate::EventFilter::cast_handler).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The event is not of the filter's event type.
    #[error("cannot cast event of type `{found}` to `{expected}`")]
    TypeMismatch {
        /// Event type of the filter.
        expected: &'static str,
        /// Runtime type of the supplied event.
        found: &'static str,
    },
}

/// Errors raised by [`ListenerBuilder::build`](crate::ListenerBuilder::build).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerBuildError {
    /// No handler was supplied.
    #[error("listener for `{0}` has no handler")]
    MissingHandler(&'static str),

    /// The expire count must be strictly positive.
    #[error("expire count must be greater than zero")]
    InvalidExpireCount,
}

/// Listener code, a node predicate or an async task panicked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("panicked: {0}")]
pub struct PanicError(pub String);

impl PanicError {
    /// Builds the error from a payload caught by `catch_unwind`.
    pub fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => *message,
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).to_owned(),
                Err(_) => "non-string panic payload".to_owned(),
            },
        };
        Self(message)
    }
}
