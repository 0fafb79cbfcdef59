//! Errors raised by the event manager.

use crate::dispatch::ListenerFailure;
use futures::task::SpawnError;
use std::time::Duration;
use thiserror::Error;

/// Errors resolving the future returned by
/// [`EventManager::fire`](crate::EventManager::fire).
#[derive(Error, Debug)]
pub enum FireError {
    /// The event executor refused the dispatch.
    #[error("failed to submit dispatch to the event executor: {0}")]
    Spawn(#[from] SpawnError),

    /// At least one listener failed and the manager is configured with
    /// [`FailurePolicy::FailFuture`](crate::FailurePolicy::FailFuture).
    #[error("{} listener(s) failed while handling `{event_type}`", .failures.len())]
    ListenersFailed {
        /// Runtime type of the event.
        event_type: &'static str,
        /// The failure records, in dispatch order.
        failures: Vec<ListenerFailure>,
    },

    /// The manager has been shut down.
    #[error("the event manager has been shut down")]
    ShutDown,

    /// The dispatch did not complete before the deadline.
    #[error("dispatch of `{event_type}` did not complete within {after:?}")]
    TimedOut {
        /// Runtime type of the event.
        event_type: &'static str,
        /// The deadline that elapsed.
        after: Duration,
    },
}

/// Errors creating an [`EventManager`](crate::EventManager).
#[derive(Error, Debug)]
pub enum ManagerError {
    /// The event executor thread pool could not be started.
    #[error("failed to start the event executor: {0}")]
    Executor(#[from] std::io::Error),
}
