//! Event manager configuration.

use std::{num::NonZeroUsize, time::Duration};

/// What the future returned by [`EventManager::fire`](crate::EventManager::fire)
/// does when listeners fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The future succeeds; failures are listed in the
    /// [`Fired`](crate::Fired) value.
    #[default]
    Report,
    /// The future fails with
    /// [`FireError::ListenersFailed`](crate::FireError::ListenersFailed) once
    /// every listener is accounted for.
    FailFuture,
}

/// Configuration for [`EventManager`](crate::EventManager).
///
/// # Example
///
/// ```rust,ignore
/// let config = EventManagerConfig::new()
///     .with_pool_size(2)
///     .with_failure_policy(FailurePolicy::FailFuture);
/// let manager = EventManager::with_config(config)?;
/// ```
#[derive(Debug, Clone)]
pub struct EventManagerConfig {
    /// Number of event executor threads.
    pub pool_size: usize,
    /// Name prefix for event executor threads.
    pub thread_name_prefix: String,
    /// How listener failures surface through `fire`.
    pub failure_policy: FailurePolicy,
    /// How long [`EventManager::shutdown`](crate::EventManager::shutdown)
    /// waits for in-flight dispatches.
    pub shutdown_timeout: Duration,
}

impl Default for EventManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManagerConfig {
    /// Default configuration: one executor thread per available core.
    pub fn new() -> Self {
        Self {
            pool_size: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name_prefix: "arbor-event-executor-".to_owned(),
            failure_policy: FailurePolicy::Report,
            shutdown_timeout: Duration::from_secs(10),
        }
    }

    /// Set the number of executor threads. Zero is treated as one.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Set the executor thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set how long shutdown waits for in-flight dispatches.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
