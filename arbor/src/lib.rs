//! # arbor - Hierarchical Event Dispatch
//!
//! `arbor` routes typed events through a tree of filterable nodes to
//! prioritized, expirable listeners. Events can be cancelled mid-dispatch, and
//! a listener can hand its completion off to an async task without breaking
//! the per-event ordering.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use arbor::prelude::*;
//!
//! struct Chat {
//!     message: String,
//!     cancelled: CancelState,
//! }
//!
//! impl Cancellable for Chat {
//!     fn is_cancelled(&self) -> bool { self.cancelled.is_cancelled() }
//!     fn cancel(&mut self) { self.cancelled.cancel() }
//! }
//!
//! impl Event for Chat {
//!     fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
//! }
//!
//! let manager = EventManager::new()?;
//! let owner = Owner::new("moderation");
//! manager.register_handler_with_priority(&owner, ListenerPriority::HIGH, |chat: &mut Chat| {
//!     if chat.message.contains("spam") {
//!         chat.cancel();
//!     }
//! });
//!
//! let fired = manager.fire(Chat { message: "spam!".into(), cancelled: CancelState::new() }).await?;
//! assert!(fired.event().is_cancelled());
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use arbor_core::{
    // Event model
    AsAny,
    // Errors
    BoxError,
    CancelState,
    Cancellable,
    // Async boundary
    Continuation,
    ContinuationError,
    Event,
    EventFamily,
    // Filters and listeners
    EventFilter,
    EventListener,
    EventResult,
    EventTask,
    EventType,
    FilterError,
    GenericResult,
    IntoTaskOutcome,
    ListenerBuildError,
    ListenerBuilder,
    ListenerId,
    ListenerPriority,
    ListenerResult,
    PanicError,
    ReasonedResult,
    Resulted,
    Resumed,
    Resumption,
    RunOutcome,
    TaskResult,
    TreeError,
    event_family,
};

pub use arbor_std::{
    DispatchReport, EventManager, EventManagerConfig, EventNode, FailureCause, FailurePolicy,
    FireError, Fired, ListenerFailure, ListenerHandle, ManagerError, NodeInfo, Owner,
};

/// Deadline support for fired events.
#[cfg(feature = "timeout")]
pub mod timeout {
    pub use arbor_std::timeout::fire_with_timeout;
}

/// Testing utilities.
pub mod testing {
    pub use arbor_std::testing::{CallCounter, InvocationLog};
}

/// Prelude module - common imports for Arbor.
///
/// # Usage
///
/// ```rust,ignore
/// use arbor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Event model
        CancelState,
        Cancellable,
        // Async boundary
        Continuation,
        Event,
        EventFamily,
        // Tree
        EventFilter,
        EventListener,
        EventManager,
        EventNode,
        EventResult,
        EventTask,
        GenericResult,
        ListenerPriority,
        Owner,
        ReasonedResult,
        Resulted,
        event_family,
    };
}
