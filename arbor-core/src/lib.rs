//! # arbor-core
//!
//! Value-level contracts for the Arbor hierarchical event dispatcher.
//!
//! This crate has minimal dependencies and is meant to be imported by code
//! that defines events or listeners without needing the dispatch tree itself
//! (see `arbor-std` for that).
//!
//! # Building Blocks
//!
//! ## Events ([`Event`], [`EventFamily`])
//!
//! Events are plain values. The engine reads two optional capabilities,
//! [`Cancellable`] and [`Resulted`], and groups event types into families so a
//! node or listener bound to a family sees every member event.
//!
//! ## Filters ([`EventFilter`])
//!
//! An (event type, handle extractor) pair used to gate nodes.
//!
//! ## Listeners ([`EventListener`])
//!
//! A filterable, expirable handler. Listeners carry no priority; the
//! [`ListenerPriority`] is supplied when registering on a node.
//!
//! ## Async Boundary ([`EventTask`], [`Continuation`])
//!
//! A handler that cannot finish inline returns an [`EventTask`]; the dispatcher
//! waits for its [`Continuation`] before moving on.
//!
//! # Error Types
//!
//! - [`TreeError`] - Tree construction errors
//! - [`ContinuationError`] - Double resume
//! - [`FilterError`] - Handle cast errors
//! - [`ListenerBuildError`] - Listener builder errors

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod error;
mod event;
mod filter;
mod listener;
mod response;
mod task;

// Re-exports
pub use error::{
    BoxError, ContinuationError, FilterError, ListenerBuildError, PanicError, TreeError,
};
pub use event::{
    AsAny, CancelState, Cancellable, Event, EventFamily, EventResult, EventType, GenericResult,
    ReasonedResult, Resulted,
};
pub use filter::EventFilter;
pub use listener::{
    EventListener, ListenerBuilder, ListenerId, ListenerPriority, ListenerResult, RunOutcome,
};
pub use response::IntoTaskOutcome;
pub use task::{Continuation, EventTask, Resumed, Resumption, TaskResult};
