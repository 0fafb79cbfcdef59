//! # arbor-std
//!
//! Standard implementations for the Arbor hierarchical event dispatcher.
//!
//! This crate provides:
//! - **Dispatch tree**: [`EventNode`]
//! - **Dispatch results**: [`DispatchReport`], [`ListenerFailure`]
//! - **Owner-scoped facade**: [`EventManager`], configured by [`EventManagerConfig`]
//! - **Deadlines**: `timeout::fire_with_timeout` (feature `timeout`)
//! - **Test helpers**: [`testing`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core contracts
pub use arbor_core;

mod config;
mod dispatch;
mod error;
mod manager;
mod node;
pub mod testing;
#[cfg(feature = "timeout")]
pub mod timeout;

pub use config::{EventManagerConfig, FailurePolicy};
pub use dispatch::{DispatchReport, FailureCause, ListenerFailure};
pub use error::{FireError, ManagerError};
pub use manager::{EventManager, Fired, ListenerHandle, Owner};
pub use node::{EventNode, NodeInfo};
