//! Deadline helper for fired events.
//!
//! The engine never times out a dispatch on its own: a listener that never
//! resumes its continuation stalls its event forever. Producers that cannot
//! afford that race the fire future against a deadline with
//! [`fire_with_timeout`]. Listeners cannot be forcibly cancelled, so the
//! dispatch keeps running on the event executor after the deadline.

use crate::{
    error::FireError,
    manager::{EventManager, Fired},
};
use arbor_core::Event;
use std::time::Duration;
use tokio::time::timeout;

/// Fires `event` and waits at most `after` for every listener to finish.
///
/// Must be awaited inside a Tokio runtime with the time driver enabled.
pub async fn fire_with_timeout<E: Event>(
    manager: &EventManager,
    event: E,
    after: Duration,
) -> Result<Fired<E>, FireError> {
    match timeout(after, manager.fire(event)).await {
        Ok(result) => result,
        Err(_) => {
            let event_type = std::any::type_name::<E>();
            tracing::warn!(event_type, ?after, "event dispatch timed out");
            Err(FireError::TimedOut { event_type, after })
        }
    }
}
