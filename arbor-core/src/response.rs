//! Handler return conversion.

use crate::{error::BoxError, task::EventTask};

/// Trait for converting a listener handler's return value into its outcome.
///
/// # Default Implementations
///
/// - `()` → completed synchronously
/// - `EventTask` → completes when the task resumes its continuation
/// - `Option<EventTask>` → either of the above
/// - `Result<T, E>` → delegates to `T`, or reports the error as an exception
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned from a listener handler",
    label = "missing `IntoTaskOutcome` implementation",
    note = "Handlers may return `()`, `EventTask`, `Option<EventTask>` or a `Result` of those."
)]
pub trait IntoTaskOutcome {
    /// Convert the return value into an optional deferred task, or an error.
    fn into_task_outcome(self) -> Result<Option<EventTask>, BoxError>;
}

impl IntoTaskOutcome for () {
    fn into_task_outcome(self) -> Result<Option<EventTask>, BoxError> {
        Ok(None)
    }
}

impl IntoTaskOutcome for EventTask {
    fn into_task_outcome(self) -> Result<Option<EventTask>, BoxError> {
        Ok(Some(self))
    }
}

impl IntoTaskOutcome for Option<EventTask> {
    fn into_task_outcome(self) -> Result<Option<EventTask>, BoxError> {
        Ok(self)
    }
}

impl<T, E> IntoTaskOutcome for Result<T, E>
where
    T: IntoTaskOutcome,
    E: Into<BoxError>,
{
    fn into_task_outcome(self) -> Result<Option<EventTask>, BoxError> {
        match self {
            Ok(t) => t.into_task_outcome(),
            Err(e) => Err(e.into()),
        }
    }
}
