//! Event filters.
//!
//! A filter pairs an [`EventFamily`] with an optional "handle" extractor.
//! Nodes use the family to gate events by type, and hand the extracted handle
//! to their predicate.

use crate::{
    error::FilterError,
    event::{Event, EventFamily, EventType},
};
use std::{fmt, sync::Arc};

type HandleGetter<E, H> = Arc<dyn Fn(&E) -> Option<H> + Send + Sync>;

/// An immutable (event type, handle extractor) pair.
///
/// # Example
///
/// ```rust,ignore
/// // Matches chat events and extracts the author.
/// let by_author = EventFilter::<Chat, String>::create(|chat| Some(chat.author.clone()));
/// ```
pub struct EventFilter<E: ?Sized, H> {
    event_type: EventType,
    handler_type: Option<&'static str>,
    getter: Option<HandleGetter<E, H>>,
}

impl EventFilter<dyn Event, ()> {
    /// The identity filter: matches every event and never extracts a handle.
    pub fn all() -> Self {
        Self::for_type()
    }
}

impl<E: ?Sized + EventFamily> EventFilter<E, ()> {
    /// A filter for the family `E` that extracts no handle.
    pub fn for_type() -> Self {
        Self {
            event_type: E::event_type(),
            handler_type: None,
            getter: None,
        }
    }
}

impl<E, H> EventFilter<E, H>
where
    E: ?Sized + EventFamily,
    H: 'static,
{
    /// A filter for the family `E` that extracts a handle with `getter`.
    pub fn create<F>(getter: F) -> Self
    where
        F: Fn(&E) -> Option<H> + Send + Sync + 'static,
    {
        Self {
            event_type: E::event_type(),
            handler_type: Some(std::any::type_name::<H>()),
            getter: Some(Arc::new(getter)),
        }
    }

    /// The event type (family) this filter matches.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// The name of the handle type, if the filter extracts one.
    pub fn handler_type(&self) -> Option<&'static str> {
        self.handler_type
    }

    /// Whether the runtime type of `event` belongs to this filter's family.
    pub fn matches(&self, event: &dyn Event) -> bool {
        E::contains(&event.event_type())
    }

    /// Extracts the handle from an event already known to be of type `E`.
    pub fn get_handler(&self, event: &E) -> Option<H> {
        self.getter.as_ref().and_then(|getter| getter(event))
    }

    /// Extracts the handle from an arbitrary event after checking its type.
    pub fn cast_handler(&self, event: &dyn Event) -> Result<Option<H>, FilterError> {
        let typed = E::cast_ref(event).ok_or_else(|| FilterError::TypeMismatch {
            expected: self.event_type.name(),
            found: event.type_name(),
        })?;
        Ok(self.get_handler(typed))
    }
}

impl<E: ?Sized, H> Clone for EventFilter<E, H> {
    fn clone(&self) -> Self {
        Self {
            event_type: self.event_type,
            handler_type: self.handler_type,
            getter: self.getter.clone(),
        }
    }
}

impl<E: ?Sized, H> fmt::Debug for EventFilter<E, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventFilter")
            .field("event_type", &self.event_type)
            .field("handler_type", &self.handler_type)
            .finish()
    }
}
