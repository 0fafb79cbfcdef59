//! # Event Model
//!
//! Events are plain application values. The engine imposes no identity on
//! them beyond their runtime type, and reads two optional capabilities:
//!
//! - [`Cancellable`]: a monotonic "stop propagating" flag
//! - [`Resulted`]: an allow/deny outcome that listeners read and replace
//!
//! Capabilities are surfaced through accessor methods on [`Event`] so the
//! dispatcher can query them on a `dyn Event` without knowing the concrete
//! type.
//!
//! # Event Families
//!
//! A node or listener is bound to an [`EventFamily`]: the set of runtime event
//! types it accepts, plus the downcast from `dyn Event` to the type its
//! handlers receive. Every concrete event is a family of one, `dyn Event` is
//! the family of every event, and wider groupings are declared with
//! [`event_family!`](crate::event_family).

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Object-safe access to [`Any`] for event trait objects.
///
/// Implemented for every `'static` type; never implement it by hand.
pub trait AsAny: Any {
    /// Borrows `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Borrows `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// The fully qualified name of the concrete type.
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// An application-defined value passed through the dispatch tree.
///
/// # Example
///
/// ```rust,ignore
/// struct Chat {
///     message: String,
///     cancelled: CancelState,
/// }
///
/// impl Cancellable for Chat {
///     fn is_cancelled(&self) -> bool { self.cancelled.is_cancelled() }
///     fn cancel(&mut self) { self.cancelled.cancel() }
/// }
///
/// impl Event for Chat {
///     fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `Event`",
    label = "missing `Event` implementation",
    note = "Events must be `Send + Sync + 'static` and implement `Event`."
)]
pub trait Event: AsAny + Send + Sync + 'static {
    /// Exposes the [`Cancellable`] capability, if the event has it.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }

    /// Exposes the current result of a [`Resulted`] event, if the event has one.
    fn as_resulted(&self) -> Option<&dyn EventResult> {
        None
    }
}

impl dyn Event {
    /// The runtime type descriptor of this event.
    pub fn event_type(&self) -> EventType {
        EventType {
            id: self.as_any().type_id(),
            name: self.type_name(),
        }
    }

    /// Whether the event is cancellable and has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.as_cancellable().is_some_and(|c| c.is_cancelled())
    }

    /// Whether the event carries a result that is currently denied.
    pub fn is_denied(&self) -> bool {
        self.as_resulted().is_some_and(|r| !r.is_allowed())
    }

    /// Downcasts to a concrete event type.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Downcasts to a concrete event type, mutably.
    pub fn downcast_mut<E: Event>(&mut self) -> Option<&mut E> {
        self.as_any_mut().downcast_mut::<E>()
    }
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.type_name())
            .field("cancelled", &self.is_cancelled())
            .field("denied", &self.is_denied())
            .finish()
    }
}

/// Runtime descriptor of an event type or family.
///
/// Equality and hashing use the [`TypeId`] only; the name is diagnostic.
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    /// The descriptor of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The [`TypeId`] this descriptor stands for.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The type name, for diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this descriptor stands for `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A set of runtime event types sharing one handler-facing type.
///
/// `Self` is what listeners and node predicates receive: a concrete event,
/// `dyn Event`, or a user trait object such as `dyn PlayerEvent`.
pub trait EventFamily: 'static {
    /// Descriptor of the family itself.
    fn event_type() -> EventType;

    /// Whether the runtime event type `ty` belongs to this family.
    fn contains(ty: &EventType) -> bool;

    /// Downcasts an event to the family type, if it belongs to the family.
    fn cast_ref(event: &dyn Event) -> Option<&Self>;

    /// Downcasts an event to the family type mutably, if it belongs to the family.
    fn cast_mut(event: &mut dyn Event) -> Option<&mut Self>;

    /// Whether `ty` (an event type or another family) is assignable to this
    /// family: it is either the family itself or one of its members.
    fn accepts(ty: &EventType) -> bool {
        *ty == Self::event_type() || Self::contains(ty)
    }
}

impl<E: Event> EventFamily for E {
    fn event_type() -> EventType {
        EventType::of::<E>()
    }

    fn contains(ty: &EventType) -> bool {
        ty.is::<E>()
    }

    fn cast_ref(event: &dyn Event) -> Option<&Self> {
        event.as_any().downcast_ref::<E>()
    }

    fn cast_mut(event: &mut dyn Event) -> Option<&mut Self> {
        event.as_any_mut().downcast_mut::<E>()
    }
}

impl EventFamily for dyn Event {
    fn event_type() -> EventType {
        EventType::of::<dyn Event>()
    }

    fn contains(_ty: &EventType) -> bool {
        true
    }

    fn cast_ref(event: &dyn Event) -> Option<&Self> {
        Some(event)
    }

    fn cast_mut(event: &mut dyn Event) -> Option<&mut Self> {
        Some(event)
    }
}

/// Declares a trait object as an [`EventFamily`] over a fixed set of members.
///
/// ```rust,ignore
/// pub trait PlayerEvent: Event {
///     fn player(&self) -> &str;
/// }
///
/// event_family!(dyn PlayerEvent: PlayerJoin, PlayerQuit);
///
/// let node = EventNode::<dyn PlayerEvent>::for_type("players", EventFilter::for_type());
/// ```
#[macro_export]
macro_rules! event_family {
    ($family:ty : $($member:ty),+ $(,)?) => {
        impl $crate::EventFamily for $family {
            fn event_type() -> $crate::EventType {
                $crate::EventType::of::<$family>()
            }

            fn contains(ty: &$crate::EventType) -> bool {
                false $(|| ty.is::<$member>())+
            }

            fn cast_ref(event: &dyn $crate::Event) -> ::std::option::Option<&Self> {
                let any = $crate::AsAny::as_any(event);
                $(
                    if let ::std::option::Option::Some(member) = any.downcast_ref::<$member>() {
                        return ::std::option::Option::Some(member as &Self);
                    }
                )+
                ::std::option::Option::None
            }

            fn cast_mut(event: &mut dyn $crate::Event) -> ::std::option::Option<&mut Self> {
                let any = $crate::AsAny::as_any_mut(event);
                $(
                    if any.is::<$member>() {
                        return any.downcast_mut::<$member>().map(|member| member as &mut Self);
                    }
                )+
                ::std::option::Option::None
            }
        }
    };
}

/// Capability of events that can halt further propagation.
///
/// Cancellation is monotonic: once `is_cancelled` reports `true` it must keep
/// doing so for the rest of the dispatch.
pub trait Cancellable {
    /// Whether the event has been cancelled.
    fn is_cancelled(&self) -> bool;

    /// Cancels the event.
    fn cancel(&mut self);
}

/// A monotonic cancellation flag to embed in cancellable events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelState(bool);

impl CancelState {
    /// A fresh, not-cancelled flag.
    pub const fn new() -> Self {
        Self(false)
    }

    /// Whether the flag has been set.
    pub const fn is_cancelled(&self) -> bool {
        self.0
    }

    /// Sets the flag. There is no way to clear it.
    pub fn cancel(&mut self) {
        self.0 = true;
    }
}

/// The allow/deny outcome carried by a [`Resulted`] event.
pub trait EventResult: Send + Sync {
    /// Whether the event is currently allowed.
    fn is_allowed(&self) -> bool;
}

/// Capability of events carrying a mutable allow/deny result.
pub trait Resulted {
    /// The result type.
    type Result: EventResult;

    /// The current result.
    fn result(&self) -> &Self::Result;

    /// Replaces the current result.
    fn set_result(&mut self, result: Self::Result);
}

/// A plain allowed/denied result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GenericResult {
    allowed: bool,
}

impl GenericResult {
    /// An allowed result.
    pub const fn allowed() -> Self {
        Self { allowed: true }
    }

    /// A denied result.
    pub const fn denied() -> Self {
        Self { allowed: false }
    }
}

impl Default for GenericResult {
    fn default() -> Self {
        Self::allowed()
    }
}

impl EventResult for GenericResult {
    fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// A result that, when denied, explains why.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ReasonedResult {
    /// The event is allowed.
    #[default]
    Allowed,
    /// The event is denied.
    Denied {
        /// Human-readable reason shown to whoever triggered the event.
        reason: String,
    },
}

impl ReasonedResult {
    /// A denied result with the given reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }

    /// The denial reason, if denied.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason } => Some(reason),
        }
    }
}

impl EventResult for ReasonedResult {
    fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}
