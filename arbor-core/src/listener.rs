//! # Event Listeners
//!
//! A listener is the execution unit of the tree: a handler bound to one
//! [`EventFamily`], gated by conjunctive filters and an optional denial check,
//! and able to expire after a number of invocations or once a condition holds.
//!
//! Listeners carry no priority of their own; the priority is supplied when a
//! listener is registered on a node.
//!
//! # Run Order
//!
//! [`EventListener::run`] evaluates, in order:
//!
//! 1. already expired → [`ListenerResult::Expired`]
//! 2. denied [`Resulted`](crate::Resulted) event and `ignore_denied` unset → `Invalid`
//! 3. wrong event type, or a filter rejects → `Invalid`
//! 4. handler errors, or anything past step 1 panics → `Exception` (logged)
//! 5. otherwise `Success`, after which the expiry counters are updated

use crate::{
    error::{BoxError, ListenerBuildError, PanicError},
    event::{Event, EventFamily, EventType},
    response::IntoTaskOutcome,
    task::EventTask,
};
use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    },
};

type Predicate<L> = Box<dyn Fn(&L) -> bool + Send + Sync>;
type BoxHandler<L> = Box<dyn Fn(&mut L) -> Result<Option<EventTask>, BoxError> + Send + Sync>;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Registration priority. Higher values run earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ListenerPriority(pub i32);

impl ListenerPriority {
    /// Runs before everything else.
    pub const MAXIMUM: Self = Self(64);
    /// Runs early.
    pub const HIGH: Self = Self(32);
    /// The default.
    pub const MEDIUM: Self = Self(0);
    /// Runs late.
    pub const LOW: Self = Self(-32);
    /// Runs after everything else.
    pub const NONE: Self = Self(-64);

    /// The raw numeric value.
    pub const fn value(self) -> i32 {
        self.0
    }
}

impl From<i32> for ListenerPriority {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Process-unique identity of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The result of running a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerResult {
    /// The handler ran without error.
    Success,
    /// The event was rejected by a filter, had the wrong type, or was denied.
    Invalid,
    /// The listener has expired and will not run again.
    Expired,
    /// The handler returned an error or panicked.
    Exception,
}

/// The full outcome of [`EventListener::run`].
#[derive(Debug)]
pub enum RunOutcome {
    /// The handler ran; it may have deferred completion to a task.
    Success(Option<EventTask>),
    /// The event was not processed.
    Invalid,
    /// The listener has expired.
    Expired,
    /// The handler failed. The error has already been logged.
    Exception(BoxError),
}

impl RunOutcome {
    /// The coarse result of the run.
    pub fn result(&self) -> ListenerResult {
        match self {
            Self::Success(_) => ListenerResult::Success,
            Self::Invalid => ListenerResult::Invalid,
            Self::Expired => ListenerResult::Expired,
            Self::Exception(_) => ListenerResult::Exception,
        }
    }
}

struct ListenerInner<L: ?Sized> {
    id: ListenerId,
    label: Arc<str>,
    event_type: EventType,
    filters: Vec<Predicate<L>>,
    ignore_denied: bool,
    expire_count: Option<u32>,
    expire_when: Option<Predicate<L>>,
    handler: BoxHandler<L>,
    invocations: AtomicU32,
    expired: AtomicBool,
}

/// A filterable, expirable handler for events of family `L`.
///
/// Cloning yields another handle to the same registration record.
pub struct EventListener<L: ?Sized> {
    inner: Arc<ListenerInner<L>>,
}

impl<L: ?Sized + EventFamily> EventListener<L> {
    /// Starts building a listener for `L`.
    pub fn builder() -> ListenerBuilder<L> {
        ListenerBuilder::new()
    }

    /// A listener with no filters and no expiry.
    pub fn of<F, R>(handler: F) -> Self
    where
        F: Fn(&mut L) -> R + Send + Sync + 'static,
        R: IntoTaskOutcome,
    {
        Self::from_parts(ListenerBuilder::new(), wrap_handler(handler))
    }

    fn from_parts(builder: ListenerBuilder<L>, handler: BoxHandler<L>) -> Self {
        let id = ListenerId::next();
        let event_type = L::event_type();
        let label = builder
            .name
            .unwrap_or_else(|| format!("{}{}", event_type.name(), id).into());
        Self {
            inner: Arc::new(ListenerInner {
                id,
                label,
                event_type,
                filters: builder.filters,
                ignore_denied: builder.ignore_denied,
                expire_count: builder.expire_count,
                expire_when: builder.expire_when,
                handler,
                invocations: AtomicU32::new(0),
                expired: AtomicBool::new(false),
            }),
        }
    }

    /// Runs the listener against `event`.
    ///
    /// A panic raised by a filter, the handler or the expiry condition is
    /// reported as [`RunOutcome::Exception`].
    pub fn run(&self, event: &mut dyn Event) -> RunOutcome {
        let inner = &*self.inner;
        if inner.expired.load(Ordering::Acquire) {
            return RunOutcome::Expired;
        }
        let event_type = event.event_type();
        let outcome = catch_unwind(AssertUnwindSafe(|| inner.invoke(event)))
            .unwrap_or_else(|payload| RunOutcome::Exception(PanicError::from_payload(payload).into()));
        if let RunOutcome::Exception(error) = &outcome {
            tracing::error!(
                listener = %inner.label,
                event_type = %event_type,
                error = %error,
                "listener raised an error while handling an event"
            );
        }
        outcome
    }
}

impl<L: ?Sized + EventFamily> ListenerInner<L> {
    fn invoke(&self, event: &mut dyn Event) -> RunOutcome {
        if !self.ignore_denied && event.is_denied() {
            return RunOutcome::Invalid;
        }
        let Some(typed) = L::cast_mut(event) else {
            return RunOutcome::Invalid;
        };
        if !self.filters.iter().all(|filter| filter(&*typed)) {
            return RunOutcome::Invalid;
        }

        let task = match (self.handler)(&mut *typed) {
            Ok(task) => task,
            Err(error) => return RunOutcome::Exception(error),
        };

        let invocations = self.invocations.fetch_add(1, Ordering::AcqRel) + 1;
        let count_reached = self.expire_count.is_some_and(|count| invocations >= count);
        if count_reached || self.expire_when.as_ref().is_some_and(|when| when(&*typed)) {
            self.expired.store(true, Ordering::Release);
            tracing::trace!(listener = %self.label, invocations, "listener expired");
        }
        RunOutcome::Success(task)
    }
}

impl<L: ?Sized> EventListener<L> {
    /// The listener's identity.
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// The diagnostic label: the builder name, or the event type and id.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The event family this listener handles.
    pub fn event_type(&self) -> EventType {
        self.inner.event_type
    }

    /// Whether the listener also runs for denied events.
    pub fn ignores_denied(&self) -> bool {
        self.inner.ignore_denied
    }

    /// Number of successful invocations so far.
    pub fn invocations(&self) -> u32 {
        self.inner.invocations.load(Ordering::Acquire)
    }

    /// Whether the listener has expired.
    pub fn is_expired(&self) -> bool {
        self.inner.expired.load(Ordering::Acquire)
    }
}

impl<L: ?Sized> Clone for EventListener<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: ?Sized> fmt::Debug for EventListener<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("event_type", &self.inner.event_type)
            .field("invocations", &self.invocations())
            .field("expired", &self.is_expired())
            .finish()
    }
}

/// Builder for [`EventListener`].
///
/// # Example
///
/// ```rust,ignore
/// let listener = EventListener::<Chat>::builder()
///     .add_filter(|chat| !chat.message.is_empty())
///     .expire_count(3)
///     .handler(|chat| chat.message.make_ascii_uppercase())
///     .build()?;
/// ```
pub struct ListenerBuilder<L: ?Sized> {
    name: Option<Arc<str>>,
    filters: Vec<Predicate<L>>,
    ignore_denied: bool,
    expire_count: Option<u32>,
    invalid_expire_count: bool,
    expire_when: Option<Predicate<L>>,
    handler: Option<BoxHandler<L>>,
}

impl<L: ?Sized + EventFamily> ListenerBuilder<L> {
    fn new() -> Self {
        Self {
            name: None,
            filters: Vec::new(),
            ignore_denied: false,
            expire_count: None,
            invalid_expire_count: false,
            expire_when: None,
            handler: None,
        }
    }

    /// Sets the name used in diagnostics.
    pub fn name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a filter. All filters must pass for the handler to run.
    pub fn add_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&L) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(filter));
        self
    }

    /// Whether to run even when the event's result is denied.
    pub fn ignore_denied(mut self, ignore: bool) -> Self {
        self.ignore_denied = ignore;
        self
    }

    /// Expires the listener after `count` successful invocations.
    pub fn expire_count(mut self, count: u32) -> Self {
        self.invalid_expire_count = count == 0;
        self.expire_count = Some(count);
        self
    }

    /// Expires the listener once `condition` holds after an invocation.
    pub fn expire_when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&L) -> bool + Send + Sync + 'static,
    {
        self.expire_when = Some(Box::new(condition));
        self
    }

    /// Sets the handler.
    pub fn handler<F, R>(mut self, handler: F) -> Self
    where
        F: Fn(&mut L) -> R + Send + Sync + 'static,
        R: IntoTaskOutcome,
    {
        self.handler = Some(wrap_handler(handler));
        self
    }

    /// Builds the listener.
    pub fn build(mut self) -> Result<EventListener<L>, ListenerBuildError> {
        if self.invalid_expire_count {
            return Err(ListenerBuildError::InvalidExpireCount);
        }
        let handler = self
            .handler
            .take()
            .ok_or(ListenerBuildError::MissingHandler(L::event_type().name()))?;
        Ok(EventListener::from_parts(self, handler))
    }
}

fn wrap_handler<L, F, R>(handler: F) -> BoxHandler<L>
where
    L: ?Sized,
    F: Fn(&mut L) -> R + Send + Sync + 'static,
    R: IntoTaskOutcome,
{
    Box::new(move |event: &mut L| handler(event).into_task_outcome())
}
