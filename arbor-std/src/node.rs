//! # Event Nodes
//!
//! [`EventNode`] is the dispatch tree. Each node owns an ordered list of
//! listeners and a set of child nodes, and gates incoming events with its
//! filter and optional predicate.
//!
//! # Dispatch
//!
//! For every node reached by an event:
//!
//! 1. The event must belong to the node's family and pass its predicate,
//!    otherwise neither the node's listeners nor any descendant see it.
//! 2. Listeners run by descending priority, then registration order. A
//!    listener that returns an [`EventTask`](arbor_core::EventTask) is waited
//!    on before the next one runs.
//! 3. Children are visited by descending priority, then insertion order.
//!
//! A cancelled event stops the walk at the next listener or child boundary.
//! A node predicate that panics is logged and treated as a rejection.
//!
//! # Locking
//!
//! Structural changes take the node's write lock. A walk snapshots listeners
//! and children under the read lock and releases it before running anything,
//! so no lock is ever held while a listener or child runs.

use crate::dispatch::{
    DispatchContext, DispatchReport, Executor, FailureCause, InlineSpawner, park_on,
};
use arbor_core::{
    Event, EventFamily, EventFilter, EventListener, EventType, IntoTaskOutcome, ListenerId,
    ListenerPriority, PanicError, RunOutcome, TreeError,
};
use futures::{FutureExt, future::BoxFuture, task::Spawn};
use parking_lot::{Mutex, RwLock};
use std::{
    cmp::Reverse,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc, Weak,
        atomic::{AtomicI32, AtomicU64, Ordering},
    },
};

type Gate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Serializes structural changes (`add_child` / `remove_child`) across all
/// trees so the ancestor walk of the cycle check sees a stable shape.
static STRUCTURE_LOCK: Mutex<()> = Mutex::new(());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct NodeId(u64);

/// A type-erased listener as stored by a node.
trait ErasedListener: Send + Sync {
    fn id(&self) -> ListenerId;
    fn label(&self) -> &str;
    fn accepts(&self, ty: &EventType) -> bool;
    fn is_expired(&self) -> bool;
    fn run(&self, event: &mut dyn Event) -> RunOutcome;
}

impl<L: ?Sized + EventFamily> ErasedListener for EventListener<L> {
    fn id(&self) -> ListenerId {
        EventListener::id(self)
    }

    fn label(&self) -> &str {
        EventListener::label(self)
    }

    fn accepts(&self, ty: &EventType) -> bool {
        L::accepts(ty)
    }

    fn is_expired(&self) -> bool {
        EventListener::is_expired(self)
    }

    fn run(&self, event: &mut dyn Event) -> RunOutcome {
        EventListener::run(self, event)
    }
}

#[derive(Clone)]
struct ListenerSlot {
    priority: ListenerPriority,
    listener: Arc<dyn ErasedListener>,
}

/// A type-erased node as stored by its parent.
trait ErasedNode: Send + Sync {
    fn id(&self) -> NodeId;
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn event_type(&self) -> EventType;
    fn parent(&self) -> Option<Arc<dyn ErasedNode>>;
    fn has_listener(&self, ty: &EventType) -> bool;
    fn remove_listener_deep(&self, id: ListenerId) -> bool;
    fn dispatch<'a>(
        &'a self,
        event: &'a mut dyn Event,
        ctx: &'a DispatchContext<'a>,
    ) -> BoxFuture<'a, ()>;
}

struct NodeState {
    listeners: Vec<ListenerSlot>,
    children: Vec<Arc<dyn ErasedNode>>,
}

struct NodeInner<T: ?Sized> {
    id: NodeId,
    name: Arc<str>,
    event_type: EventType,
    gate: Option<Gate<T>>,
    priority: AtomicI32,
    parent: RwLock<Option<Weak<dyn ErasedNode>>>,
    state: RwLock<NodeState>,
}

/// Information about a child node, as returned by [`EventNode::children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// The child's name.
    pub name: String,
    /// The child's event family.
    pub event_type: EventType,
    /// The child's current priority.
    pub priority: i32,
}

/// A node of the dispatch tree, handling events of the family `T`.
///
/// Cloning yields another handle to the same node.
///
/// # Example
///
/// ```rust,ignore
/// let root = EventNode::all("root");
/// let creative = EventNode::filtered_for_event(
///     "creative",
///     EventFilter::<dyn PlayerEvent, ()>::for_type(),
///     |event| event.player().is_creative(),
/// );
/// root.add_child(&creative)?;
/// creative.register_handler(|join: &mut PlayerJoin| join.message = "Welcome!".into())?;
/// root.fire(&mut join);
/// ```
pub struct EventNode<T: ?Sized> {
    inner: Arc<NodeInner<T>>,
}

impl EventNode<dyn Event> {
    /// A node accepting every event, with no predicate.
    pub fn all(name: impl Into<Arc<str>>) -> Self {
        Self::for_type(name, EventFilter::all())
    }
}

impl<T: ?Sized + EventFamily> EventNode<T> {
    fn with_gate<H: 'static>(name: Arc<str>, filter: &EventFilter<T, H>, gate: Option<Gate<T>>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id: NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)),
                name,
                event_type: filter.event_type(),
                gate,
                priority: AtomicI32::new(0),
                parent: RwLock::new(None),
                state: RwLock::new(NodeState {
                    listeners: Vec::new(),
                    children: Vec::new(),
                }),
            }),
        }
    }

    /// A node for the events of `filter`'s family, with no predicate.
    pub fn for_type<H: 'static>(name: impl Into<Arc<str>>, filter: EventFilter<T, H>) -> Self {
        Self::with_gate(name.into(), &filter, None)
    }

    /// A node for the events of `filter`'s family that also satisfy
    /// `predicate`, which receives the event and the handle extracted by the
    /// filter.
    pub fn filtered_for_type<H, P>(
        name: impl Into<Arc<str>>,
        filter: EventFilter<T, H>,
        predicate: P,
    ) -> Self
    where
        H: 'static,
        P: Fn(&T, Option<H>) -> bool + Send + Sync + 'static,
    {
        let extractor = filter.clone();
        let gate: Gate<T> =
            Box::new(move |event: &T| predicate(event, extractor.get_handler(event)));
        Self::with_gate(name.into(), &filter, Some(gate))
    }

    /// Like [`filtered_for_type`](Self::filtered_for_type), but the predicate
    /// only looks at the event.
    pub fn filtered_for_event<H, P>(
        name: impl Into<Arc<str>>,
        filter: EventFilter<T, H>,
        predicate: P,
    ) -> Self
    where
        H: 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::filtered_for_type(name, filter, move |event: &T, _: Option<H>| predicate(event))
    }

    /// Like [`filtered_for_type`](Self::filtered_for_type), but the predicate
    /// only looks at the extracted handle.
    pub fn filtered_for_value<H, P>(
        name: impl Into<Arc<str>>,
        filter: EventFilter<T, H>,
        predicate: P,
    ) -> Self
    where
        H: 'static,
        P: Fn(Option<H>) -> bool + Send + Sync + 'static,
    {
        Self::filtered_for_type(name, filter, move |_: &T, handle: Option<H>| predicate(handle))
    }

    /// The node's name. Names are diagnostic only and not checked for
    /// uniqueness.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The event family this node handles.
    pub fn event_type(&self) -> EventType {
        self.inner.event_type
    }

    /// The node's priority among its siblings.
    pub fn priority(&self) -> i32 {
        self.inner.priority.load(Ordering::Acquire)
    }

    /// Changes the node's priority among its siblings. Higher runs earlier.
    pub fn set_priority(&self, priority: i32) {
        self.inner.priority.store(priority, Ordering::Release);
    }

    /// The name of the parent node, if attached.
    pub fn parent_name(&self) -> Option<String> {
        self.inner.parent().map(|parent| parent.name().to_owned())
    }

    /// The node's children in dispatch order.
    pub fn children(&self) -> Vec<NodeInfo> {
        self.inner
            .sorted_children()
            .iter()
            .map(|child| NodeInfo {
                name: child.name().to_owned(),
                event_type: child.event_type(),
                priority: child.priority(),
            })
            .collect()
    }

    /// Number of listeners registered directly on this node.
    pub fn listener_count(&self) -> usize {
        self.inner.state.read().listeners.len()
    }

    /// Attaches `child` below this node.
    ///
    /// Re-adding a child that is already attached here is a no-op.
    ///
    /// # Errors
    ///
    /// - [`TreeError::IncompatibleType`] if `C` is not part of `T`
    /// - [`TreeError::Cycle`] if `child` is this node or one of its ancestors
    /// - [`TreeError::AlreadyParented`] if `child` is attached elsewhere
    pub fn add_child<C: ?Sized + EventFamily>(&self, child: &EventNode<C>) -> Result<(), TreeError> {
        let child_type = C::event_type();
        if !T::accepts(&child_type) {
            return Err(TreeError::IncompatibleType {
                node: self.name().to_owned(),
                expected: T::event_type().name(),
                found: child_type.name(),
            });
        }

        let _structure = STRUCTURE_LOCK.lock();
        if self.is_or_descends_from(child.inner.id) {
            return Err(TreeError::Cycle {
                parent: self.name().to_owned(),
                child: child.name().to_owned(),
            });
        }
        if let Some(current) = child.inner.parent() {
            if current.id() == self.inner.id {
                return Ok(());
            }
            return Err(TreeError::AlreadyParented {
                child: child.name().to_owned(),
                current_parent: current.name().to_owned(),
            });
        }

        let erased: Arc<dyn ErasedNode> = child.inner.clone();
        self.inner.state.write().children.push(erased);
        let parent: Weak<dyn ErasedNode> = Arc::downgrade(&self.inner) as Weak<dyn ErasedNode>;
        *child.inner.parent.write() = Some(parent);
        tracing::debug!(parent = %self.inner.name, child = %child.inner.name, "attached child node");
        Ok(())
    }

    /// Detaches `child`, and with it its whole subtree.
    ///
    /// Returns `false` if `child` was not a child of this node.
    pub fn remove_child<C: ?Sized + EventFamily>(&self, child: &EventNode<C>) -> bool {
        let _structure = STRUCTURE_LOCK.lock();
        let removed = {
            let mut state = self.inner.state.write();
            let before = state.children.len();
            state.children.retain(|node| node.id() != child.inner.id);
            state.children.len() != before
        };
        if removed {
            *child.inner.parent.write() = None;
            tracing::debug!(parent = %self.inner.name, child = %child.inner.name, "detached child node");
        }
        removed
    }

    /// Registers `listener` at [`ListenerPriority::MEDIUM`].
    pub fn register_listener<L>(&self, listener: EventListener<L>) -> Result<ListenerId, TreeError>
    where
        L: ?Sized + EventFamily,
    {
        self.register_listener_with_priority(listener, ListenerPriority::MEDIUM)
    }

    /// Registers `listener` at `priority`.
    ///
    /// # Errors
    ///
    /// [`TreeError::IncompatibleType`] if `L` is not part of `T`.
    pub fn register_listener_with_priority<L>(
        &self,
        listener: EventListener<L>,
        priority: impl Into<ListenerPriority>,
    ) -> Result<ListenerId, TreeError>
    where
        L: ?Sized + EventFamily,
    {
        if !T::accepts(&L::event_type()) {
            return Err(TreeError::IncompatibleType {
                node: self.name().to_owned(),
                expected: T::event_type().name(),
                found: L::event_type().name(),
            });
        }
        Ok(self.attach_listener(listener, priority.into()))
    }

    /// Wraps `handler` in a listener and registers it at
    /// [`ListenerPriority::MEDIUM`].
    pub fn register_handler<L, F, R>(&self, handler: F) -> Result<ListenerId, TreeError>
    where
        L: ?Sized + EventFamily,
        F: Fn(&mut L) -> R + Send + Sync + 'static,
        R: IntoTaskOutcome,
    {
        self.register_listener(EventListener::of(handler))
    }

    /// Registers `listener` without checking its family against `T`.
    pub(crate) fn attach_listener<L>(&self, listener: EventListener<L>, priority: ListenerPriority) -> ListenerId
    where
        L: ?Sized + EventFamily,
    {
        let id = listener.id();
        let listener: Arc<dyn ErasedListener> = Arc::new(listener);
        let mut state = self.inner.state.write();
        // After every slot of equal or higher priority: ties keep registration order.
        let position = state
            .listeners
            .partition_point(|slot| slot.priority >= priority);
        state.listeners.insert(position, ListenerSlot { priority, listener });
        tracing::trace!(node = %self.inner.name, listener = %id, priority = priority.value(), "registered listener");
        id
    }

    /// Removes the listener with `id` from this node.
    ///
    /// Returns `false` if it is not registered here.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        self.inner.remove_listener(id)
    }

    /// Removes the listener with `id` from this node or any descendant.
    pub(crate) fn unregister_listener_deep(&self, id: ListenerId) -> bool {
        self.inner.remove_listener_deep(id)
    }

    /// Whether this node or a descendant has a live listener for events of
    /// type `ty`.
    ///
    /// Node predicates are not evaluated.
    pub fn has_listener(&self, ty: &EventType) -> bool {
        self.inner.has_listener(ty)
    }

    /// Shorthand for [`has_listener`](Self::has_listener) with `E`'s type.
    pub fn has_listener_for<E: ?Sized + EventFamily>(&self) -> bool {
        self.has_listener(&E::event_type())
    }

    /// Dispatches `event` through this node and its subtree on the calling
    /// thread.
    ///
    /// Work submitted by [`EventTask::spawn`](arbor_core::EventTask::spawn) and
    /// `resume_when_complete` runs inline. Continuations resumed from another
    /// thread block the caller until they are resolved.
    ///
    /// Listeners may fire further events from inside the walk, including from
    /// threads that are already driving another executor.
    pub fn fire(&self, event: &mut dyn Event) -> DispatchReport {
        let ctx = DispatchContext::new(Executor::Inline(InlineSpawner::default()), event.event_type());
        park_on(self.inner.dispatch(event, &ctx));
        ctx.into_report()
    }

    /// Dispatches `event` through this node and its subtree, submitting task
    /// work to `spawner`.
    pub async fn fire_with<S>(&self, event: &mut dyn Event, spawner: &S) -> DispatchReport
    where
        S: Spawn + Sync,
    {
        let ctx = DispatchContext::new(Executor::Spawner(spawner), event.event_type());
        self.inner.dispatch(event, &ctx).await;
        ctx.into_report()
    }

    fn is_or_descends_from(&self, ancestor: NodeId) -> bool {
        if self.inner.id == ancestor {
            return true;
        }
        let mut current = self.inner.parent();
        while let Some(node) = current {
            if node.id() == ancestor {
                return true;
            }
            current = node.parent();
        }
        false
    }
}

impl<T: ?Sized> NodeInner<T> {
    fn parent(&self) -> Option<Arc<dyn ErasedNode>> {
        self.parent.read().as_ref().and_then(Weak::upgrade)
    }

    fn sorted_children(&self) -> Vec<Arc<dyn ErasedNode>> {
        let mut children = self.state.read().children.clone();
        children.sort_by_key(|child| Reverse(child.priority()));
        children
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.write();
        let before = state.listeners.len();
        state.listeners.retain(|slot| slot.listener.id() != id);
        state.listeners.len() != before
    }
}

impl<T: ?Sized + EventFamily> ErasedNode for NodeInner<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn parent(&self) -> Option<Arc<dyn ErasedNode>> {
        NodeInner::parent(self)
    }

    fn has_listener(&self, ty: &EventType) -> bool {
        if !T::accepts(ty) {
            return false;
        }
        let children = {
            let state = self.state.read();
            let direct = state
                .listeners
                .iter()
                .any(|slot| !slot.listener.is_expired() && slot.listener.accepts(ty));
            if direct {
                return true;
            }
            state.children.clone()
        };
        children.iter().any(|child| child.has_listener(ty))
    }

    fn remove_listener_deep(&self, id: ListenerId) -> bool {
        if self.remove_listener(id) {
            return true;
        }
        let children = self.state.read().children.clone();
        children.iter().any(|child| child.remove_listener_deep(id))
    }

    fn dispatch<'a>(
        &'a self,
        event: &'a mut dyn Event,
        ctx: &'a DispatchContext<'a>,
    ) -> BoxFuture<'a, ()> {
        async move {
            if event.is_cancelled() {
                return;
            }
            let admitted = match (T::cast_ref(&*event), &self.gate) {
                (Some(_), None) => true,
                (Some(typed), Some(gate)) => catch_unwind(AssertUnwindSafe(|| gate(typed)))
                    .unwrap_or_else(|payload| {
                        tracing::error!(
                            node = %self.name,
                            event_type = %event.event_type(),
                            error = %PanicError::from_payload(payload),
                            "node predicate panicked, skipping subtree"
                        );
                        false
                    }),
                (None, _) => false,
            };
            if !admitted {
                tracing::trace!(node = %self.name, event_type = %event.event_type(), "event rejected by node gate");
                return;
            }

            let listeners = self.state.read().listeners.clone();
            for slot in listeners {
                let listener = &slot.listener;
                match listener.run(&mut *event) {
                    RunOutcome::Success(None) => ctx.record_success(),
                    RunOutcome::Success(Some(task)) => {
                        ctx.complete_task(listener.id(), listener.label(), task).await;
                    }
                    RunOutcome::Exception(error) => {
                        ctx.record_failure(listener.id(), listener.label(), FailureCause::Exception(error));
                    }
                    RunOutcome::Invalid | RunOutcome::Expired => {}
                }
                if listener.is_expired() && self.remove_listener(listener.id()) {
                    tracing::trace!(node = %self.name, listener = %listener.id(), "removed expired listener");
                }
                if event.is_cancelled() {
                    return;
                }
            }

            for child in self.sorted_children() {
                child.dispatch(&mut *event, ctx).await;
                if event.is_cancelled() {
                    return;
                }
            }
        }
        .boxed()
    }
}

impl<T: ?Sized> Clone for EventNode<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized + EventFamily> fmt::Debug for EventNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNode")
            .field("name", &self.inner.name)
            .field("event_type", &self.inner.event_type)
            .field("priority", &self.priority())
            .field("listeners", &self.listener_count())
            .field("children", &self.inner.state.read().children.len())
            .finish()
    }
}
