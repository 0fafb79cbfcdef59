//! # Event Manager
//!
//! The owner-scoped facade over a dispatch tree. Listeners are registered on
//! behalf of an [`Owner`] (a plugin, a subsystem) so they can be removed in
//! bulk, and events are fired on a dedicated thread pool, the "event
//! executor".
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = EventManager::new()?;
//! let plugin = Owner::new("greeter");
//!
//! manager.register_handler(&plugin, |join: &mut PlayerJoin| {
//!     join.message = format!("Welcome, {}!", join.name);
//! });
//!
//! let fired = manager.fire(PlayerJoin::new("alex")).await?;
//! assert_eq!(fired.event().message, "Welcome, alex!");
//!
//! manager.unregister_listeners(&plugin);
//! ```

use crate::{
    config::{EventManagerConfig, FailurePolicy},
    dispatch::{DispatchReport, ListenerFailure},
    error::{FireError, ManagerError},
    node::EventNode,
};
use arbor_core::{
    Event, EventFamily, EventListener, EventType, IntoTaskOutcome, ListenerId, ListenerPriority,
};
use futures::{
    FutureExt,
    executor::ThreadPool,
    future::{self, BoxFuture},
    task::SpawnExt,
};
use parking_lot::{Condvar, Mutex};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Identity that listeners are registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner(Arc<str>);

impl Owner {
    /// Creates an owner identity.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// The owner's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Owner {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Owner {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one registration, used with [`EventManager::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(ListenerId);

impl ListenerHandle {
    /// The registered listener's identity.
    pub fn id(&self) -> ListenerId {
        self.0
    }
}

/// A completed dispatch: the mutated event and what happened to it.
#[derive(Debug)]
pub struct Fired<E> {
    event: E,
    report: DispatchReport,
}

impl<E> Fired<E> {
    fn new(event: E, report: DispatchReport) -> Self {
        Self { event, report }
    }

    /// The event after every listener has run.
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Consumes `self`, returning the event.
    pub fn into_event(self) -> E {
        self.event
    }

    /// The dispatch report.
    pub fn report(&self) -> &DispatchReport {
        &self.report
    }

    /// Listeners that failed, in dispatch order.
    pub fn failures(&self) -> &[ListenerFailure] {
        self.report.failures()
    }

    /// Consumes `self`, returning the event and the report.
    pub fn into_parts(self) -> (E, DispatchReport) {
        (self.event, self.report)
    }

    fn apply(self, policy: FailurePolicy) -> Result<Self, FireError> {
        match policy {
            FailurePolicy::FailFuture if !self.report.is_clean() => {
                Err(FireError::ListenersFailed {
                    event_type: std::any::type_name::<E>(),
                    failures: self.report.into_failures(),
                })
            }
            _ => Ok(self),
        }
    }
}

/// Counts dispatches submitted to the event executor that have not finished.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        *self.count.lock() += 1;
        InFlightGuard(Arc::clone(self))
    }

    /// Waits until nothing is in flight. Returns `false` on timeout.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        self.idle.wait_while_for(&mut count, |count| *count > 0, timeout);
        *count == 0
    }
}

/// Marks one dispatch as finished when dropped, whether it completed or its
/// future was discarded.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

/// Registers owner-scoped listeners and fires events on the event executor.
pub struct EventManager {
    root: EventNode<dyn Event>,
    executor: ThreadPool,
    config: EventManagerConfig,
    owners: Mutex<HashMap<Owner, Vec<ListenerId>>>,
    in_flight: Arc<InFlight>,
    shut_down: AtomicBool,
}

impl EventManager {
    /// Creates a manager with the default configuration.
    pub fn new() -> Result<Self, ManagerError> {
        Self::with_config(EventManagerConfig::default())
    }

    /// Creates a manager with `config`.
    pub fn with_config(config: EventManagerConfig) -> Result<Self, ManagerError> {
        let executor = ThreadPool::builder()
            .pool_size(config.pool_size.max(1))
            .name_prefix(config.thread_name_prefix.clone())
            .create()?;
        tracing::debug!(pool_size = config.pool_size, "started event executor");
        Ok(Self {
            root: EventNode::all("global"),
            executor,
            config,
            owners: Mutex::new(HashMap::new()),
            in_flight: Arc::default(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The root node. Custom subtrees can be attached below it.
    pub fn root(&self) -> &EventNode<dyn Event> {
        &self.root
    }

    /// The configuration the manager was created with.
    pub fn config(&self) -> &EventManagerConfig {
        &self.config
    }

    /// Registers `listener` for `owner` at [`ListenerPriority::MEDIUM`].
    pub fn register<L>(&self, owner: &Owner, listener: EventListener<L>) -> ListenerHandle
    where
        L: ?Sized + EventFamily,
    {
        self.register_with_priority(owner, ListenerPriority::MEDIUM, listener)
    }

    /// Registers `listener` for `owner` at `priority`.
    pub fn register_with_priority<L>(
        &self,
        owner: &Owner,
        priority: impl Into<ListenerPriority>,
        listener: EventListener<L>,
    ) -> ListenerHandle
    where
        L: ?Sized + EventFamily,
    {
        let id = self.root.attach_listener(listener, priority.into());
        self.owners.lock().entry(owner.clone()).or_default().push(id);
        tracing::debug!(%owner, listener = %id, "registered listener");
        ListenerHandle(id)
    }

    /// Registers a plain handler for `owner` at [`ListenerPriority::MEDIUM`].
    pub fn register_handler<L, F, R>(&self, owner: &Owner, handler: F) -> ListenerHandle
    where
        L: ?Sized + EventFamily,
        F: Fn(&mut L) -> R + Send + Sync + 'static,
        R: IntoTaskOutcome,
    {
        self.register(owner, EventListener::of(handler))
    }

    /// Registers a plain handler for `owner` at `priority`.
    pub fn register_handler_with_priority<L, F, R>(
        &self,
        owner: &Owner,
        priority: impl Into<ListenerPriority>,
        handler: F,
    ) -> ListenerHandle
    where
        L: ?Sized + EventFamily,
        F: Fn(&mut L) -> R + Send + Sync + 'static,
        R: IntoTaskOutcome,
    {
        self.register_with_priority(owner, priority, EventListener::of(handler))
    }

    /// Removes one listener registered by `owner`.
    ///
    /// Returns `false` if `handle` was not registered by `owner`.
    pub fn unregister(&self, owner: &Owner, handle: ListenerHandle) -> bool {
        let owned = {
            let mut owners = self.owners.lock();
            let Some(ids) = owners.get_mut(owner) else {
                return false;
            };
            let before = ids.len();
            ids.retain(|id| *id != handle.0);
            let owned = ids.len() != before;
            if ids.is_empty() {
                owners.remove(owner);
            }
            owned
        };
        if owned {
            self.root.unregister_listener_deep(handle.0);
            tracing::debug!(%owner, listener = %handle.0, "unregistered listener");
        }
        owned
    }

    /// Removes every listener registered by `owner`, returning how many were
    /// still attached. Calling it again is a no-op.
    pub fn unregister_listeners(&self, owner: &Owner) -> usize {
        let Some(ids) = self.owners.lock().remove(owner) else {
            return 0;
        };
        let removed = ids
            .into_iter()
            .filter(|id| self.root.unregister_listener_deep(*id))
            .count();
        tracing::debug!(%owner, removed, "unregistered owner listeners");
        removed
    }

    /// Handles of the listeners currently registered by `owner`.
    pub fn registrations(&self, owner: &Owner) -> Vec<ListenerHandle> {
        self.owners
            .lock()
            .get(owner)
            .map(|ids| ids.iter().copied().map(ListenerHandle).collect())
            .unwrap_or_default()
    }

    /// Whether any live listener would observe an event of type `E`.
    pub fn has_listener_for<E: ?Sized + EventFamily>(&self) -> bool {
        self.root.has_listener_for::<E>()
    }

    /// Fires `event` on the event executor.
    ///
    /// The returned future resolves once every listener reached by the event,
    /// synchronous or not, has completed. It resolves immediately when nothing
    /// observes the event's type.
    ///
    /// After [`shutdown`](Self::shutdown) the future resolves to
    /// [`FireError::ShutDown`].
    pub fn fire<E: Event>(&self, event: E) -> BoxFuture<'static, Result<Fired<E>, FireError>> {
        if self.is_shut_down() {
            return future::ready(Err(FireError::ShutDown)).boxed();
        }
        if !self.root.has_listener(&EventType::of::<E>()) {
            return future::ready(Ok(Fired::new(event, DispatchReport::default()))).boxed();
        }
        let policy = self.config.failure_policy;
        match self.executor.spawn_with_handle(self.dispatch(event)) {
            Ok(handle) => handle
                .map(move |(event, report)| Fired::new(event, report).apply(policy))
                .boxed(),
            Err(error) => {
                tracing::error!(event_type = std::any::type_name::<E>(), %error, "failed to spawn dispatch");
                future::ready(Err(FireError::Spawn(error))).boxed()
            }
        }
    }

    /// Fires `event` on the event executor without waiting for it.
    pub fn fire_and_forget<E: Event>(&self, event: E) {
        if self.is_shut_down() {
            tracing::warn!(event_type = std::any::type_name::<E>(), "event fired after shutdown was dropped");
            return;
        }
        if !self.root.has_listener(&EventType::of::<E>()) {
            return;
        }
        if let Err(error) = self.executor.spawn(self.dispatch(event).map(drop)) {
            tracing::error!(event_type = std::any::type_name::<E>(), %error, "failed to spawn dispatch");
        }
    }

    /// Fires `event` on the calling thread. See [`EventNode::fire`].
    pub fn fire_sync<E: Event>(&self, event: &mut E) -> DispatchReport {
        self.root.fire(event)
    }

    /// Stops accepting asynchronous fires and waits up to
    /// [`shutdown_timeout`](EventManagerConfig::shutdown_timeout) for the
    /// dispatches already submitted to the event executor.
    ///
    /// Returns `false` if some were still running when the timeout elapsed.
    /// Must not be called from a listener.
    pub fn shutdown(&self) -> bool {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return self.in_flight.wait_idle(Duration::ZERO);
        }
        let drained = self.in_flight.wait_idle(self.config.shutdown_timeout);
        if drained {
            tracing::debug!("event executor drained");
        } else {
            tracing::warn!(
                timeout = ?self.config.shutdown_timeout,
                in_flight = *self.in_flight.count.lock(),
                "event executor still busy at shutdown"
            );
        }
        drained
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn dispatch<E: Event>(
        &self,
        mut event: E,
    ) -> impl Future<Output = (E, DispatchReport)> + Send + use<E> {
        let root = self.root.clone();
        let executor = self.executor.clone();
        let guard = self.in_flight.enter();
        async move {
            let report = root.fire_with(&mut event, &executor).await;
            drop(guard);
            (event, report)
        }
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("owners", &self.owners.lock().len())
            .field("in_flight", &*self.in_flight.count.lock())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::CallCounter;
    use arbor_core::EventTask;

    #[derive(Debug, Default)]
    struct Damage {
        amount: u32,
    }

    impl Event for Damage {}

    struct Unobserved;

    impl Event for Unobserved {}

    fn manager() -> EventManager {
        EventManager::with_config(EventManagerConfig::new().with_pool_size(2)).unwrap()
    }

    #[tokio::test]
    async fn test_fire_returns_mutated_event() {
        let manager = manager();
        let owner = Owner::new("armor");
        manager.register_handler(&owner, |damage: &mut Damage| damage.amount /= 2);

        let fired = manager.fire(Damage { amount: 10 }).await.unwrap();

        assert_eq!(fired.event().amount, 5);
        assert_eq!(fired.report().invoked(), 1);
    }

    #[tokio::test]
    async fn test_unobserved_event_resolves_immediately() {
        let manager = manager();
        let fired = manager.fire(Unobserved).await.unwrap();
        assert_eq!(fired.report().invoked(), 0);
    }

    #[test]
    fn test_bulk_unregister_only_touches_owner() {
        let manager = manager();
        let x = Owner::new("x");
        let y = Owner::new("y");
        let counter_x = CallCounter::new();
        let counter_y = CallCounter::new();
        for _ in 0..5 {
            let counter = counter_x.clone();
            manager.register_handler(&x, move |_: &mut Damage| counter.hit());
        }
        let counter = counter_y.clone();
        manager.register_handler(&y, move |_: &mut Damage| counter.hit());

        assert_eq!(manager.unregister_listeners(&x), 5);
        assert_eq!(manager.unregister_listeners(&x), 0);
        assert_eq!(manager.root().listener_count(), 1);

        manager.fire_sync(&mut Damage::default());
        assert_eq!(counter_x.count(), 0);
        assert_eq!(counter_y.count(), 1);
    }

    #[test]
    fn test_unregister_single_handle() {
        let manager = manager();
        let owner = Owner::from("single");
        let other = Owner::from("other");
        let first = manager.register_handler(&owner, |_: &mut Damage| ());
        manager.register_handler(&owner, |_: &mut Damage| ());

        assert!(!manager.unregister(&other, first));
        assert!(manager.unregister(&owner, first));
        assert!(!manager.unregister(&owner, first));
        assert_eq!(manager.registrations(&owner).len(), 1);
        assert_eq!(manager.root().listener_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_future_policy() {
        let manager = EventManager::with_config(
            EventManagerConfig::new()
                .with_pool_size(1)
                .with_failure_policy(FailurePolicy::FailFuture),
        )
        .unwrap();
        let owner = Owner::new("flaky");
        manager.register_handler(&owner, |_: &mut Damage| {
            EventTask::resume_when_complete(async {
                Err::<(), _>(std::io::Error::other("database unavailable"))
            })
        });

        match manager.fire(Damage::default()).await {
            Err(FireError::ListenersFailed { failures, .. }) => assert_eq!(failures.len(), 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_report_policy_keeps_failures_in_result() {
        let manager = manager();
        let owner = Owner::new("flaky");
        manager.register_handler(&owner, |_: &mut Damage| Err::<(), _>("bad armor"));
        manager.register_handler(&owner, |damage: &mut Damage| damage.amount += 1);

        let fired = manager.fire(Damage::default()).await.unwrap();

        assert_eq!(fired.event().amount, 1);
        assert_eq!(fired.failures().len(), 1);
    }

    #[test]
    fn test_fire_and_forget_runs_listeners() {
        let manager = manager();
        let (tx, rx) = std::sync::mpsc::channel();
        let tx = std::sync::Mutex::new(tx);
        manager.register_handler(&Owner::new("sink"), move |damage: &mut Damage| {
            tx.lock().unwrap().send(damage.amount).unwrap();
        });

        manager.fire_and_forget(Damage { amount: 3 });

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 3);
    }

    #[test]
    fn test_shutdown_drains_fire_and_forget() {
        let manager = manager();
        let delivered = CallCounter::new();
        manager.register_handler(&Owner::new("slow"), {
            let delivered = delivered.clone();
            move |_: &mut Damage| {
                std::thread::sleep(Duration::from_millis(100));
                delivered.hit();
            }
        });

        manager.fire_and_forget(Damage { amount: 1 });
        manager.fire_and_forget(Damage { amount: 2 });

        assert!(manager.shutdown());
        assert_eq!(delivered.count(), 2);
        assert!(manager.is_shut_down());
        assert!(manager.shutdown());
    }

    #[tokio::test]
    async fn test_fire_after_shutdown_is_rejected() {
        let manager = manager();
        let calls = CallCounter::new();
        manager.register_handler(&Owner::new("late"), {
            let calls = calls.clone();
            move |_: &mut Damage| calls.hit()
        });

        assert!(manager.shutdown());
        assert!(matches!(manager.fire(Damage::default()).await, Err(FireError::ShutDown)));
        manager.fire_and_forget(Damage::default());
        assert_eq!(calls.count(), 0);

        manager.fire_sync(&mut Damage::default());
        assert_eq!(calls.count(), 1);
    }

    #[test]
    fn test_shutdown_times_out_on_stalled_dispatch() {
        let manager = EventManager::with_config(
            EventManagerConfig::new()
                .with_pool_size(1)
                .with_shutdown_timeout(Duration::from_millis(50)),
        )
        .unwrap();
        let kept = Arc::new(Mutex::new(Vec::new()));
        manager.register_handler(&Owner::new("stuck"), {
            let kept = kept.clone();
            move |_: &mut Damage| {
                let kept = kept.clone();
                EventTask::with_continuation(move |continuation| kept.lock().push(continuation))
            }
        });

        manager.fire_and_forget(Damage::default());

        assert!(!manager.shutdown());
        for continuation in kept.lock().drain(..) {
            continuation.resume().unwrap();
        }
    }
}
