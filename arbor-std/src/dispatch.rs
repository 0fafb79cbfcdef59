//! Dispatch bookkeeping: the per-fire report and the context threaded through
//! a tree walk.

use arbor_core::{BoxError, Continuation, EventTask, EventType, ListenerId, Resumed};
use futures::{
    future::FutureObj,
    task::{ArcWake, Spawn, SpawnError, waker_ref},
};
use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    task::{Context, Poll},
    thread::{self, Thread},
};

/// Why a listener failed during a dispatch.
#[derive(Debug)]
pub enum FailureCause {
    /// The handler returned an error or panicked.
    Exception(BoxError),
    /// The listener's task resumed its continuation with an error.
    TaskFailed(BoxError),
    /// Every handle to the listener's continuation was dropped unresolved.
    Abandoned,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception(error) => write!(f, "handler raised: {error}"),
            Self::TaskFailed(error) => write!(f, "task failed: {error}"),
            Self::Abandoned => f.write_str("continuation dropped without being resumed"),
        }
    }
}

/// A per-listener failure record.
#[derive(Debug)]
pub struct ListenerFailure {
    /// Identity of the failed listener.
    pub listener: ListenerId,
    /// Diagnostic label of the failed listener.
    pub label: Arc<str>,
    /// Runtime type of the event being dispatched.
    pub event_type: EventType,
    /// What went wrong.
    pub cause: FailureCause,
}

impl fmt::Display for ListenerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener `{}` on `{}`: {}", self.label, self.event_type, self.cause)
    }
}

/// Summary of one dispatch.
#[derive(Debug, Default)]
pub struct DispatchReport {
    invoked: usize,
    failures: Vec<ListenerFailure>,
}

impl DispatchReport {
    /// Number of listeners whose handler completed successfully, including
    /// async listeners whose continuation resumed normally.
    pub fn invoked(&self) -> usize {
        self.invoked
    }

    /// The failure records, in dispatch order.
    pub fn failures(&self) -> &[ListenerFailure] {
        &self.failures
    }

    /// Takes ownership of the failure records.
    pub fn into_failures(self) -> Vec<ListenerFailure> {
        self.failures
    }

    /// Whether no listener failed.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Queues spawned futures so a blocking dispatch can drive them itself.
///
/// The synchronous entry point hands this spawner to tasks and awaits
/// whatever they queued before awaiting their continuation.
#[derive(Default)]
pub(crate) struct InlineSpawner {
    queue: Mutex<Vec<FutureObj<'static, ()>>>,
}

impl InlineSpawner {
    fn pop(&self) -> Option<FutureObj<'static, ()>> {
        self.queue.lock().pop()
    }
}

impl Spawn for InlineSpawner {
    fn spawn_obj(&self, future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
        self.queue.lock().push(future);
        Ok(())
    }
}

/// Wakes a thread parked in [`park_on`].
struct ThreadNotify {
    thread: Thread,
    notified: AtomicBool,
}

impl ArcWake for ThreadNotify {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.notified.store(true, Ordering::Release);
        arc_self.thread.unpark();
    }
}

/// Drives `future` to completion on the calling thread.
///
/// Unlike `futures::executor::block_on` this does not mark the thread as
/// running an executor, so it may be called from a listener that is itself
/// being driven by `park_on`, a thread pool or an async runtime.
pub(crate) fn park_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let notify = Arc::new(ThreadNotify {
        thread: thread::current(),
        notified: AtomicBool::new(false),
    });
    let waker = waker_ref(&notify);
    let mut cx = Context::from_waker(&waker);
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        // Unparks meant for an outer walk on this thread are absorbed here;
        // the flag keeps them from being mistaken for our own wake-up.
        while !notify.notified.swap(false, Ordering::Acquire) {
            thread::park();
        }
    }
}

pub(crate) enum Executor<'s> {
    Inline(InlineSpawner),
    Spawner(&'s (dyn Spawn + Sync)),
}

/// State shared by every node visited during one dispatch.
pub(crate) struct DispatchContext<'s> {
    executor: Executor<'s>,
    event_type: EventType,
    report: Mutex<DispatchReport>,
}

impl<'s> DispatchContext<'s> {
    pub(crate) fn new(executor: Executor<'s>, event_type: EventType) -> Self {
        Self {
            executor,
            event_type,
            report: Mutex::new(DispatchReport::default()),
        }
    }

    pub(crate) fn record_success(&self) {
        self.report.lock().invoked += 1;
    }

    pub(crate) fn record_failure(&self, listener: ListenerId, label: &str, cause: FailureCause) {
        self.report.lock().failures.push(ListenerFailure {
            listener,
            label: label.into(),
            event_type: self.event_type,
            cause,
        });
    }

    /// Runs `task` and waits until its continuation is resolved.
    pub(crate) async fn complete_task(&self, listener: ListenerId, label: &str, task: EventTask) {
        let (continuation, resumption) = Continuation::new(label);
        match &self.executor {
            Executor::Inline(inline) => {
                task.execute(continuation, inline);
                while let Some(queued) = inline.pop() {
                    queued.await;
                }
            }
            Executor::Spawner(spawner) => task.execute(continuation, *spawner),
        }

        match resumption.await {
            Resumed::Completed => self.record_success(),
            Resumed::Failed(error) => {
                tracing::error!(
                    listener = %label,
                    event_type = %self.event_type,
                    error = %error,
                    "async listener failed"
                );
                self.record_failure(listener, label, FailureCause::TaskFailed(error));
            }
            Resumed::Abandoned => {
                tracing::error!(
                    listener = %label,
                    event_type = %self.event_type,
                    "async listener dropped its continuation without resuming it"
                );
                self.record_failure(listener, label, FailureCause::Abandoned);
            }
        }
    }

    pub(crate) fn into_report(self) -> DispatchReport {
        self.report.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Ping;

    impl arbor_core::Event for Ping {}

    fn listener_id() -> ListenerId {
        arbor_core::EventListener::<Ping>::of(|_: &mut Ping| ()).id()
    }

    fn context() -> DispatchContext<'static> {
        DispatchContext::new(
            Executor::Inline(InlineSpawner::default()),
            EventType::of::<Ping>(),
        )
    }

    #[test]
    fn test_park_on_inside_another_executor() {
        assert_eq!(block_on(async { park_on(async { 7 }) }), 7);
    }

    #[test]
    fn test_park_on_waits_for_remote_wake() {
        let (tx, rx) = futures::channel::oneshot::channel();
        let sender = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            tx.send("done").unwrap();
        });

        assert_eq!(park_on(rx), Ok("done"));
        sender.join().unwrap();
    }

    #[test]
    fn test_inline_spawn_runs_before_resumption() {
        let ctx = context();
        let ran = Arc::new(AtomicBool::new(false));
        let task = EventTask::spawn({
            let ran = ran.clone();
            move || ran.store(true, Ordering::SeqCst)
        });

        block_on(ctx.complete_task(listener_id(), "inline", task));

        assert!(ran.load(Ordering::SeqCst));
        let report = ctx.into_report();
        assert_eq!(report.invoked(), 1);
        assert!(report.is_clean());
    }

    #[test]
    fn test_abandoned_continuation_is_recorded() {
        let ctx = context();
        let task = EventTask::with_continuation(drop);

        block_on(ctx.complete_task(listener_id(), "forgetful", task));

        let report = ctx.into_report();
        assert_eq!(report.invoked(), 0);
        assert!(matches!(report.failures()[0].cause, FailureCause::Abandoned));
        assert_eq!(&*report.failures()[0].label, "forgetful");
    }

    #[test]
    fn test_failed_task_is_recorded() {
        let ctx = context();
        let task = EventTask::with_continuation(|continuation| {
            continuation.resume_with_error("nope").unwrap();
        });

        block_on(ctx.complete_task(listener_id(), "failing", task));

        let report = ctx.into_report();
        let failure = &report.failures()[0];
        assert!(matches!(failure.cause, FailureCause::TaskFailed(_)));
        assert!(failure.to_string().contains("nope"));
    }
}
