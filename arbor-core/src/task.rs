//! # Async Boundary (Continuation / EventTask)
//!
//! A listener that cannot finish synchronously returns an [`EventTask`]. The
//! dispatcher pairs the task with a fresh [`Continuation`] and does not move
//! past that listener until the continuation is resolved, possibly from
//! another thread and after an arbitrary delay.
//!
//! The continuation is a single-resolution promise: the first `resume` or
//! `resume_with_error` wins and every later call fails with
//! [`ContinuationError::AlreadyResumed`].

use crate::error::{BoxError, ContinuationError, PanicError};
use futures::{
    FutureExt,
    channel::oneshot,
    future::BoxFuture,
    task::{Spawn, SpawnExt},
};
use parking_lot::Mutex;
use std::{
    fmt,
    future::Future,
    panic::{AssertUnwindSafe, catch_unwind},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// The value a continuation is resolved with.
pub type TaskResult = Result<(), BoxError>;

/// Single-use handoff bound to one in-flight listener invocation.
///
/// Cloning yields another handle to the same promise; only the first
/// resolution across all handles takes effect.
#[derive(Clone)]
pub struct Continuation {
    sender: Arc<Mutex<Option<oneshot::Sender<TaskResult>>>>,
    label: Arc<str>,
}

impl Continuation {
    /// Creates a continuation and the [`Resumption`] future that observes it.
    ///
    /// `label` identifies the owning listener in diagnostics.
    pub fn new(label: impl Into<Arc<str>>) -> (Self, Resumption) {
        let (tx, rx) = oneshot::channel();
        let continuation = Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            label: label.into(),
        };
        (continuation, Resumption { rx })
    }

    /// Signals that the listener completed successfully.
    pub fn resume(&self) -> Result<(), ContinuationError> {
        self.complete(Ok(()))
    }

    /// Signals that the listener failed.
    pub fn resume_with_error(&self, error: impl Into<BoxError>) -> Result<(), ContinuationError> {
        self.complete(Err(error.into()))
    }

    /// Whether the continuation has already been resolved.
    pub fn is_resumed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// The diagnostic label of the owning listener.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn complete(&self, result: TaskResult) -> Result<(), ContinuationError> {
        let Some(sender) = self.sender.lock().take() else {
            tracing::error!(listener = %self.label, "continuation resumed more than once");
            return Err(ContinuationError::AlreadyResumed {
                listener: self.label.to_string(),
            });
        };
        if sender.send(result).is_err() {
            tracing::debug!(listener = %self.label, "continuation resumed after its dispatch was dropped");
        }
        Ok(())
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("listener", &self.label)
            .field("resumed", &self.is_resumed())
            .finish()
    }
}

/// How a continuation was resolved.
#[derive(Debug)]
pub enum Resumed {
    /// `resume` was called.
    Completed,
    /// `resume_with_error` was called.
    Failed(BoxError),
    /// Every handle was dropped without resolving the continuation.
    Abandoned,
}

/// Future observing a [`Continuation`]; completes once it is resolved.
#[must_use = "futures do nothing unless polled"]
pub struct Resumption {
    rx: oneshot::Receiver<TaskResult>,
}

impl Future for Resumption {
    type Output = Resumed;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| match received {
            Ok(Ok(())) => Resumed::Completed,
            Ok(Err(error)) => Resumed::Failed(error),
            Err(oneshot::Canceled) => Resumed::Abandoned,
        })
    }
}

enum TaskKind {
    Spawn(Box<dyn FnOnce() + Send>),
    WithContinuation(Box<dyn FnOnce(Continuation) + Send>),
    Future(BoxFuture<'static, TaskResult>),
}

/// Deferred work returned by a listener instead of completing inline.
pub struct EventTask {
    kind: TaskKind,
}

impl EventTask {
    /// Runs `work` on the event executor, then resumes the continuation.
    ///
    /// A panic inside `work` resumes the continuation with a [`PanicError`].
    pub fn spawn<F>(work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            kind: TaskKind::Spawn(Box::new(work)),
        }
    }

    /// Hands the continuation to `f` on the dispatching thread.
    ///
    /// `f` must eventually resolve the continuation exactly once, from any
    /// thread.
    pub fn with_continuation<F>(f: F) -> Self
    where
        F: FnOnce(Continuation) + Send + 'static,
    {
        Self {
            kind: TaskKind::WithContinuation(Box::new(f)),
        }
    }

    /// Resumes the continuation when `future` completes, with its error if
    /// it fails.
    pub fn resume_when_complete<Fut, E>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        Self {
            kind: TaskKind::Future(future.map(|result| result.map_err(Into::into)).boxed()),
        }
    }

    /// Whether the task's work must run on the event executor rather than
    /// the dispatching thread.
    pub fn must_be_async(&self) -> bool {
        matches!(self.kind, TaskKind::Spawn(_))
    }

    /// Starts the task, resolving `continuation` when it is done.
    ///
    /// Executor-bound work is submitted to `spawner`; if the spawner refuses
    /// it, the continuation is resumed with the spawn error.
    pub fn execute<S>(self, continuation: Continuation, spawner: &S)
    where
        S: Spawn + ?Sized,
    {
        let fallback = continuation.clone();
        let spawned = match self.kind {
            TaskKind::Spawn(work) => spawner.spawn(async move {
                let outcome = catch_unwind(AssertUnwindSafe(work));
                resolve(&continuation, outcome.map_err(|p| PanicError::from_payload(p).into()));
            }),
            TaskKind::WithContinuation(f) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| f(continuation.clone()))) {
                    let error = PanicError::from_payload(payload);
                    if !continuation.is_resumed() {
                        resolve(&continuation, Err(error.into()));
                    } else {
                        tracing::error!(listener = %continuation.label(), %error, "continuation handler panicked after resuming");
                    }
                }
                Ok(())
            }
            TaskKind::Future(future) => spawner.spawn(async move {
                let outcome = AssertUnwindSafe(future).catch_unwind().await;
                let result = outcome.unwrap_or_else(|p| Err(PanicError::from_payload(p).into()));
                resolve(&continuation, result);
            }),
        };
        if let Err(error) = spawned {
            tracing::error!(listener = %fallback.label(), %error, "failed to spawn event task");
            resolve(&fallback, Err(error.into()));
        }
    }
}

fn resolve(continuation: &Continuation, result: TaskResult) {
    // A listener may already have resolved the continuation itself.
    let _ = continuation.complete(result);
}

impl fmt::Debug for EventTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TaskKind::Spawn(_) => "spawn",
            TaskKind::WithContinuation(_) => "with_continuation",
            TaskKind::Future(_) => "resume_when_complete",
        };
        f.debug_struct("EventTask").field("kind", &kind).finish()
    }
}
