//! Testing utilities for Arbor.
//!
//! # Features
//!
//! - [`InvocationLog`]: An ordered, shareable record of which listeners ran
//! - [`CallCounter`]: A shareable invocation counter

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

// ============================================================================
// Invocation Log
// ============================================================================

/// Records labels in the order listeners push them.
///
/// # Example
///
/// ```rust,ignore
/// let log = InvocationLog::new();
/// let first = log.clone();
/// node.register_handler(move |_: &mut Chat| first.record("first"))?;
///
/// node.fire(&mut chat);
/// assert_eq!(log.entries(), ["first"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InvocationLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label.
    pub fn record(&self, label: impl Into<String>) {
        self.entries.lock().push(label.into());
    }

    /// A copy of the recorded labels.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of recorded labels.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clear the log.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

// ============================================================================
// Call Counter
// ============================================================================

/// Counts invocations across clones.
#[derive(Debug, Clone, Default)]
pub struct CallCounter {
    count: Arc<AtomicUsize>,
}

impl CallCounter {
    /// Create a counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter.
    pub fn hit(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Get the current count.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Reset the counter.
    pub fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
    }
}
