//! Test-only helpers: a recorder for building handlers that capture what they saw, so
//! integration tests can assert on observed event sequences without hand-rolling a
//! `Mutex<Vec<_>>` and a closure in every scenario.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Captures values pushed from inside a handler closure, readable back out once the
/// scheduler has finished delivering.
#[derive(Clone)]
pub struct Recorder<T> {
    inner: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        self.inner.lock().expect("recorder lock poisoned").push(value);
    }

    /// Point-in-time snapshot of everything recorded so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.lock().expect("recorder lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("recorder lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: fmt::Debug> fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("inner", &self.inner.lock().expect("recorder lock poisoned"))
            .finish()
    }
}
