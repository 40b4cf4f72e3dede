//! Process definition, handler composition, and per-process mailbox/lifecycle state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::{Event, ProcessRef, Task};
use crate::flow::Flow;

/// A partial function from `Event` to `Flow`: `try_apply` returns `None` where the handler is
/// undefined for the given event, which is how the delivery state machine distinguishes "no
/// match, route to dead letter" from "matched, run this flow".
pub trait Handler: Send + Sync {
    fn try_apply(&self, event: &Event) -> Option<Flow>;
}

struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Event) -> Option<Flow> + Send + Sync,
{
    fn try_apply(&self, event: &Event) -> Option<Flow> {
        (self.0)(event)
    }
}

/// Builds a `Handler` from a plain closure. The primary process-authoring entry point the
/// core exposes; any richer match-arm DSL is layered on top by the embedding application.
pub fn handler<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(&Event) -> Option<Flow> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

struct AndHandler(Arc<dyn Handler>, Arc<dyn Handler>);

impl Handler for AndHandler {
    fn try_apply(&self, event: &Event) -> Option<Flow> {
        let a = self.0.try_apply(event)?;
        let b = self.1.try_apply(event)?;
        Some(Flow::seq([a, b]))
    }
}

struct OrHandler(Arc<dyn Handler>, Arc<dyn Handler>);

impl Handler for OrHandler {
    fn try_apply(&self, event: &Event) -> Option<Flow> {
        self.0.try_apply(event).or_else(|| self.1.try_apply(event))
    }
}

/// Handler defined only where both operands are; runs both, in order, on the same event.
pub fn and(a: Arc<dyn Handler>, b: Arc<dyn Handler>) -> Arc<dyn Handler> {
    Arc::new(AndHandler(a, b))
}

/// Handler defined where either operand is; the first (in argument order) that matches wins.
pub fn or(a: Arc<dyn Handler>, b: Arc<dyn Handler>) -> Arc<dyn Handler> {
    Arc::new(OrHandler(a, b))
}

/// A process: a stable reference, a display name, and a swappable handler.
pub struct Process {
    pub process_ref: ProcessRef,
    pub name: String,
    handler: RwLock<Arc<dyn Handler>>,
}

impl Process {
    pub fn new(process_ref: ProcessRef, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        Self {
            process_ref,
            name: name.into(),
            handler: RwLock::new(handler),
        }
    }

    /// Current handler. Cloning the `Arc` here, rather than holding the lock across a
    /// handler invocation, is what lets `switch` take effect for the *next* delivered event
    /// without blocking whatever event is currently mid-interpretation.
    pub fn handle(&self) -> Arc<dyn Handler> {
        self.handler.read().expect("process handler lock poisoned").clone()
    }

    /// Atomically replaces the handler.
    pub fn switch(&self, new_handler: Arc<dyn Handler>) {
        *self.handler.write().expect("process handler lock poisoned") = new_handler;
    }
}

/// Per-process mailbox, lifecycle flags, and the acquire/release handshake that serializes
/// handler execution for a single process across the worker fleet: at most one worker may
/// hold the lock for a given process at a time.
pub struct ProcessState {
    pub process: Process,
    mailbox_tx: mpsc::Sender<Task>,
    mailbox_rx: std::sync::Mutex<mpsc::Receiver<Task>>,
    owned: AtomicBool,
    stopped: AtomicBool,
    interrupted: AtomicBool,
    interruption: CancellationToken,
}

impl ProcessState {
    pub fn new(process: Process, capacity: usize) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(capacity);
        Self {
            process,
            mailbox_tx,
            mailbox_rx: std::sync::Mutex::new(mailbox_rx),
            owned: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            interruption: CancellationToken::new(),
        }
    }

    pub fn try_put(&self, task: Task) -> bool {
        self.mailbox_tx.try_send(task).is_ok()
    }

    pub fn try_take_task(&self) -> Option<Task> {
        self.mailbox_rx
            .lock()
            .expect("mailbox lock poisoned")
            .try_recv()
            .ok()
    }

    fn mailbox_is_empty(&self) -> bool {
        self.mailbox_rx.lock().expect("mailbox lock poisoned").len() == 0
    }

    /// Attempts to claim the per-process lock. At most one concurrent caller observes `true`.
    pub fn acquire(&self) -> bool {
        self.owned
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases the lock, re-checking the mailbox atomically with the unlock to avoid the
    /// lost-wakeup race: if a producer's `try_put` lands between our emptiness check and the
    /// store, we try to reclaim ownership. If we win the reclaim, we report `false` so the
    /// caller keeps draining; if someone else already reclaimed it first, our release still
    /// succeeded (`true`) because that new owner is responsible for the mailbox now.
    pub fn release(&self) -> bool {
        if !self.mailbox_is_empty() {
            return false;
        }
        self.owned.store(false, Ordering::Release);
        if !self.mailbox_is_empty() && self.acquire() {
            return false;
        }
        true
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.interruption.cancel();
        tracing::debug!(process = %self.process.process_ref, "interrupted");
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Raises `stopped`. Returns `true` only for the call that performs the transition, so
    /// concurrent `Stop`/`Kill` handling never tears down a process twice.
    pub fn stop(&self) -> bool {
        self.stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn interruption(&self) -> &CancellationToken {
        &self.interruption
    }
}
