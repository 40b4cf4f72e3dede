//! The process registry: `ProcessRef -> ProcessState` lookup, the parent/child tree, and the
//! two global bounded queues (task queue, ready queue) the scheduler and worker fleet share.

use std::sync::{Arc, RwLock};

use indexmap::{IndexMap, IndexSet};

use crate::error::{ContextError, DeliveryError, QueueError};
use crate::event::{Envelope, Event, ProcessRef, Task};
use crate::process_state::{Process, ProcessState};
use crate::queue::BoundedQueue;

pub struct Context {
    processes: RwLock<IndexMap<ProcessRef, Arc<ProcessState>>>,
    parents: RwLock<IndexMap<ProcessRef, ProcessRef>>,
    children: RwLock<IndexMap<ProcessRef, IndexSet<ProcessRef>>>,
    task_queue: BoundedQueue<Task>,
    ready_queue: BoundedQueue<ProcessRef>,
    process_queue_size: usize,
}

impl Context {
    pub fn new(queue_size: usize, process_queue_size: usize) -> Arc<Self> {
        Arc::new(Self {
            processes: RwLock::new(IndexMap::new()),
            parents: RwLock::new(IndexMap::new()),
            children: RwLock::new(IndexMap::new()),
            task_queue: BoundedQueue::new(queue_size),
            ready_queue: BoundedQueue::new(queue_size),
            process_queue_size,
        })
    }

    /// Registers `process` as a child of `parent`. Idempotent when called twice with the
    /// identical `(parent, child.process_ref)` pair. Rejects a registration that would close
    /// a cycle in the parent/child tree. On success, enqueues the synthetic `Start` envelope
    /// every process observes before any user event.
    pub async fn register(
        &self,
        parent: ProcessRef,
        process: Process,
    ) -> Result<Arc<ProcessState>, ContextError> {
        let child_ref = process.process_ref.clone();

        if let Some(existing) = self.processes.read().unwrap().get(&child_ref).cloned() {
            if self.parents.read().unwrap().get(&child_ref) == Some(&parent) {
                return Ok(existing);
            }
        }

        if parent == child_ref || self.is_ancestor(&child_ref, &parent) {
            return Err(ContextError::CyclicRegistration {
                parent,
                child: child_ref,
            });
        }

        let state = Arc::new(ProcessState::new(process, self.process_queue_size));
        self.processes
            .write()
            .unwrap()
            .insert(child_ref.clone(), state.clone());
        self.parents
            .write()
            .unwrap()
            .insert(child_ref.clone(), parent.clone());
        self.children
            .write()
            .unwrap()
            .entry(parent.clone())
            .or_insert_with(IndexSet::new)
            .insert(child_ref.clone());

        tracing::debug!(process = %child_ref, parent = %parent, "process registered");

        let start = Envelope::new(ProcessRef::system(), Event::Start, child_ref);
        let _ = self.task_queue.enqueue(Task::Deliver(start)).await;

        Ok(state)
    }

    /// True if `candidate` appears while walking `of`'s parent chain upward.
    fn is_ancestor(&self, candidate: &ProcessRef, of: &ProcessRef) -> bool {
        let parents = self.parents.read().unwrap();
        let mut cur = of.clone();
        while let Some(p) = parents.get(&cur) {
            if p == candidate {
                return true;
            }
            cur = p.clone();
        }
        false
    }

    pub fn get_process_state(&self, r: &ProcessRef) -> Option<Arc<ProcessState>> {
        self.processes.read().unwrap().get(r).cloned()
    }

    /// Name/handler-level lookup (`Process`, as distinct from the mailbox/lock bookkeeping of
    /// `ProcessState`). Both halves live in the same registry slot here, so this is a thin
    /// alias over `get_process_state` for call sites that only care about `.process`.
    pub fn get_process(&self, r: &ProcessRef) -> Option<Arc<ProcessState>> {
        self.get_process_state(r)
    }

    /// Point-in-time snapshot of `r`'s children; tolerates concurrent registration.
    pub fn children_of(&self, r: &ProcessRef) -> Vec<ProcessRef> {
        self.children
            .read()
            .unwrap()
            .get(r)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Idempotent: removing an already-absent (or never-present) ref is a no-op.
    pub fn remove(&self, r: &ProcessRef) {
        let existed = self.processes.write().unwrap().shift_remove(r).is_some();
        let parent = self.parents.write().unwrap().shift_remove(r);
        if let Some(parent) = parent {
            if let Some(siblings) = self.children.write().unwrap().get_mut(&parent) {
                siblings.shift_remove(r);
            }
        }
        self.children.write().unwrap().shift_remove(r);

        if existed {
            tracing::debug!(process = %r, "process removed");
        }
    }

    pub fn interrupt(&self, r: &ProcessRef) {
        if let Some(ps) = self.get_process_state(r) {
            ps.interrupt();
        }
    }

    pub async fn submit(&self, task: Task) -> Result<(), QueueError> {
        self.task_queue.enqueue(task).await
    }

    pub async fn dequeue_task(&self) -> Option<Task> {
        self.task_queue.dequeue().await
    }

    pub async fn publish_ready(&self, r: ProcessRef) -> Result<(), QueueError> {
        self.ready_queue.enqueue(r).await
    }

    pub async fn next_ready(&self) -> Option<ProcessRef> {
        self.ready_queue.dequeue().await
    }

    /// Routes an undeliverable envelope to the well-known dead-letter process. If that
    /// process is itself unregistered or its mailbox is full, the envelope is dropped
    /// (logged) rather than dead-lettered again — receiving a `DeadLetter` must never
    /// re-trigger dead-lettering.
    pub async fn route_to_dead_letter(&self, envelope: Envelope, cause: Arc<DeliveryError>) {
        tracing::warn!(envelope = ?envelope, cause = %cause, "routing to dead letter");

        let dead_letter_ref = ProcessRef::dead_letter();
        let Some(ps) = self.get_process_state(&dead_letter_ref) else {
            tracing::error!("dead-letter process not registered; dropping envelope");
            return;
        };

        let dead_letter_event = Event::DeadLetter(Box::new(envelope), cause);
        let task = Task::Deliver(Envelope::new(
            ProcessRef::system(),
            dead_letter_event,
            dead_letter_ref.clone(),
        ));

        if ps.try_put(task) {
            if self.publish_ready(dead_letter_ref).await.is_err() {
                tracing::error!("ready queue closed while publishing dead letter; dropping");
            }
        } else {
            tracing::error!("dead-letter mailbox full; dropping envelope (silent-drop policy)");
        }
    }

    /// Closes both global queues so the routing loop and idle workers observe end-of-stream.
    pub async fn close(&self) {
        self.task_queue.close().await;
        self.ready_queue.close().await;
    }
}
