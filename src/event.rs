//! Core event, process-reference, and envelope types: the data model that flows through
//! the task queue, the per-process mailboxes, and the flow interpreter.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::DeliveryError;

/// A stable, value-equal identifier for a process. Cheap to clone and hash; every envelope
/// carries one as both its sender and its receiver.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProcessRef(Arc<str>);

impl ProcessRef {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Sender of runtime-generated envelopes (`Start`, the `Stop` that follows a `Kill`) and
    /// the conceptual root of the process tree.
    pub fn system() -> Self {
        Self::new("$system")
    }

    /// Well-known receiver for undeliverable envelopes.
    pub fn dead_letter() -> Self {
        Self::new("$dead-letter")
    }
}

impl fmt::Debug for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessRef({})", self.0)
    }
}

impl fmt::Display for ProcessRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

trait AnyDebug: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

impl<T> AnyDebug for T
where
    T: Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An opaque application payload carried by `Event::User`.
///
/// The runtime never inspects a user payload; a handler downcasts it back to whatever
/// message type it expects. This is the deliberately non-generic realization of the event
/// channel: a single `Event` type rather than a per-process `Actor<Msg>`, since the runtime
/// does not enforce type-safe message contracts between processes.
#[derive(Clone)]
pub struct UserEvent(Arc<dyn AnyDebug>);

impl UserEvent {
    pub fn new<T>(payload: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug + 'static,
    {
        Self(Arc::new(payload))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }
}

impl fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// An event delivered to a process: the reserved lifecycle/control subtypes plus an opaque
/// application payload.
#[derive(Clone, Debug)]
pub enum Event {
    /// Delivered exactly once, before any other event reaches a freshly registered process.
    Start,
    /// Requests orderly termination; queued behind whatever is already in the mailbox.
    Stop,
    /// Interrupts in-flight handler work immediately, then enqueues a `Stop`.
    Kill,
    /// A handler raised while processing `envelope`; routed back to the envelope's sender.
    Failure(Box<Envelope>, Arc<DeliveryError>),
    /// An envelope the runtime could not deliver; routed to the dead-letter process.
    DeadLetter(Box<Envelope>, Arc<DeliveryError>),
    /// An application-defined message.
    User(UserEvent),
}

impl Event {
    pub fn user<T>(payload: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug + 'static,
    {
        Event::User(UserEvent::new(payload))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Start => "Start",
            Event::Stop => "Stop",
            Event::Kill => "Kill",
            Event::Failure(..) => "Failure",
            Event::DeadLetter(..) => "DeadLetter",
            Event::User(_) => "User",
        }
    }
}

/// An immutable `(sender, event, receiver)` triple: the unit of delivery.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub sender: ProcessRef,
    pub event: Event,
    pub receiver: ProcessRef,
}

impl Envelope {
    pub fn new(sender: ProcessRef, event: Event, receiver: ProcessRef) -> Self {
        Self {
            sender,
            event,
            receiver,
        }
    }
}

/// Unit of work carried by the global task queue and per-process mailboxes.
#[derive(Clone, Debug)]
pub enum Task {
    Deliver(Envelope),
}
