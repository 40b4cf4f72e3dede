//! Per-module error enums, aggregated into one crate-level error. Mirrors the teacher's
//! pattern of a `thiserror` enum per subsystem with a top-level enum of `#[from]` variants.

use std::sync::Arc;

use thiserror::Error;

use crate::event::ProcessRef;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("process {0} is not registered")]
    UnknownProcess(ProcessRef),

    #[error("registering {child} under {parent} would create a cycle")]
    CyclicRegistration {
        parent: ProcessRef,
        child: ProcessRef,
    },
}

/// Cause attached to `Failure` and `DeadLetter` events; realizes the delivery error taxonomy
/// consulted when an envelope cannot be routed or a handler raises while processing one.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("no process registered for ref {0}")]
    UnknownProcess(ProcessRef),

    #[error("mailbox full for {0}")]
    EventDelivery(ProcessRef),

    #[error("no handler defined for event at {0}")]
    EventMatch(ProcessRef),

    #[error("handler raised while handling event at {receiver}: {message}")]
    EventHandling {
        receiver: ProcessRef,
        message: Arc<str>,
    },

    #[error("process {0} is {1}")]
    IllegalState(ProcessRef, &'static str),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("queue_size must be greater than zero")]
    ZeroQueueSize,
    #[error("process_queue_size must be greater than zero")]
    ZeroProcessQueueSize,
    #[error("number_of_workers must be at least 1")]
    ZeroWorkers,
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}
