//! # stagehand
//!
//! `stagehand` is an in-process actor runtime: a bounded scheduler, per-process
//! mailboxes with strict single-owner draining, and a small `Flow` interpreter for
//! describing what a process does in response to an event without hand-writing
//! async state machines.
//!
//! A [`Scheduler`] owns a [`Context`] (the process registry and the two global
//! bounded queues), a fleet of [`worker`] threads that drain ready processes, and a
//! routing loop that delivers envelopes, escalates failures, and dead-letters what
//! it cannot deliver.
//!
//! ## Feature Flags
//!
//! * `testing`: compiles the [`testing`] module, small recorder/mock helpers for
//!   writing handler assertions without hand-writing `Process`/`Handler` boilerplate.
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod flow;
pub mod logging;
pub mod process_state;
pub mod queue;
pub mod scheduler;
#[cfg(feature = "testing")]
pub mod testing;
mod worker;

pub use config::SchedulerConfig;
pub use context::Context;
pub use error::{ConfigError, ContextError, DeliveryError, QueueError, SchedulerError};
pub use event::{Envelope, Event, ProcessRef, Task, UserEvent};
pub use flow::{eval, eval_with, suspend, suspend_with, Flow, FlowError, FlowState};
pub use logging::{LogFormat, LogLevel, Logger, LoggingError};
pub use process_state::{and, handler, or, Handler, Process, ProcessState};
pub use scheduler::Scheduler;
