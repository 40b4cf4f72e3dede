//! The scheduler: owns the `Context`, spawns the worker fleet and the routing loop, and
//! drives shutdown (stop the whole process tree, then close both queues).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SchedulerConfig;
use crate::context::Context;
use crate::error::{DeliveryError, SchedulerError};
use crate::event::{Envelope, Event, ProcessRef, Task};
use crate::process_state::{handler, Process};
use crate::worker::{stop_tree, Worker};

pub struct Scheduler {
    ctx: Arc<Context>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub async fn new(config: SchedulerConfig) -> Result<Arc<Self>, SchedulerError> {
        config.validate()?;
        let ctx = Context::new(config.queue_size, config.process_queue_size);

        let dead_letter = Process::new(
            ProcessRef::dead_letter(),
            "dead-letter",
            handler(|_event| Some(crate::flow::Flow::unit())),
        );
        ctx.register(ProcessRef::system(), dead_letter).await?;

        Ok(Arc::new(Self {
            ctx,
            config,
            shutdown: CancellationToken::new(),
        }))
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    /// Registers a top-level process (one with no process-author parent).
    pub async fn register_root(&self, process: Process) -> Result<(), SchedulerError> {
        self.ctx.register(ProcessRef::system(), process).await?;
        Ok(())
    }

    pub async fn submit(&self, envelope: Envelope) -> Result<(), SchedulerError> {
        self.ctx
            .submit(Task::Deliver(envelope))
            .await
            .map_err(Into::into)
    }

    /// A token the caller can cancel to trigger shutdown from outside `run`.
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the scheduler to completion: spawns the worker fleet and the routing loop, and
    /// blocks until either the task queue is closed externally or `shutdown_handle` is
    /// cancelled, then tears the process tree down before returning.
    pub async fn run(self: Arc<Self>) {
        tracing::info!(workers = self.config.number_of_workers, "scheduler starting");

        let mut workers = Vec::with_capacity(self.config.number_of_workers);
        for id in 0..self.config.number_of_workers {
            let worker = Worker::new(id, self.ctx.clone());
            workers.push(tokio::spawn(worker.run()));
        }

        let routing = {
            let this = self.clone();
            tokio::spawn(async move { this.route().await })
        };

        tokio::select! {
            _ = routing => {}
            _ = self.shutdown.cancelled() => {}
        }

        self.finalize_shutdown().await;
        for w in workers {
            let _ = w.await;
        }
    }

    async fn route(&self) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                task = self.ctx.dequeue_task() => {
                    match task {
                        Some(Task::Deliver(envelope)) => self.route_envelope(envelope).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn route_envelope(&self, envelope: Envelope) {
        let Envelope {
            sender,
            event,
            receiver,
        } = envelope;

        let Some(ps) = self.ctx.get_process_state(&receiver) else {
            self.ctx
                .route_to_dead_letter(
                    Envelope::new(sender, event, receiver.clone()),
                    Arc::new(DeliveryError::UnknownProcess(receiver)),
                )
                .await;
            return;
        };

        if matches!(event, Event::Kill) {
            tracing::info!(process = %receiver, "Kill received");
            // Kill interrupts in-flight handler work immediately, then queues a Stop so the
            // process still runs its ordinary (and any descendants') teardown.
            self.ctx.interrupt(&receiver);
            let stop_envelope = Envelope::new(sender, Event::Stop, receiver);
            if let Err(e) = self.ctx.submit(Task::Deliver(stop_envelope)).await {
                tracing::error!(error = %e, "failed to enqueue Stop after Kill; task queue closed");
            }
            return;
        }

        let task = Task::Deliver(Envelope::new(sender.clone(), event.clone(), receiver.clone()));
        if ps.try_put(task) {
            if let Err(e) = self.ctx.publish_ready(receiver).await {
                tracing::error!(error = %e, "failed to publish ready process; ready queue closed");
            }
        } else {
            self.ctx
                .route_to_dead_letter(
                    Envelope::new(sender, event, receiver.clone()),
                    Arc::new(DeliveryError::EventDelivery(receiver)),
                )
                .await;
        }
    }

    async fn finalize_shutdown(&self) {
        tracing::info!("scheduler shutting down");
        let roots = self.ctx.children_of(&ProcessRef::system());
        let stops = roots.iter().map(|r| async move {
            if let Some(ps) = self.ctx.get_process_state(r) {
                if ps.stop() {
                    stop_tree(&self.ctx, r, &ps).await;
                }
            }
        });
        futures::future::join_all(stops).await;
        self.ctx.close().await;
        tracing::info!("scheduler shutdown complete");
    }
}
