//! The worker fleet: each worker pulls a ready process reference, claims its lock, and drains
//! its mailbox to completion before going back to the ready queue for the next one.

use std::sync::Arc;

use futures::future::{join_all, BoxFuture};

use crate::context::Context;
use crate::error::DeliveryError;
use crate::event::{Envelope, Event, ProcessRef, Task};
use crate::flow::{interpret, FlowError, FlowState};
use crate::process_state::ProcessState;

pub struct Worker {
    id: usize,
    ctx: Arc<Context>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<Context>) -> Self {
        Self { id, ctx }
    }

    pub async fn run(self) {
        tracing::info!(worker = self.id, "worker started");
        loop {
            let Some(process_ref) = self.ctx.next_ready().await else {
                break;
            };
            let Some(ps) = self.ctx.get_process_state(&process_ref) else {
                continue;
            };
            if !ps.acquire() {
                continue;
            }
            tracing::trace!(process = %process_ref, worker = self.id, "IDLE -> RUNNING");
            self.drain(&process_ref, &ps).await;
        }
        tracing::info!(worker = self.id, "worker exited");
    }

    async fn drain(&self, process_ref: &ProcessRef, ps: &Arc<ProcessState>) {
        loop {
            match ps.try_take_task() {
                Some(Task::Deliver(envelope)) => {
                    self.handle_envelope(process_ref, ps, envelope).await;
                }
                None => {
                    if ps.release() {
                        tracing::trace!(process = %process_ref, "RUNNING -> IDLE");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_envelope(&self, process_ref: &ProcessRef, ps: &Arc<ProcessState>, envelope: Envelope) {
        let Envelope {
            sender,
            event,
            receiver,
        } = envelope;

        if matches!(event, Event::Stop) && ps.stop() {
            stop_tree(&self.ctx, process_ref, ps).await;
            return;
        }

        if ps.is_stopped() {
            self.ctx
                .route_to_dead_letter(
                    Envelope::new(sender, event, receiver.clone()),
                    Arc::new(DeliveryError::IllegalState(receiver, "stopped")),
                )
                .await;
            return;
        }

        if ps.is_interrupted() {
            self.ctx
                .route_to_dead_letter(
                    Envelope::new(sender, event, receiver.clone()),
                    Arc::new(DeliveryError::IllegalState(receiver, "terminated")),
                )
                .await;
            return;
        }

        let handler = ps.process.handle();
        match handler.try_apply(&event) {
            Some(flow) => {
                let state = FlowState::new(sender.clone(), receiver.clone(), self.ctx.clone());
                let effect = interpret(flow, state);
                tokio::pin!(effect);
                let outcome = tokio::select! {
                    r = &mut effect => Some(r),
                    _ = ps.interruption().cancelled() => None,
                };
                match outcome {
                    None => {
                        tracing::debug!(receiver = %receiver, "handler interrupted mid-flight; dropping");
                    }
                    Some(Ok(())) => {}
                    Some(Err(cause)) => {
                        self.on_handler_error(sender, receiver, event, cause).await;
                    }
                }
            }
            None => match event {
                Event::Failure(env, cause) => {
                    self.ctx.route_to_dead_letter(*env, cause).await;
                }
                Event::Start => {}
                other => {
                    self.ctx
                        .route_to_dead_letter(
                            Envelope::new(sender, other, receiver.clone()),
                            Arc::new(DeliveryError::EventMatch(receiver)),
                        )
                        .await;
                }
            },
        }
    }

    async fn on_handler_error(&self, sender: ProcessRef, receiver: ProcessRef, event: Event, cause: FlowError) {
        tracing::error!(receiver = %receiver, error = %cause, "handler raised during interpretation");
        let delivery_cause = Arc::new(DeliveryError::EventHandling {
            receiver: receiver.clone(),
            message: Arc::from(cause.to_string()),
        });

        if let Event::Failure(original_envelope, _) = event {
            // A Failure handler that itself raises is escalated straight to dead-letter, using
            // the envelope that was originally undeliverable rather than the Failure wrapper;
            // bouncing a Failure back to its own sender again would loop forever.
            self.ctx
                .route_to_dead_letter(*original_envelope, delivery_cause)
                .await;
        } else {
            let failure_envelope = Envelope::new(sender.clone(), event, receiver);
            let failure_event = Event::Failure(Box::new(failure_envelope), delivery_cause);
            let out = Envelope::new(ProcessRef::system(), failure_event, sender);
            if let Err(e) = self.ctx.submit(Task::Deliver(out)).await {
                tracing::error!(error = %e, "failed to submit Failure event; task queue closed");
            }
        }
    }
}

/// Stops `receiver` and its descendants, recursively and in parallel, then gives the handler
/// a chance to react to `Stop` before removing it from the context. Shared between the
/// worker's delivery state machine and the scheduler's shutdown finalizer.
pub(crate) fn stop_tree<'a>(
    ctx: &'a Arc<Context>,
    receiver: &'a ProcessRef,
    ps: &'a Arc<ProcessState>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        let children = ctx.children_of(receiver);
        join_all(children.iter().map(|child| stop_child(ctx, child))).await;

        let handler = ps.process.handle();
        if let Some(flow) = handler.try_apply(&Event::Stop) {
            let state = FlowState::new(ProcessRef::system(), receiver.clone(), ctx.clone());
            if let Err(cause) = interpret(flow, state).await {
                tracing::error!(receiver = %receiver, error = %cause, "Stop handler raised during shutdown; ignoring");
            }
        }

        ctx.remove(receiver);
        tracing::info!(receiver = %receiver, "process terminated");
    })
}

fn stop_child<'a>(ctx: &'a Arc<Context>, child: &'a ProcessRef) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        if let Some(child_ps) = ctx.get_process_state(child) {
            if child_ps.stop() {
                stop_tree(ctx, child, &child_ps).await;
            }
        }
    })
}
