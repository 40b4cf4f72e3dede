//! The flow AST: one tagged variant per primitive a handler can return, folded by
//! `interpret` into a cancel-safe effect. A richer end-user flow grammar (sugar on top of
//! these primitives) is external to this crate; here the only contract is that an effect is
//! sequenceable, racy/cancellable, and can raise a recoverable error.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};

use crate::context::Context;
use crate::event::{Envelope, Event, ProcessRef, Task};
use crate::process_state::Process;

/// Error raised by user-authored flow logic (an `eval`/`suspend` thunk). Converted to a
/// `Failure` event, or escalated straight to dead-letter if the event being handled was
/// itself a `Failure`, at the worker boundary.
pub type FlowError = Box<dyn std::error::Error + Send + Sync>;

/// Type-erased value threaded from a `suspend_with`/`eval_with` thunk into its bind closure.
pub type FlowValue = Box<dyn Any + Send>;

/// Immutable context an interpreted flow runs under: who sent the event being handled, which
/// process is handling it, and the scheduler-owned registry that `send`/`register` reach
/// into.
#[derive(Clone)]
pub struct FlowState {
    pub sender: ProcessRef,
    pub self_ref: ProcessRef,
    pub ctx: Arc<Context>,
}

impl FlowState {
    pub fn new(sender: ProcessRef, self_ref: ProcessRef, ctx: Arc<Context>) -> Self {
        Self {
            sender,
            self_ref,
            ctx,
        }
    }
}

/// The flow AST.
pub enum Flow {
    Unit,
    Send(Event, Vec<ProcessRef>),
    Forward(Event, Vec<ProcessRef>),
    Seq(Vec<Flow>),
    Par(Vec<Flow>),
    Fork(Box<Flow>),
    Race(Box<Flow>, Box<Flow>),
    Delay(Duration, Option<Box<Flow>>),
    WithSender(Box<dyn FnOnce(ProcessRef) -> Flow + Send>),
    Invoke(ProcessRef, Box<Flow>, ProcessRef),
    Register(ProcessRef, Process),
    Suspend(BoxFuture<'static, Result<(), FlowError>>),
    SuspendWith(
        BoxFuture<'static, Result<FlowValue, FlowError>>,
        Box<dyn FnOnce(FlowValue) -> Flow + Send>,
    ),
    Eval(Box<dyn FnOnce() -> Result<(), FlowError> + Send>),
    EvalWith(
        Box<dyn FnOnce() -> Result<FlowValue, FlowError> + Send>,
        Box<dyn FnOnce(FlowValue) -> Flow + Send>,
    ),
}

impl Flow {
    pub fn unit() -> Flow {
        Flow::Unit
    }

    /// Delivers `event` to each of `receivers`, as if sent by the process handling the
    /// current event.
    pub fn send(event: Event, receivers: impl IntoIterator<Item = ProcessRef>) -> Flow {
        Flow::Send(event, receivers.into_iter().collect())
    }

    /// Delivers `event` to each of `receivers`, preserving the original sender — for relaying
    /// a message on rather than replying to it.
    pub fn forward(event: Event, receivers: impl IntoIterator<Item = ProcessRef>) -> Flow {
        Flow::Forward(event, receivers.into_iter().collect())
    }

    pub fn seq(flows: impl IntoIterator<Item = Flow>) -> Flow {
        Flow::Seq(flows.into_iter().collect())
    }

    pub fn par(flows: impl IntoIterator<Item = Flow>) -> Flow {
        Flow::Par(flows.into_iter().collect())
    }

    /// Runs `flow` in the background; its own failure does not propagate to the caller.
    pub fn fork(flow: Flow) -> Flow {
        Flow::Fork(Box::new(flow))
    }

    /// Runs both flows concurrently; the first to complete wins and the other is dropped.
    pub fn race(a: Flow, b: Flow) -> Flow {
        Flow::Race(Box::new(a), Box::new(b))
    }

    pub fn delay(after: Duration, then: impl Into<Option<Flow>>) -> Flow {
        Flow::Delay(after, then.into().map(Box::new))
    }

    /// Builds a continuation from the sender of the event currently being handled.
    pub fn with_sender<F>(f: F) -> Flow
    where
        F: FnOnce(ProcessRef) -> Flow + Send + 'static,
    {
        Flow::WithSender(Box::new(f))
    }

    /// Runs `body` as though `callee` were handling an event sent by `caller`, rather than
    /// the process currently handling the outer event.
    pub fn invoke(caller: ProcessRef, body: Flow, callee: ProcessRef) -> Flow {
        Flow::Invoke(caller, Box::new(body), callee)
    }

    /// Registers `child` under `parent`; `child` receives its synthetic `Start` event once
    /// registration lands.
    pub fn register(parent: ProcessRef, child: Process) -> Flow {
        Flow::Register(parent, child)
    }
}

/// Lifts a fallible external effect whose result is not of interest.
pub fn suspend<Fut>(thunk: Fut) -> Flow
where
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
{
    Flow::Suspend(Box::pin(thunk))
}

/// Lifts a fallible external effect, binding its result into the continuation flow.
pub fn suspend_with<T, Fut, B>(thunk: Fut, bind: B) -> Flow
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
    B: FnOnce(T) -> Flow + Send + 'static,
{
    Flow::SuspendWith(
        Box::pin(async move { thunk.await.map(|v| Box::new(v) as FlowValue) }),
        Box::new(move |v: FlowValue| {
            bind(*v.downcast::<T>().expect("suspend_with: bind type mismatch"))
        }),
    )
}

/// Lifts a fallible pure computation whose result is not of interest.
pub fn eval<F>(f: F) -> Flow
where
    F: FnOnce() -> Result<(), FlowError> + Send + 'static,
{
    Flow::Eval(Box::new(f))
}

/// Lifts a fallible pure computation, binding its result into the continuation flow.
pub fn eval_with<T, F, B>(f: F, bind: B) -> Flow
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, FlowError> + Send + 'static,
    B: FnOnce(T) -> Flow + Send + 'static,
{
    Flow::EvalWith(
        Box::new(move || f().map(|v| Box::new(v) as FlowValue)),
        Box::new(move |v: FlowValue| bind(*v.downcast::<T>().expect("eval_with: bind type mismatch"))),
    )
}

/// The effect produced by interpreting a flow: cancel-safe, like any future, and composable
/// via ordinary `.await`/`select!`/`join!`.
pub type Effect = BoxFuture<'static, Result<(), FlowError>>;

pub fn interpret(flow: Flow, state: FlowState) -> Effect {
    run(flow, state)
}

fn run(flow: Flow, state: FlowState) -> Pin<Box<dyn Future<Output = Result<(), FlowError>> + Send>> {
    Box::pin(async move {
        match flow {
            Flow::Unit => Ok(()),

            Flow::Send(event, receivers) => {
                for receiver in receivers {
                    let envelope = Envelope::new(state.self_ref.clone(), event.clone(), receiver);
                    submit_best_effort(&state.ctx, envelope).await;
                }
                Ok(())
            }

            Flow::Forward(event, receivers) => {
                for receiver in receivers {
                    let envelope = Envelope::new(state.sender.clone(), event.clone(), receiver);
                    submit_best_effort(&state.ctx, envelope).await;
                }
                Ok(())
            }

            Flow::Seq(flows) => {
                for f in flows {
                    run(f, state.clone()).await?;
                }
                Ok(())
            }

            Flow::Par(flows) => {
                let results = join_all(flows.into_iter().map(|f| run(f, state.clone()))).await;
                for r in results {
                    r?;
                }
                Ok(())
            }

            Flow::Fork(f) => {
                let child_state = state.clone();
                tokio::spawn(async move {
                    if let Err(e) = run(*f, child_state).await {
                        tracing::error!(error = %e, "forked flow raised");
                    }
                });
                Ok(())
            }

            Flow::Race(a, b) => {
                tokio::select! {
                    r = run(*a, state.clone()) => r,
                    r = run(*b, state.clone()) => r,
                }
            }

            Flow::Delay(after, then) => {
                tokio::time::sleep(after).await;
                match then {
                    Some(f) => run(*f, state).await,
                    None => Ok(()),
                }
            }

            Flow::WithSender(f) => {
                let sender = state.sender.clone();
                run(f(sender), state).await
            }

            Flow::Invoke(caller, body, callee) => {
                let inner = FlowState::new(caller, callee, state.ctx.clone());
                run(*body, inner).await
            }

            Flow::Register(parent, child) => {
                state
                    .ctx
                    .register(parent, child)
                    .await
                    .map_err(|e| Box::new(e) as FlowError)?;
                Ok(())
            }

            Flow::Suspend(fut) => fut.await,

            Flow::SuspendWith(fut, bind) => {
                let value = fut.await?;
                run(bind(value), state).await
            }

            Flow::Eval(f) => f(),

            Flow::EvalWith(f, bind) => {
                let value = f()?;
                run(bind(value), state).await
            }
        }
    })
}

async fn submit_best_effort(ctx: &Arc<Context>, envelope: Envelope) {
    if let Err(e) = ctx.submit(Task::Deliver(envelope)).await {
        tracing::warn!(error = %e, "task queue closed; dropping send during shutdown");
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Flow::Unit => "Unit",
            Flow::Send(..) => "Send",
            Flow::Forward(..) => "Forward",
            Flow::Seq(..) => "Seq",
            Flow::Par(..) => "Par",
            Flow::Fork(..) => "Fork",
            Flow::Race(..) => "Race",
            Flow::Delay(..) => "Delay",
            Flow::WithSender(..) => "WithSender",
            Flow::Invoke(..) => "Invoke",
            Flow::Register(..) => "Register",
            Flow::Suspend(..) => "Suspend",
            Flow::SuspendWith(..) => "SuspendWith",
            Flow::Eval(..) => "Eval",
            Flow::EvalWith(..) => "EvalWith",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    fn test_ctx() -> Arc<Context> {
        Context::new(16, 16)
    }

    #[tokio::test]
    async fn unit_is_a_no_op() {
        let ctx = test_ctx();
        let state = FlowState::new(ProcessRef::system(), ProcessRef::new("p"), ctx);
        assert!(interpret(Flow::unit(), state).await.is_ok());
    }

    #[tokio::test]
    async fn eval_propagates_errors() {
        let ctx = test_ctx();
        let state = FlowState::new(ProcessRef::system(), ProcessRef::new("p"), ctx);
        let flow = eval(|| Err("boom".into()));
        assert!(interpret(flow, state).await.is_err());
    }

    #[tokio::test]
    async fn eval_with_binds_result_into_continuation() {
        let ctx = test_ctx();
        let state = FlowState::new(ProcessRef::system(), ProcessRef::new("p"), ctx);
        let flow = eval_with(
            || Ok(41),
            |v: i32| eval(move || if v + 1 == 42 { Ok(()) } else { Err("wrong".into()) }),
        );
        assert!(interpret(flow, state).await.is_ok());
    }

    #[tokio::test]
    async fn seq_runs_in_order_and_short_circuits() {
        let ctx = test_ctx();
        let state = FlowState::new(ProcessRef::system(), ProcessRef::new("p"), ctx);
        let flow = Flow::seq([eval(|| Err("first".into())), eval(|| Ok(()))]);
        assert!(interpret(flow, state).await.is_err());
    }

    #[tokio::test]
    async fn race_resolves_to_the_faster_branch() {
        let ctx = test_ctx();
        let state = FlowState::new(ProcessRef::system(), ProcessRef::new("p"), ctx);
        let fast = eval(|| Ok(()));
        let slow = suspend(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        });
        let flow = Flow::race(fast, slow);
        assert!(interpret(flow, state).await.is_ok());
    }
}
