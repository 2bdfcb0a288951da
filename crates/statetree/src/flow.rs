//! Asynchronous actions.
//!
//! An async action is a sequence of synchronous segments separated by
//! pending operations. The first segment runs when the action is spawned;
//! each later segment runs after the operation the previous one yielded has
//! completed. Every segment runs as an action of the same run, so it may
//! mutate a protected tree, and each one is announced to action listeners
//! with its own [`RunMode`].
//!
//! Once the sequence finishes, the final `return` or `throw` event is
//! published on the next scheduler tick, and only then does the
//! [`FlowHandle`] complete.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::action::{self, ActionContext, RunMode, RunStep};
use crate::args::Arg;
use crate::error::TreeError;
use crate::tree::Node;
use crate::types::FlowFactory;

/// Input handed to the step sequence when it is resumed.
#[derive(Debug)]
pub enum Resume {
    /// First segment of the run.
    Start,
    /// The pending operation completed with this value.
    Value(Value),
    /// The pending operation failed. Returning an error from this segment
    /// fails the run; returning a step recovers from it.
    Error(TreeError),
}

/// An external operation the run waits on.
pub struct PendingOp(LocalBoxFuture<'static, Result<Value, TreeError>>);

impl PendingOp {
    pub fn new(op: impl Future<Output = Result<Value, TreeError>> + 'static) -> Self {
        PendingOp(op.boxed_local())
    }
}

impl fmt::Debug for PendingOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingOp")
    }
}

#[derive(Debug)]
pub enum Yielded {
    Pending(PendingOp),
    /// Anything that is not a pending operation. Yielding it fails the run.
    Value(Value),
}

/// What a segment asks the coordinator to do next.
#[derive(Debug)]
pub enum Step {
    Yield(Yielded),
    Return(Value),
}

impl Step {
    /// Suspends the run until `op` completes.
    pub fn wait(op: impl Future<Output = Result<Value, TreeError>> + 'static) -> Step {
        Step::Yield(Yielded::Pending(PendingOp::new(op)))
    }

    /// Finishes the run with `value`.
    pub fn done(value: impl Into<Value>) -> Step {
        Step::Return(value.into())
    }
}

/// The step sequence of one run.
pub trait FlowSteps {
    fn resume(&mut self, cx: &ActionContext, input: Resume) -> Result<Step, TreeError>;
}

impl<F> FlowSteps for F
where
    F: FnMut(&ActionContext, Resume) -> Result<Step, TreeError>,
{
    fn resume(&mut self, cx: &ActionContext, input: Resume) -> Result<Step, TreeError> {
        self(cx, input)
    }
}

/// Completion of an async action run. The run only progresses while the
/// handle is polled.
pub struct FlowHandle {
    run_id: u64,
    inner: LocalBoxFuture<'static, Result<Value, TreeError>>,
}

impl FlowHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }
}

impl Future for FlowHandle {
    type Output = Result<Value, TreeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl fmt::Debug for FlowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowHandle").field("run_id", &self.run_id).finish()
    }
}

/// Runs the first segment of an async action and returns the handle that
/// drives the rest. Argument serialization failures are returned here,
/// before the first segment runs.
pub(crate) fn start(
    node: &Node,
    name: &str,
    factory: &FlowFactory,
    args: Vec<Arg>,
) -> Result<FlowHandle, TreeError> {
    let step = RunStep::invoke(node, name);
    // The factory only runs once the arguments have been serialized.
    let (steps, first) = action::intercept(node, &step, &args, |cx| {
        let mut steps = factory(&args);
        let first = steps.resume(cx, Resume::Start);
        (steps, first)
    })?;
    tracing::debug!(run_id = step.run_id, action = %name, "async action started");
    let run_id = step.run_id;
    let inner = drive(node.clone(), step, steps, first).boxed_local();
    Ok(FlowHandle { run_id, inner })
}

async fn drive(
    node: Node,
    step: RunStep,
    mut steps: Box<dyn FlowSteps>,
    first: Result<Step, TreeError>,
) -> Result<Value, TreeError> {
    let outcome = run(&node, &step, steps.as_mut(), first).await;
    // Settle on the next tick so listeners see the run finish before the
    // awaiting caller resumes.
    tokio::task::yield_now().await;
    settle(&node, &step, &outcome);
    outcome
}

async fn run(
    node: &Node,
    step: &RunStep,
    steps: &mut dyn FlowSteps,
    mut current: Result<Step, TreeError>,
) -> Result<Value, TreeError> {
    loop {
        let pending = match current? {
            Step::Return(value) => return Ok(value),
            Step::Yield(Yielded::Pending(op)) => op,
            Step::Yield(Yielded::Value(_)) => {
                return Err(TreeError::InvalidYield {
                    action: step.name.clone(),
                })
            }
        };
        tracing::trace!(run_id = step.run_id, "async action suspended");
        let (mode, input, arg) = match pending.0.await {
            Ok(value) => (RunMode::Yield, Resume::Value(value.clone()), value),
            Err(err) => {
                let message = Value::String(err.to_string());
                (RunMode::YieldError, Resume::Error(err), message)
            }
        };
        tracing::trace!(run_id = step.run_id, mode = ?mode, "async action resumed");
        current = action::intercept(node, &step.with_mode(mode), &[Arg::Value(arg)], |cx| {
            steps.resume(cx, input)
        })
        .and_then(|resumed| resumed);
    }
}

fn settle(node: &Node, step: &RunStep, outcome: &Result<Value, TreeError>) {
    let (mode, arg) = match outcome {
        Ok(value) => (RunMode::Return, value.clone()),
        Err(err) => (RunMode::Throw, Value::String(err.to_string())),
    };
    tracing::debug!(
        run_id = step.run_id,
        action = %step.name,
        mode = ?mode,
        "async action settled"
    );
    if let Err(err) = action::announce(node, &step.with_mode(mode), &[Arg::Value(arg)]) {
        tracing::debug!(run_id = step.run_id, error = %err, "settle event not published");
    }
}
