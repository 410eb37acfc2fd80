use std::fmt;

use tracing::{debug, trace};

use crate::{
    error::ReductionError,
    eval::{
        cont::{Cont, Continuation},
        env::Env,
        expr::ExprRef,
        step::Step,
    },
    state::GlobalState,
    symbol::Symbol,
    value::Value,
};

/// How a run of the trampoline ended.
#[derive(Debug, PartialEq)]
pub enum Outcome {
    Value(Value),
    /// A thrown value reached the top of its chain.
    Uncaught(Value),
    /// The computation is parked until the signal is posted.
    Suspended(Symbol),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Value(v) => write!(f, "{v}"),
            Outcome::Uncaught(v) => write!(f, "Uncaught: {v}"),
            Outcome::Suspended(s) => write!(f, "Suspended on {s}"),
        }
    }
}

/// The trampoline driver.
pub struct Machine {
    state: GlobalState,
    limit: Option<usize>,
}

impl Machine {
    pub fn new(state: GlobalState, limit: Option<usize>) -> Self {
        Self { state, limit }
    }

    #[inline]
    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut GlobalState {
        &mut self.state
    }

    #[inline]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// The initial step: `expr` in `env` with a fresh top-level continuation.
    pub fn start(expr: ExprRef, env: Env) -> Step {
        Step::Eval(expr, env, Continuation::halt())
    }

    /// Runs steps until a terminal one. Each call gets the full iteration
    /// limit.
    pub fn run(&mut self, mut step: Step) -> Result<Outcome, ReductionError> {
        let mut iterations = 0;
        loop {
            step = match step {
                Step::Done(v) => return Ok(Outcome::Value(v)),
                Step::Uncaught(v) => {
                    debug!(value = %v, "uncaught throw");
                    return Ok(Outcome::Uncaught(v));
                }
                Step::Suspend(signal) => {
                    debug!(%signal, "suspended");
                    return Ok(Outcome::Suspended(signal));
                }
                step => {
                    if let Some(limit) = self.limit {
                        if iterations >= limit {
                            return Err(ReductionError::LimitExceeded(limit));
                        }
                    }
                    iterations += 1;
                    trace!(iterations, step = step.name());
                    step.run(&mut self.state)?
                }
            };
        }
    }

    fn resume(&mut self, signal: &Symbol) -> Result<Cont, ReductionError> {
        self.state
            .take_pending(signal)
            .ok_or_else(|| ReductionError::NotWaiting(signal.clone()))
    }

    /// Delivers `value` to the computation waiting on `signal`.
    pub fn post(&mut self, signal: &Symbol, value: Value) -> Result<Outcome, ReductionError> {
        let k = self.resume(signal)?;
        debug!(%signal, "posting value");
        self.run(Step::Return(value, k))
    }

    /// Throws `error` into the computation waiting on `signal`, as a
    /// scheduler does on timeout.
    pub fn post_error(&mut self, signal: &Symbol, error: Value) -> Result<Outcome, ReductionError> {
        let k = self.resume(signal)?;
        debug!(%signal, "posting error");
        self.run(Step::Throw(error, k))
    }

    /// Parks `k` under `signal`, as if it had called `wait-signal`.
    pub fn park(&mut self, signal: Symbol, k: Cont) {
        self.state.suspend(signal, k)
    }
}
