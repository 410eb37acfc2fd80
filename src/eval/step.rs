use std::rc::Rc;

use crate::{
    error::ReductionError,
    eval::{cont::Cont, env::Env, expr::{self, ExprRef}, procedure::Procedure},
    state::GlobalState,
    symbol::Symbol,
    value::Value,
};

/// One unit of work for the trampoline.
///
/// `run` does a bounded amount of work and hands back the next step, so the
/// native stack stays flat whatever the guest program does. The last three
/// variants are terminal.
pub enum Step {
    Eval(ExprRef, Env, Cont),
    Return(Value, Cont),
    Call(Rc<Procedure>, Vec<Value>, Cont),
    Throw(Value, Cont),
    /// Waiting for a signal; the continuation is registered in the global
    /// state.
    Suspend(Symbol),
    Done(Value),
    Uncaught(Value),
}

impl Step {
    pub fn run(self, gs: &mut GlobalState) -> Result<Step, ReductionError> {
        match self {
            Step::Eval(expr, env, k) => expr::eval(&expr, env, k),
            Step::Return(v, k) => k.return_value(v),
            Step::Call(proc, args, k) => proc.call(gs, args, k),
            Step::Throw(v, k) => k.throw(v),
            terminal => Ok(terminal),
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Suspend(_) | Step::Done(_) | Step::Uncaught(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::Eval(..) => "eval",
            Step::Return(..) => "return",
            Step::Call(..) => "call",
            Step::Throw(..) => "throw",
            Step::Suspend(_) => "suspend",
            Step::Done(_) => "done",
            Step::Uncaught(_) => "uncaught",
        }
    }
}
