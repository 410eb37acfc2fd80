use std::{fmt, rc::Rc};

use crate::{
    error::ReductionError,
    eval::{
        cont::{Cont, Continuation, Kont},
        env::Env,
        expr::Lambda,
        partial::PartialContinuation,
        reclaim::Reclaim,
        step::Step,
        wind::{self, Action},
    },
    state::GlobalState,
    value::{Condition, Value},
};

pub type PureFn = fn(&[Value]) -> Result<Value, Condition>;
pub type ControlFn = fn(&mut GlobalState, Vec<Value>, Cont) -> Result<Step, ReductionError>;

#[derive(Clone, Copy)]
pub enum PrimKind {
    /// Computes a value from its arguments; an `Err` is thrown.
    Pure(PureFn),
    /// Produces the next step itself, with access to the caller's
    /// continuation and the global state.
    Control(ControlFn),
}

/// A built-in procedure. Arity is checked before the body runs.
pub struct Primitive {
    pub name: &'static str,
    pub arity: usize,
    pub variadic: bool,
    pub kind: PrimKind,
}

pub enum Procedure {
    /// A lambda closed over exactly its capture set.
    Closure { lambda: Rc<Lambda>, env: Env },
    Primitive(&'static Primitive),
    /// Captured by `call/cc`. Invoking it abandons the caller's chain.
    Continuation(Cont),
    /// Captured by `shift`. Invoking it runs the captured frames on top of
    /// the caller's chain and returns to the caller.
    Partial(PartialContinuation),
}

impl Procedure {
    pub fn closure(lambda: Rc<Lambda>, env: &Env) -> Result<Self, ReductionError> {
        Ok(Procedure::Closure {
            env: env.capture(&lambda.capture)?,
            lambda,
        })
    }

    pub fn arity(&self) -> usize {
        match self {
            Procedure::Closure { lambda, .. } => lambda.arity,
            Procedure::Primitive(p) => p.arity,
            Procedure::Continuation(_) | Procedure::Partial(_) => 1,
        }
    }

    pub fn variadic(&self) -> bool {
        match self {
            Procedure::Closure { lambda, .. } => lambda.variadic,
            Procedure::Primitive(p) => p.variadic,
            Procedure::Continuation(_) | Procedure::Partial(_) => false,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Procedure::Closure { lambda, .. } => match &lambda.name {
                Some(name) => name.to_string(),
                None => "lambda".into(),
            },
            Procedure::Primitive(p) => p.name.into(),
            Procedure::Continuation(_) => "continuation".into(),
            Procedure::Partial(_) => "partial-continuation".into(),
        }
    }

    fn accepts(&self, count: usize) -> bool {
        let arity = self.arity();
        count == arity || (self.variadic() && count > arity)
    }

    /// Binds `args` and produces the step that runs the body with `k` as its
    /// continuation.
    pub fn call(
        &self,
        gs: &mut GlobalState,
        mut args: Vec<Value>,
        k: Cont,
    ) -> Result<Step, ReductionError> {
        if !self.accepts(args.len()) {
            let condition = Condition::arity(&self.name(), self.arity(), self.variadic(), args.len());
            return Ok(Step::Throw(condition.into(), k));
        }
        match self {
            Procedure::Closure { lambda, env } => {
                let frame = if lambda.variadic {
                    let rest = Value::list(args.split_off(lambda.arity));
                    env.append_values(args.into_iter().chain(std::iter::once(rest)))
                } else {
                    env.append_values(args)
                };
                Ok(Step::Eval(lambda.body.clone(), frame, k))
            }
            Procedure::Primitive(p) => match p.kind {
                PrimKind::Pure(f) => Ok(match f(&args) {
                    Ok(v) => Step::Return(v, k),
                    Err(c) => Step::Throw(c.into(), k),
                }),
                PrimKind::Control(f) => f(gs, args, k),
            },
            Procedure::Continuation(dest) => {
                let v = args.pop().unwrap_or(Value::Unspecified);
                wind::transition(&k, Action::Return(v, dest.clone()))
            }
            Procedure::Partial(partial) => {
                let v = args.pop().unwrap_or(Value::Unspecified);
                let base = Continuation::push(Kont::Prompt, k.clone());
                let top = partial.attach(base)?;
                wind::transition(&k, Action::Return(v, top))
            }
        }
    }
}

impl Procedure {
    /// Hands what this procedure owns alone to `r`.
    pub(crate) fn release_into(&mut self, r: &mut Reclaim) {
        match self {
            Procedure::Closure { env, .. } => r.env(env),
            Procedure::Primitive(_) => {}
            Procedure::Continuation(k) => {
                if let Some(k) = Rc::get_mut(k) {
                    r.frame(k);
                }
            }
            Procedure::Partial(partial) => {
                if let Some(k) = partial.top_mut() {
                    r.frame(k);
                }
            }
        }
    }
}

impl Drop for Procedure {
    fn drop(&mut self) {
        let mut r = Reclaim::default();
        self.release_into(&mut r);
        r.run();
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Closure { lambda, .. } => match &lambda.name {
                Some(name) => write!(f, "#<procedure {name}>"),
                None => write!(f, "#<procedure>"),
            },
            Procedure::Primitive(p) => write!(f, "#<primitive {}>", p.name),
            Procedure::Continuation(_) => write!(f, "#<continuation>"),
            Procedure::Partial(_) => write!(f, "#<partial-continuation>"),
        }
    }
}
