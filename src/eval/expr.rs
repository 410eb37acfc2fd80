use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{
    error::ReductionError,
    eval::{
        cont::{Cont, Continuation, Kont},
        env::Env,
        procedure::Procedure,
        step::Step,
    },
    symbol::Symbol,
    value::{Condition, Value},
};

pub type ExprRef = Rc<Expr>;
pub type Body = Rc<[ExprRef]>;

/// A compiled expression. Stateless: every name has been erased into a slot
/// index valid for the frame shape it was compiled against, so the same tree
/// can run in any number of frames at once.
#[derive(Debug, Serialize, Deserialize)]
pub enum Expr {
    Const(Value),
    Local {
        slot: usize,
        name: Symbol,
        global: bool,
    },
    Assign {
        slot: usize,
        value: ExprRef,
    },
    If {
        test: ExprRef,
        then: ExprRef,
        els: ExprRef,
    },
    /// Two or more expressions; the last is in tail position.
    Seq(Body),
    Lambda(Rc<Lambda>),
    /// Operator followed by operands, evaluated left to right.
    Call(Body),
    Let {
        capture: Vec<usize>,
        inits: Body,
        body: ExprRef,
    },
    NamedLet {
        capture: Vec<usize>,
        inits: Body,
        lambda: Rc<Lambda>,
    },
    Letrec {
        capture: Vec<usize>,
        inits: Body,
        body: ExprRef,
    },
    And(Body),
    Or(Body),
    QuasiCons {
        car: ExprRef,
        cdr: ExprRef,
        splice: bool,
    },
    Catch {
        handler: ExprRef,
        body: ExprRef,
    },
    DynamicLet {
        name: Symbol,
        value: ExprRef,
        body: ExprRef,
    },
    Dynamic(Symbol),
    Reset(ExprRef),
}

/// Code of a closure. `capture` maps the defining frame onto the closure's
/// own frame, which is then extended with the parameters.
#[derive(Debug, Serialize, Deserialize)]
pub struct Lambda {
    pub name: Option<Symbol>,
    pub capture: Vec<usize>,
    pub arity: usize,
    pub variadic: bool,
    pub body: ExprRef,
}

impl Expr {
    /// The operand expressions a `Kont::Gather` walks through.
    pub(crate) fn operands(&self) -> Result<&Body, ReductionError> {
        match self {
            Expr::Call(xs) => Ok(xs),
            Expr::Let { inits, .. } | Expr::NamedLet { inits, .. } => Ok(inits),
            _ => Err(ReductionError::Malformed("operand list")),
        }
    }

    /// Sub-expressions walked by `Kont::Seq` and `Kont::AndOr`.
    pub(crate) fn sequence(&self) -> Result<&Body, ReductionError> {
        match self {
            Expr::Seq(xs) | Expr::And(xs) | Expr::Or(xs) => Ok(xs),
            _ => Err(ReductionError::Malformed("sequence")),
        }
    }
}

/// One evaluation step. Sub-expressions are never evaluated here: a frame is
/// pushed and the next step evaluates them.
pub fn eval(this: &ExprRef, env: Env, k: Cont) -> Result<Step, ReductionError> {
    let step = match &**this {
        Expr::Const(v) => Step::Return(v.clone(), k),
        Expr::Local { slot, name, global } => match env.lookup(*slot)? {
            Some(v) => Step::Return(v, k),
            None if *global => Step::Throw(Condition::undefined(name).into(), k),
            None => Step::Throw(Condition::unbound(name).into(), k),
        },
        Expr::Assign { slot, value } => {
            let k = Continuation::push(Kont::SetVar { slot: *slot, env: env.clone() }, k);
            Step::Eval(value.clone(), env, k)
        }
        Expr::If { test, .. } => {
            let k = Continuation::push(
                Kont::If {
                    form: this.clone(),
                    env: env.clone(),
                },
                k,
            );
            Step::Eval(test.clone(), env, k)
        }
        Expr::Seq(xs) | Expr::And(xs) | Expr::Or(xs) => {
            let first = xs.first().ok_or(ReductionError::Malformed("sequence"))?;
            let kind = match &**this {
                Expr::Seq(_) => Kont::Seq {
                    form: this.clone(),
                    next: 1,
                    env: env.clone(),
                },
                _ => Kont::AndOr {
                    form: this.clone(),
                    next: 1,
                    env: env.clone(),
                },
            };
            Step::Eval(first.clone(), env, Continuation::push(kind, k))
        }
        Expr::Lambda(lambda) => {
            let closure = Procedure::closure(lambda.clone(), &env)?;
            Step::Return(Value::Proc(Rc::new(closure)), k)
        }
        Expr::Call(xs) | Expr::Let { inits: xs, .. } | Expr::NamedLet { inits: xs, .. } => {
            match xs.first() {
                Some(first) => {
                    let k = Continuation::push(
                        Kont::Gather {
                            form: this.clone(),
                            next: 1,
                            acc: Value::Nil,
                            env: env.clone(),
                        },
                        k,
                    );
                    Step::Eval(first.clone(), env, k)
                }
                None => bind(this, vec![], &env, k)?,
            }
        }
        Expr::Letrec { capture, inits, body } => {
            let frame = env.extend_fresh(capture, inits.len())?;
            match inits.first() {
                Some(first) => {
                    let k = Continuation::push(
                        Kont::LetrecInit {
                            form: this.clone(),
                            index: 0,
                            env: frame.clone(),
                        },
                        k,
                    );
                    Step::Eval(first.clone(), frame, k)
                }
                None => Step::Eval(body.clone(), frame, k),
            }
        }
        Expr::QuasiCons { car, .. } => {
            let k = Continuation::push(
                Kont::QuasiCar {
                    form: this.clone(),
                    env: env.clone(),
                },
                k,
            );
            Step::Eval(car.clone(), env, k)
        }
        Expr::Catch { handler, .. } => {
            let k = Continuation::push(
                Kont::CatchHandler {
                    form: this.clone(),
                    env: env.clone(),
                },
                k,
            );
            Step::Eval(handler.clone(), env, k)
        }
        Expr::DynamicLet { value, .. } => {
            let k = Continuation::push(
                Kont::DynamicInit {
                    form: this.clone(),
                    env: env.clone(),
                },
                k,
            );
            Step::Eval(value.clone(), env, k)
        }
        Expr::Dynamic(name) => match k.dynamic_lookup(name).and_then(|cell| cell.get()) {
            Some(v) => Step::Return(v, k),
            None => Step::Throw(Condition::unbound(name).into(), k),
        },
        Expr::Reset(body) => Step::Eval(body.clone(), env, Continuation::push(Kont::Prompt, k)),
    };
    Ok(step)
}

/// Finishes a `Call`, `Let` or `NamedLet` once every operand has a value.
pub(crate) fn bind(
    form: &ExprRef,
    values: Vec<Value>,
    env: &Env,
    k: Cont,
) -> Result<Step, ReductionError> {
    match &**form {
        Expr::Call(_) => {
            let mut values = values.into_iter();
            let operator = values.next().ok_or(ReductionError::Malformed("application"))?;
            let args = values.collect();
            match operator {
                Value::Proc(proc) => Ok(Step::Call(proc, args, k)),
                other => Ok(Step::Throw(
                    Condition::wrong_type("application", "procedure", &other).into(),
                    k,
                )),
            }
        }
        Expr::Let { capture, body, .. } => {
            let frame = env.extend_values(capture, values)?;
            Ok(Step::Eval(body.clone(), frame, k))
        }
        Expr::NamedLet {
            capture, lambda, ..
        } => {
            let frame = env.extend_fresh(capture, 1)?;
            let proc = Rc::new(Procedure::closure(lambda.clone(), &frame)?);
            frame.assign(capture.len(), Value::Proc(proc.clone()))?;
            Ok(Step::Call(proc, values, k))
        }
        _ => Err(ReductionError::Malformed("binding form")),
    }
}
