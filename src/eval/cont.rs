use std::rc::Rc;

use tracing::debug;

use crate::{
    error::ReductionError,
    eval::{
        boxes::VarBox,
        env::Env,
        expr::{self, Expr, ExprRef},
        partial::PartialContinuation,
        procedure::Procedure,
        reclaim::Reclaim,
        step::Step,
        wind::{self, Plan},
    },
    symbol::Symbol,
    value::{Condition, Value},
};

pub type Cont = Rc<Continuation>;

/// What an unwinding wind frame does once its exit thunk returns.
#[derive(Clone)]
pub enum Pending {
    Return(Value),
    Throw(Value),
}

/// The defunctionalized frames. Each variant holds exactly what is needed to
/// resume once the sub-result it waits for arrives.
#[derive(Clone)]
pub enum Kont {
    Halt,
    If {
        form: ExprRef,
        env: Env,
    },
    Seq {
        form: ExprRef,
        next: usize,
        env: Env,
    },
    SetVar {
        slot: usize,
        env: Env,
    },
    /// Operands of a call, `let` or named `let`, accumulated in reverse.
    Gather {
        form: ExprRef,
        next: usize,
        acc: Value,
        env: Env,
    },
    LetrecInit {
        form: ExprRef,
        index: usize,
        env: Env,
    },
    AndOr {
        form: ExprRef,
        next: usize,
        env: Env,
    },
    QuasiCar {
        form: ExprRef,
        env: Env,
    },
    QuasiCdr {
        car: Value,
        splice: bool,
    },
    CatchHandler {
        form: ExprRef,
        env: Env,
    },
    Catch {
        handler: Rc<Procedure>,
    },
    /// The entry thunk of a `dynamic-wind` is running.
    WindBody {
        before: Rc<Procedure>,
        thunk: Rc<Procedure>,
        after: Rc<Procedure>,
    },
    /// Inside the protected extent.
    Wind {
        before: Rc<Procedure>,
        after: Rc<Procedure>,
    },
    /// An exit thunk is running on the way out.
    Resume(Pending),
    /// A wind thunk of a continuation transition is running.
    Transit {
        plan: Rc<Plan>,
        next: usize,
    },
    DynamicInit {
        form: ExprRef,
        env: Env,
    },
    DynamicBind {
        name: Symbol,
        cell: VarBox,
    },
    Prompt,
    Map {
        proc: Rc<Procedure>,
        lists: Rc<[Value]>,
        acc: Value,
        collect: bool,
    },
}

impl Kont {
    pub fn name(&self) -> &'static str {
        match self {
            Kont::Halt => "halt",
            Kont::If { .. } => "if",
            Kont::Seq { .. } => "seq",
            Kont::SetVar { .. } => "set",
            Kont::Gather { .. } => "gather",
            Kont::LetrecInit { .. } => "letrec",
            Kont::AndOr { .. } => "and-or",
            Kont::QuasiCar { .. } => "quasi-car",
            Kont::QuasiCdr { .. } => "quasi-cdr",
            Kont::CatchHandler { .. } => "catch-handler",
            Kont::Catch { .. } => "catch",
            Kont::WindBody { .. } => "wind-body",
            Kont::Wind { .. } => "wind",
            Kont::Resume(_) => "resume",
            Kont::Transit { .. } => "transit",
            Kont::DynamicInit { .. } => "dynamic-init",
            Kont::DynamicBind { .. } => "dynamic-bind",
            Kont::Prompt => "prompt",
            Kont::Map { .. } => "map",
        }
    }

    /// Continuations held by this frame other than its parent.
    pub(crate) fn conts(&self) -> Vec<&Cont> {
        match self {
            Kont::Transit { plan, .. } => plan.conts(),
            _ => vec![],
        }
    }

    /// A copy of this frame with every held continuation passed through `f`.
    pub(crate) fn remap(&self, f: &mut dyn FnMut(&Cont) -> Cont) -> Kont {
        match self {
            Kont::Transit { plan, next } => Kont::Transit {
                plan: Rc::new(plan.remap(f)),
                next: *next,
            },
            other => other.clone(),
        }
    }
}

/// One frame of a continuation chain. Immutable once built, so the same
/// chain can be resumed any number of times.
pub struct Continuation {
    kind: Kont,
    parent: Option<Cont>,
    depth: usize,
}

impl Continuation {
    pub fn halt() -> Cont {
        Rc::new(Continuation {
            kind: Kont::Halt,
            parent: None,
            depth: 0,
        })
    }

    pub fn push(kind: Kont, parent: Cont) -> Cont {
        let depth = parent.depth + 1;
        Rc::new(Continuation {
            kind,
            parent: Some(parent),
            depth,
        })
    }

    #[inline]
    pub fn kind(&self) -> &Kont {
        &self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<&Cont> {
        self.parent.as_ref()
    }

    /// Distance from the root of the chain.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub(crate) fn addr(&self) -> usize {
        self as *const Continuation as usize
    }

    /// Leaves a parentless `Halt` behind.
    pub(crate) fn take_contents(&mut self) -> (Kont, Option<Cont>) {
        (std::mem::replace(&mut self.kind, Kont::Halt), self.parent.take())
    }

    fn up(&self) -> Result<Cont, ReductionError> {
        self.parent
            .clone()
            .ok_or(ReductionError::Orphan(self.kind.name()))
    }

    /// The thunk run when control enters this frame's extent.
    pub fn entry_proc(&self) -> Option<&Rc<Procedure>> {
        match &self.kind {
            Kont::Wind { before, .. } => Some(before),
            _ => None,
        }
    }

    /// The thunk run when control leaves this frame's extent.
    pub fn exit_proc(&self) -> Option<&Rc<Procedure>> {
        match &self.kind {
            Kont::Wind { after, .. } => Some(after),
            _ => None,
        }
    }

    /// The innermost `dynamic-let` cell for `name` on this chain.
    pub fn dynamic_lookup(&self, name: &Symbol) -> Option<VarBox> {
        let mut cur = Some(self);
        while let Some(node) = cur {
            if let Kont::DynamicBind { name: bound, cell } = &node.kind {
                if bound == name {
                    return Some(cell.clone());
                }
            }
            cur = node.parent.as_deref();
        }
        None
    }

    /// The innermost `reset` prompt on the chain starting at `this`.
    pub fn nearest_prompt(this: &Cont) -> Option<Cont> {
        let mut cur = Some(this);
        while let Some(node) = cur {
            if matches!(node.kind, Kont::Prompt) {
                return Some(node.clone());
            }
            cur = node.parent.as_ref();
        }
        None
    }

    /// Detaches the frames from `this` up to, not including, `mark`.
    pub fn partial_capture(this: &Cont, mark: &Cont) -> Result<PartialContinuation, ReductionError> {
        PartialContinuation::capture(this, mark)
    }

    /// Delivers a sub-result to this frame.
    pub fn return_value(&self, v: Value) -> Result<Step, ReductionError> {
        let step = match &self.kind {
            Kont::Halt => Step::Done(v),
            Kont::If { form, env } => {
                let Expr::If { then, els, .. } = &**form else {
                    return Err(ReductionError::Malformed("if"));
                };
                let branch = if v.is_true() { then } else { els };
                Step::Eval(branch.clone(), env.clone(), self.up()?)
            }
            Kont::Seq { form, next, env } => {
                let xs = form.sequence()?;
                let x = xs.get(*next).ok_or(ReductionError::Malformed("sequence"))?;
                let k = if next + 1 == xs.len() {
                    self.up()?
                } else {
                    Continuation::push(
                        Kont::Seq {
                            form: form.clone(),
                            next: next + 1,
                            env: env.clone(),
                        },
                        self.up()?,
                    )
                };
                Step::Eval(x.clone(), env.clone(), k)
            }
            Kont::SetVar { slot, env } => {
                env.assign(*slot, v)?;
                Step::Return(Value::Unspecified, self.up()?)
            }
            Kont::Gather {
                form,
                next,
                acc,
                env,
            } => {
                let acc = Value::cons(v, acc.clone());
                let xs = form.operands()?;
                match xs.get(*next) {
                    Some(x) => {
                        let k = Continuation::push(
                            Kont::Gather {
                                form: form.clone(),
                                next: next + 1,
                                acc,
                                env: env.clone(),
                            },
                            self.up()?,
                        );
                        Step::Eval(x.clone(), env.clone(), k)
                    }
                    None => {
                        let values = acc
                            .reverse_list()
                            .and_then(|list| list.to_vec())
                            .ok_or(ReductionError::Malformed("operand list"))?;
                        expr::bind(form, values, env, self.up()?)?
                    }
                }
            }
            Kont::LetrecInit { form, index, env } => {
                let Expr::Letrec { inits, body, .. } = &**form else {
                    return Err(ReductionError::Malformed("letrec"));
                };
                let base = env.len().saturating_sub(inits.len());
                env.assign(base + index, v)?;
                match inits.get(index + 1) {
                    Some(init) => {
                        let k = Continuation::push(
                            Kont::LetrecInit {
                                form: form.clone(),
                                index: index + 1,
                                env: env.clone(),
                            },
                            self.up()?,
                        );
                        Step::Eval(init.clone(), env.clone(), k)
                    }
                    None => Step::Eval(body.clone(), env.clone(), self.up()?),
                }
            }
            Kont::AndOr { form, next, env } => {
                let xs = form.sequence()?;
                let decided = match &**form {
                    Expr::And(_) => !v.is_true(),
                    _ => v.is_true(),
                };
                match xs.get(*next) {
                    Some(x) if !decided => {
                        let k = if next + 1 == xs.len() {
                            self.up()?
                        } else {
                            Continuation::push(
                                Kont::AndOr {
                                    form: form.clone(),
                                    next: next + 1,
                                    env: env.clone(),
                                },
                                self.up()?,
                            )
                        };
                        Step::Eval(x.clone(), env.clone(), k)
                    }
                    _ => Step::Return(v, self.up()?),
                }
            }
            Kont::QuasiCar { form, env } => {
                let Expr::QuasiCons { cdr, splice, .. } = &**form else {
                    return Err(ReductionError::Malformed("quasiquote"));
                };
                let k = Continuation::push(
                    Kont::QuasiCdr {
                        car: v,
                        splice: *splice,
                    },
                    self.up()?,
                );
                Step::Eval(cdr.clone(), env.clone(), k)
            }
            Kont::QuasiCdr { car, splice: false } => {
                Step::Return(Value::cons(car.clone(), v), self.up()?)
            }
            Kont::QuasiCdr { car, splice: true } => match car.to_vec() {
                Some(items) => Step::Return(Value::list_with_tail(items, v), self.up()?),
                None => Step::Throw(
                    Condition::wrong_type("unquote-splicing", "list", car).into(),
                    self.up()?,
                ),
            },
            Kont::CatchHandler { form, env } => {
                let Expr::Catch { body, .. } = &**form else {
                    return Err(ReductionError::Malformed("catch"));
                };
                match v {
                    Value::Proc(handler) => {
                        let k = Continuation::push(Kont::Catch { handler }, self.up()?);
                        Step::Eval(body.clone(), env.clone(), k)
                    }
                    other => Step::Throw(
                        Condition::wrong_type("catch", "procedure", &other).into(),
                        self.up()?,
                    ),
                }
            }
            Kont::Catch { .. } | Kont::Prompt | Kont::DynamicBind { .. } => {
                Step::Return(v, self.up()?)
            }
            Kont::WindBody {
                before,
                thunk,
                after,
            } => {
                let k = Continuation::push(
                    Kont::Wind {
                        before: before.clone(),
                        after: after.clone(),
                    },
                    self.up()?,
                );
                Step::Call(thunk.clone(), vec![], k)
            }
            Kont::Wind { after, .. } => {
                let k = Continuation::push(Kont::Resume(Pending::Return(v)), self.up()?);
                Step::Call(after.clone(), vec![], k)
            }
            Kont::Resume(Pending::Return(r)) => Step::Return(r.clone(), self.up()?),
            Kont::Resume(Pending::Throw(e)) => Step::Throw(e.clone(), self.up()?),
            Kont::Transit { plan, next } => wind::proceed(plan, *next),
            Kont::DynamicInit { form, env } => {
                let Expr::DynamicLet { name, body, .. } = &**form else {
                    return Err(ReductionError::Malformed("dynamic-let"));
                };
                let k = Continuation::push(
                    Kont::DynamicBind {
                        name: name.clone(),
                        cell: VarBox::with(v),
                    },
                    self.up()?,
                );
                Step::Eval(body.clone(), env.clone(), k)
            }
            Kont::Map {
                proc,
                lists,
                acc,
                collect,
            } => {
                let acc = if *collect {
                    Value::cons(v, acc.clone())
                } else {
                    Value::Nil
                };
                map_next(proc.clone(), lists, acc, *collect, self.up()?)
            }
        };
        Ok(step)
    }

    /// Propagates a thrown value through this frame.
    pub fn throw(&self, v: Value) -> Result<Step, ReductionError> {
        let step = match &self.kind {
            Kont::Halt => Step::Uncaught(v),
            Kont::Catch { handler } => Step::Call(handler.clone(), vec![v], self.up()?),
            Kont::Wind { after, .. } => {
                let k = Continuation::push(Kont::Resume(Pending::Throw(v)), self.up()?);
                Step::Call(after.clone(), vec![], k)
            }
            Kont::Resume(Pending::Throw(original)) => {
                // The exit thunk threw while unwinding: the new value wins.
                debug!(%original, superseded_by = %v, "double fault");
                Step::Throw(v, self.up()?)
            }
            _ => Step::Throw(v, self.up()?),
        };
        Ok(step)
    }
}

/// One round of `map`/`for-each`: stops at the shortest list, otherwise calls
/// `proc` on the heads with a `Map` frame waiting for the result.
pub(crate) fn map_next(
    proc: Rc<Procedure>,
    lists: &[Value],
    acc: Value,
    collect: bool,
    k: Cont,
) -> Step {
    let mut heads = Vec::with_capacity(lists.len());
    let mut tails = Vec::with_capacity(lists.len());
    for list in lists {
        match list {
            Value::Pair(p) => {
                heads.push(p.car().clone());
                tails.push(p.cdr().clone());
            }
            Value::Nil => {
                let result = if collect {
                    acc.reverse_list().unwrap_or(Value::Nil)
                } else {
                    Value::Unspecified
                };
                return Step::Return(result, k);
            }
            other => {
                let who = if collect { "map" } else { "for-each" };
                return Step::Throw(Condition::wrong_type(who, "list", other).into(), k);
            }
        }
    }
    let k = Continuation::push(
        Kont::Map {
            proc: proc.clone(),
            lists: Rc::from(tails),
            acc,
            collect,
        },
        k,
    );
    Step::Call(proc, heads, k)
}

// Long chains, and values captured along them, would otherwise be freed by
// one native frame per link.
impl Drop for Continuation {
    fn drop(&mut self) {
        let mut r = Reclaim::default();
        r.frame(self);
        r.run();
    }
}
