//! Self-contained images of values and continuations.
//!
//! Everything with identity (pairs, procedures, frames, links, boxes) is
//! stored once in an index table and referred to by position, so sharing and
//! cycles through boxes survive a round trip. A node is written after every
//! node it points to, which lets restoration run as a single forward pass.
//! Boxes are created empty up front and filled last, since a closure can
//! reach itself through one.

use std::{collections::HashMap, rc::Rc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    builtins,
    error::SnapshotError,
    eval::{
        boxes::VarBox,
        cont::{Cont, Continuation, Kont, Pending},
        env::Env,
        expr::{ExprRef, Lambda},
        partial::PartialContinuation,
        procedure::Procedure,
        wind::{Action, Plan, Thunk},
    },
    num::Num,
    symbol::Symbol,
    value::{Condition, ConditionKind, Pair, Value},
};

#[derive(Serialize, Deserialize)]
enum Val {
    Nil,
    Unspecified,
    Bool(bool),
    Num(Num),
    Char(char),
    Str(String),
    Sym(Symbol),
    Node(usize),
}

/// A continuation frame with its references turned into table indices.
/// `form` indexes `exprs`, `env` and procedures index `nodes`, `cell`
/// indexes `boxes`.
#[derive(Serialize, Deserialize)]
enum Frame {
    Halt,
    If { form: usize, env: usize },
    Seq { form: usize, next: usize, env: usize },
    SetVar { slot: usize, env: usize },
    Gather { form: usize, next: usize, acc: Val, env: usize },
    LetrecInit { form: usize, index: usize, env: usize },
    AndOr { form: usize, next: usize, env: usize },
    QuasiCar { form: usize, env: usize },
    QuasiCdr { car: Val, splice: bool },
    CatchHandler { form: usize, env: usize },
    Catch { handler: usize },
    WindBody { before: usize, thunk: usize, after: usize },
    Wind { before: usize, after: usize },
    Resume { throw: bool, value: Val },
    Transit { plan: usize, next: usize },
    DynamicInit { form: usize, env: usize },
    DynamicBind { name: Symbol, cell: usize },
    Prompt,
    Map { proc: usize, lists: Vec<Val>, acc: Val, collect: bool },
}

#[derive(Serialize, Deserialize)]
enum Final {
    Return(Val, usize),
    Throw(Val, usize),
    Call(usize, Vec<Val>, usize),
}

#[derive(Serialize, Deserialize)]
enum Node {
    Pair(Val, Val),
    Condition {
        kind: ConditionKind,
        message: String,
        irritants: Vec<Val>,
    },
    Closure {
        lambda: usize,
        env: usize,
    },
    /// Primitives travel by name and are looked up again on restore.
    Primitive(String),
    Continuation(usize),
    Partial {
        top: usize,
        mark: usize,
    },
    Env(Vec<usize>),
    Cont {
        frame: Frame,
        parent: Option<usize>,
    },
    Plan {
        thunks: Vec<(usize, usize)>,
        last: Final,
    },
}

#[derive(Serialize, Deserialize)]
enum Root {
    Value(Val),
    Cont(usize),
}

/// A detached copy of everything reachable from one value or continuation.
#[derive(Serialize, Deserialize)]
pub struct Snapshot {
    exprs: Vec<ExprRef>,
    lambdas: Vec<Rc<Lambda>>,
    boxes: Vec<Option<Val>>,
    nodes: Vec<Node>,
    root: Root,
}

impl Snapshot {
    pub fn of_value(value: &Value) -> Self {
        let mut encoder = Encoder::default();
        let root = Root::Value(encoder.value(value));
        encoder.finish(root)
    }

    pub fn of_continuation(k: &Cont) -> Self {
        let mut encoder = Encoder::default();
        let root = Root::Cont(encoder.cont(k));
        encoder.finish(root)
    }

    pub fn restore_value(&self) -> Result<Value, SnapshotError> {
        let Root::Value(root) = &self.root else {
            return Err(SnapshotError::Root("value"));
        };
        Decoder::run(self)?.value(root)
    }

    pub fn restore_continuation(&self) -> Result<Cont, SnapshotError> {
        let Root::Cont(root) = &self.root else {
            return Err(SnapshotError::Root("continuation"));
        };
        Decoder::run(self)?.cont(*root)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Tag {
    Pair,
    Condition,
    Proc,
    Env,
    Cont,
    Plan,
    Expr,
    Lambda,
    Box,
}

#[inline]
fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

/// Index of `item` in `table`, appending it on first sight.
fn intern<T>(
    ids: &mut HashMap<(Tag, usize), usize>,
    tag: Tag,
    table: &mut Vec<Rc<T>>,
    item: &Rc<T>,
) -> usize {
    *ids.entry((tag, addr(item))).or_insert_with(|| {
        table.push(item.clone());
        table.len() - 1
    })
}

#[derive(Default)]
struct Encoder {
    ids: HashMap<(Tag, usize), usize>,
    exprs: Vec<ExprRef>,
    lambdas: Vec<Rc<Lambda>>,
    boxes: Vec<Option<Val>>,
    // Boxes seen but not yet filled in.
    queue: Vec<(usize, VarBox)>,
    nodes: Vec<Node>,
}

impl Encoder {
    #[inline]
    fn known(&self, tag: Tag, addr: usize) -> Option<usize> {
        self.ids.get(&(tag, addr)).copied()
    }

    fn node(&mut self, tag: Tag, addr: usize, node: Node) -> usize {
        let id = self.nodes.len();
        self.nodes.push(node);
        self.ids.insert((tag, addr), id);
        id
    }

    fn value(&mut self, v: &Value) -> Val {
        match v {
            Value::Nil => Val::Nil,
            Value::Unspecified => Val::Unspecified,
            Value::Bool(b) => Val::Bool(*b),
            Value::Num(n) => Val::Num(n.clone()),
            Value::Char(c) => Val::Char(*c),
            Value::Str(s) => Val::Str(s.to_string()),
            Value::Sym(s) => Val::Sym(s.clone()),
            Value::Pair(p) => self.pairs(p),
            Value::Proc(p) => Val::Node(self.procedure(p)),
            Value::Condition(c) => Val::Node(self.condition(c)),
        }
    }

    /// Walks the cdr spine without recursing, then writes it tail first.
    fn pairs(&mut self, head: &Rc<Pair>) -> Val {
        let mut spine = vec![];
        let mut cur = head.clone();
        let mut tail = loop {
            if let Some(id) = self.known(Tag::Pair, addr(&cur)) {
                break Val::Node(id);
            }
            spine.push(cur.clone());
            let next = match cur.cdr() {
                Value::Pair(next) => next.clone(),
                other => break self.value(other),
            };
            cur = next;
        };
        for pair in spine.iter().rev() {
            let car = self.value(pair.car());
            tail = Val::Node(self.node(Tag::Pair, addr(pair), Node::Pair(car, tail)));
        }
        tail
    }

    fn condition(&mut self, c: &Rc<Condition>) -> usize {
        if let Some(id) = self.known(Tag::Condition, addr(c)) {
            return id;
        }
        let irritants = c.irritants.iter().map(|v| self.value(v)).collect();
        let node = Node::Condition {
            kind: c.kind,
            message: c.message.clone(),
            irritants,
        };
        self.node(Tag::Condition, addr(c), node)
    }

    fn procedure(&mut self, p: &Rc<Procedure>) -> usize {
        if let Some(id) = self.known(Tag::Proc, addr(p)) {
            return id;
        }
        let node = match &**p {
            Procedure::Closure { lambda, env } => Node::Closure {
                lambda: intern(&mut self.ids, Tag::Lambda, &mut self.lambdas, lambda),
                env: self.env(env),
            },
            Procedure::Primitive(prim) => Node::Primitive(prim.name.to_string()),
            Procedure::Continuation(k) => Node::Continuation(self.cont(k)),
            Procedure::Partial(partial) => Node::Partial {
                top: self.cont(partial.top()),
                mark: self.cont(partial.mark()),
            },
        };
        self.node(Tag::Proc, addr(p), node)
    }

    fn env(&mut self, env: &Env) -> usize {
        if let Some(id) = self.known(Tag::Env, env.addr()) {
            return id;
        }
        let boxes = env.boxes().iter().map(|b| self.var_box(b)).collect();
        self.node(Tag::Env, env.addr(), Node::Env(boxes))
    }

    fn var_box(&mut self, cell: &VarBox) -> usize {
        if let Some(id) = self.known(Tag::Box, cell.addr()) {
            return id;
        }
        let id = self.boxes.len();
        self.boxes.push(None);
        self.ids.insert((Tag::Box, cell.addr()), id);
        self.queue.push((id, cell.clone()));
        id
    }

    fn expr(&mut self, form: &ExprRef) -> usize {
        intern(&mut self.ids, Tag::Expr, &mut self.exprs, form)
    }

    /// Walks parent links up to the first frame already written, then
    /// writes the new frames outermost first.
    fn cont(&mut self, k: &Cont) -> usize {
        if let Some(id) = self.known(Tag::Cont, k.addr()) {
            return id;
        }
        let mut chain = vec![k.clone()];
        let mut parent = None;
        let mut cur = k.parent();
        while let Some(node) = cur {
            if let Some(id) = self.known(Tag::Cont, node.addr()) {
                parent = Some(id);
                break;
            }
            chain.push(node.clone());
            cur = node.parent();
        }
        let mut id = 0;
        for node in chain.iter().rev() {
            let frame = self.frame(node.kind());
            id = self.node(Tag::Cont, node.addr(), Node::Cont { frame, parent });
            parent = Some(id);
        }
        id
    }

    fn plan(&mut self, plan: &Rc<Plan>) -> usize {
        if let Some(id) = self.known(Tag::Plan, addr(plan)) {
            return id;
        }
        let thunks = plan
            .thunks
            .iter()
            .map(|t| (self.procedure(&t.proc), self.cont(&t.frame)))
            .collect();
        let last = match &plan.action {
            Action::Return(v, k) => Final::Return(self.value(v), self.cont(k)),
            Action::Throw(v, k) => Final::Throw(self.value(v), self.cont(k)),
            Action::Call(proc, args, k) => Final::Call(
                self.procedure(proc),
                args.iter().map(|a| self.value(a)).collect(),
                self.cont(k),
            ),
        };
        self.node(Tag::Plan, addr(plan), Node::Plan { thunks, last })
    }

    fn frame(&mut self, kind: &Kont) -> Frame {
        match kind {
            Kont::Halt => Frame::Halt,
            Kont::If { form, env } => Frame::If {
                form: self.expr(form),
                env: self.env(env),
            },
            Kont::Seq { form, next, env } => Frame::Seq {
                form: self.expr(form),
                next: *next,
                env: self.env(env),
            },
            Kont::SetVar { slot, env } => Frame::SetVar {
                slot: *slot,
                env: self.env(env),
            },
            Kont::Gather {
                form,
                next,
                acc,
                env,
            } => Frame::Gather {
                form: self.expr(form),
                next: *next,
                acc: self.value(acc),
                env: self.env(env),
            },
            Kont::LetrecInit { form, index, env } => Frame::LetrecInit {
                form: self.expr(form),
                index: *index,
                env: self.env(env),
            },
            Kont::AndOr { form, next, env } => Frame::AndOr {
                form: self.expr(form),
                next: *next,
                env: self.env(env),
            },
            Kont::QuasiCar { form, env } => Frame::QuasiCar {
                form: self.expr(form),
                env: self.env(env),
            },
            Kont::QuasiCdr { car, splice } => Frame::QuasiCdr {
                car: self.value(car),
                splice: *splice,
            },
            Kont::CatchHandler { form, env } => Frame::CatchHandler {
                form: self.expr(form),
                env: self.env(env),
            },
            Kont::Catch { handler } => Frame::Catch {
                handler: self.procedure(handler),
            },
            Kont::WindBody {
                before,
                thunk,
                after,
            } => Frame::WindBody {
                before: self.procedure(before),
                thunk: self.procedure(thunk),
                after: self.procedure(after),
            },
            Kont::Wind { before, after } => Frame::Wind {
                before: self.procedure(before),
                after: self.procedure(after),
            },
            Kont::Resume(Pending::Return(v)) => Frame::Resume {
                throw: false,
                value: self.value(v),
            },
            Kont::Resume(Pending::Throw(v)) => Frame::Resume {
                throw: true,
                value: self.value(v),
            },
            Kont::Transit { plan, next } => Frame::Transit {
                plan: self.plan(plan),
                next: *next,
            },
            Kont::DynamicInit { form, env } => Frame::DynamicInit {
                form: self.expr(form),
                env: self.env(env),
            },
            Kont::DynamicBind { name, cell } => Frame::DynamicBind {
                name: name.clone(),
                cell: self.var_box(cell),
            },
            Kont::Prompt => Frame::Prompt,
            Kont::Map {
                proc,
                lists,
                acc,
                collect,
            } => Frame::Map {
                proc: self.procedure(proc),
                lists: lists.iter().map(|l| self.value(l)).collect(),
                acc: self.value(acc),
                collect: *collect,
            },
        }
    }

    fn finish(mut self, root: Root) -> Snapshot {
        while let Some((id, cell)) = self.queue.pop() {
            let content = cell.get().map(|v| self.value(&v));
            if let Some(slot) = self.boxes.get_mut(id) {
                *slot = content;
            }
        }
        debug!(
            nodes = self.nodes.len(),
            boxes = self.boxes.len(),
            exprs = self.exprs.len(),
            "snapshot taken"
        );
        Snapshot {
            exprs: self.exprs,
            lambdas: self.lambdas,
            boxes: self.boxes,
            nodes: self.nodes,
            root,
        }
    }
}

enum Restored {
    Value(Value),
    Proc(Rc<Procedure>),
    Env(Env),
    Cont(Cont),
    Plan(Rc<Plan>),
}

struct Decoder<'a> {
    snapshot: &'a Snapshot,
    boxes: Vec<VarBox>,
    nodes: Vec<Restored>,
}

#[inline]
fn dangling(kind: &'static str, index: usize) -> SnapshotError {
    SnapshotError::Dangling { kind, index }
}

impl<'a> Decoder<'a> {
    fn run(snapshot: &'a Snapshot) -> Result<Self, SnapshotError> {
        let mut decoder = Decoder {
            snapshot,
            boxes: snapshot.boxes.iter().map(|_| VarBox::fresh()).collect(),
            nodes: Vec::with_capacity(snapshot.nodes.len()),
        };
        for (index, node) in snapshot.nodes.iter().enumerate() {
            let restored = decoder.node(index, node)?;
            decoder.nodes.push(restored);
        }
        for (cell, content) in decoder.boxes.iter().zip(&snapshot.boxes) {
            if let Some(v) = content {
                cell.set(decoder.value(v)?);
            }
        }
        debug!(nodes = decoder.nodes.len(), "snapshot restored");
        Ok(decoder)
    }

    fn value(&self, v: &Val) -> Result<Value, SnapshotError> {
        Ok(match v {
            Val::Nil => Value::Nil,
            Val::Unspecified => Value::Unspecified,
            Val::Bool(b) => Value::Bool(*b),
            Val::Num(n) => Value::Num(n.clone()),
            Val::Char(c) => Value::Char(*c),
            Val::Str(s) => Value::string(s),
            Val::Sym(s) => Value::Sym(s.clone()),
            Val::Node(i) => match self.nodes.get(*i) {
                Some(Restored::Value(v)) => v.clone(),
                Some(Restored::Proc(p)) => Value::Proc(p.clone()),
                _ => return Err(dangling("value", *i)),
            },
        })
    }

    fn values(&self, vs: &[Val]) -> Result<Vec<Value>, SnapshotError> {
        vs.iter().map(|v| self.value(v)).collect()
    }

    fn procedure(&self, i: usize) -> Result<Rc<Procedure>, SnapshotError> {
        match self.nodes.get(i) {
            Some(Restored::Proc(p)) => Ok(p.clone()),
            _ => Err(dangling("procedure", i)),
        }
    }

    fn env(&self, i: usize) -> Result<Env, SnapshotError> {
        match self.nodes.get(i) {
            Some(Restored::Env(env)) => Ok(env.clone()),
            _ => Err(dangling("environment", i)),
        }
    }

    fn cont(&self, i: usize) -> Result<Cont, SnapshotError> {
        match self.nodes.get(i) {
            Some(Restored::Cont(k)) => Ok(k.clone()),
            _ => Err(dangling("continuation", i)),
        }
    }

    fn plan(&self, i: usize) -> Result<Rc<Plan>, SnapshotError> {
        match self.nodes.get(i) {
            Some(Restored::Plan(plan)) => Ok(plan.clone()),
            _ => Err(dangling("plan", i)),
        }
    }

    fn var_box(&self, i: usize) -> Result<VarBox, SnapshotError> {
        self.boxes.get(i).cloned().ok_or(dangling("box", i))
    }

    fn expr(&self, i: usize) -> Result<ExprRef, SnapshotError> {
        self.snapshot
            .exprs
            .get(i)
            .cloned()
            .ok_or(dangling("expression", i))
    }

    fn lambda(&self, i: usize) -> Result<Rc<Lambda>, SnapshotError> {
        self.snapshot
            .lambdas
            .get(i)
            .cloned()
            .ok_or(dangling("lambda", i))
    }

    fn proc_node(proc: Procedure) -> Restored {
        Restored::Proc(Rc::new(proc))
    }

    fn node(&self, index: usize, node: &Node) -> Result<Restored, SnapshotError> {
        Ok(match node {
            Node::Pair(car, cdr) => Restored::Value(Value::cons(self.value(car)?, self.value(cdr)?)),
            Node::Condition {
                kind,
                message,
                irritants,
            } => Restored::Value(
                Condition::new(*kind, message.clone(), self.values(irritants)?).into(),
            ),
            Node::Closure { lambda, env } => Self::proc_node(Procedure::Closure {
                lambda: self.lambda(*lambda)?,
                env: self.env(*env)?,
            }),
            Node::Primitive(name) => {
                let prim = builtins::lookup(name)
                    .ok_or_else(|| SnapshotError::UnknownPrimitive(name.clone()))?;
                Self::proc_node(Procedure::Primitive(prim))
            }
            Node::Continuation(k) => Self::proc_node(Procedure::Continuation(self.cont(*k)?)),
            Node::Partial { top, mark } => {
                let partial = PartialContinuation::capture(&self.cont(*top)?, &self.cont(*mark)?)
                    .map_err(|_| dangling("partial continuation mark", *mark))?;
                Self::proc_node(Procedure::Partial(partial))
            }
            Node::Env(boxes) => Restored::Env(Env::from_boxes(
                boxes
                    .iter()
                    .map(|&b| self.var_box(b))
                    .collect::<Result<_, _>>()?,
            )),
            Node::Cont { frame, parent } => {
                let kind = self.frame(frame)?;
                Restored::Cont(match (kind, parent) {
                    (Kont::Halt, None) => Continuation::halt(),
                    (kind, Some(parent)) => Continuation::push(kind, self.cont(*parent)?),
                    (_, None) => return Err(dangling("continuation parent", index)),
                })
            }
            Node::Plan { thunks, last } => {
                let thunks = thunks
                    .iter()
                    .map(|&(proc, frame)| {
                        Ok(Thunk {
                            proc: self.procedure(proc)?,
                            frame: self.cont(frame)?,
                        })
                    })
                    .collect::<Result<_, SnapshotError>>()?;
                let action = match last {
                    Final::Return(v, k) => Action::Return(self.value(v)?, self.cont(*k)?),
                    Final::Throw(v, k) => Action::Throw(self.value(v)?, self.cont(*k)?),
                    Final::Call(proc, args, k) => Action::Call(
                        self.procedure(*proc)?,
                        self.values(args)?,
                        self.cont(*k)?,
                    ),
                };
                Restored::Plan(Rc::new(Plan { thunks, action }))
            }
        })
    }

    fn frame(&self, frame: &Frame) -> Result<Kont, SnapshotError> {
        Ok(match frame {
            Frame::Halt => Kont::Halt,
            Frame::If { form, env } => Kont::If {
                form: self.expr(*form)?,
                env: self.env(*env)?,
            },
            Frame::Seq { form, next, env } => Kont::Seq {
                form: self.expr(*form)?,
                next: *next,
                env: self.env(*env)?,
            },
            Frame::SetVar { slot, env } => Kont::SetVar {
                slot: *slot,
                env: self.env(*env)?,
            },
            Frame::Gather {
                form,
                next,
                acc,
                env,
            } => Kont::Gather {
                form: self.expr(*form)?,
                next: *next,
                acc: self.value(acc)?,
                env: self.env(*env)?,
            },
            Frame::LetrecInit { form, index, env } => Kont::LetrecInit {
                form: self.expr(*form)?,
                index: *index,
                env: self.env(*env)?,
            },
            Frame::AndOr { form, next, env } => Kont::AndOr {
                form: self.expr(*form)?,
                next: *next,
                env: self.env(*env)?,
            },
            Frame::QuasiCar { form, env } => Kont::QuasiCar {
                form: self.expr(*form)?,
                env: self.env(*env)?,
            },
            Frame::QuasiCdr { car, splice } => Kont::QuasiCdr {
                car: self.value(car)?,
                splice: *splice,
            },
            Frame::CatchHandler { form, env } => Kont::CatchHandler {
                form: self.expr(*form)?,
                env: self.env(*env)?,
            },
            Frame::Catch { handler } => Kont::Catch {
                handler: self.procedure(*handler)?,
            },
            Frame::WindBody {
                before,
                thunk,
                after,
            } => Kont::WindBody {
                before: self.procedure(*before)?,
                thunk: self.procedure(*thunk)?,
                after: self.procedure(*after)?,
            },
            Frame::Wind { before, after } => Kont::Wind {
                before: self.procedure(*before)?,
                after: self.procedure(*after)?,
            },
            Frame::Resume { throw: false, value } => Kont::Resume(Pending::Return(self.value(value)?)),
            Frame::Resume { throw: true, value } => Kont::Resume(Pending::Throw(self.value(value)?)),
            Frame::Transit { plan, next } => Kont::Transit {
                plan: self.plan(*plan)?,
                next: *next,
            },
            Frame::DynamicInit { form, env } => Kont::DynamicInit {
                form: self.expr(*form)?,
                env: self.env(*env)?,
            },
            Frame::DynamicBind { name, cell } => Kont::DynamicBind {
                name: name.clone(),
                cell: self.var_box(*cell)?,
            },
            Frame::Prompt => Kont::Prompt,
            Frame::Map {
                proc,
                lists,
                acc,
                collect,
            } => Kont::Map {
                proc: self.procedure(*proc)?,
                lists: Rc::from(self.values(lists)?),
                acc: self.value(acc)?,
                collect: *collect,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        eval::{Outcome, TopLevel},
        state::GlobalState,
    };

    fn toplevel() -> TopLevel {
        let (state, _) = GlobalState::with_transcript();
        TopLevel::new(state, None)
    }

    fn through_bytes(snapshot: Snapshot) -> Snapshot {
        let bytes = snapshot.to_bytes().unwrap();
        Snapshot::from_bytes(&bytes).unwrap()
    }

    fn global(top: &TopLevel, name: &str) -> Value {
        top.lookup(&Symbol::new(name)).unwrap()
    }

    #[test]
    fn closures_keep_sharing_their_boxes() {
        let mut top = toplevel();
        top.eval_str(
            "(define counter
               (let ((n 0))
                 (cons (lambda () (set! n (+ n 1)) n) (lambda () n))))",
        )
        .unwrap();
        let snapshot = through_bytes(Snapshot::of_value(&global(&top, "counter")));
        let restored = snapshot.restore_value().unwrap();

        let mut fresh = toplevel();
        fresh.define(Symbol::new("c"), restored);
        fresh.eval_str("((car c)) ((car c))").unwrap();
        assert_eq!(
            fresh.eval_str("((cdr c))").unwrap(),
            Outcome::Value(Value::int(2))
        );
        assert_eq!(
            top.eval_str("((cdr counter))").unwrap(),
            Outcome::Value(Value::int(0))
        );
    }

    #[test]
    fn recursive_closures_survive() {
        let mut top = toplevel();
        top.eval_str("(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))")
            .unwrap();
        let snapshot = through_bytes(Snapshot::of_value(&global(&top, "fact")));
        let mut fresh = toplevel();
        fresh.define(Symbol::new("f"), snapshot.restore_value().unwrap());
        assert_eq!(
            fresh.eval_str("(f 5)").unwrap(),
            Outcome::Value(Value::int(120))
        );
    }

    #[test]
    fn shared_pairs_stay_shared() {
        let mut top = toplevel();
        top.eval_str("(define x (let ((a (list 1 2))) (cons a a)))")
            .unwrap();
        let restored = through_bytes(Snapshot::of_value(&global(&top, "x")))
            .restore_value()
            .unwrap();
        let pair = restored.as_pair().unwrap();
        let (Value::Pair(a), Value::Pair(b)) = (pair.car(), pair.cdr()) else {
            panic!("expected two pairs");
        };
        assert!(Rc::ptr_eq(a, b));
    }

    #[test]
    fn suspended_computation_resumes_elsewhere() {
        let mut top = toplevel();
        let go = Symbol::new("go");
        top.eval_str("(define (f x) (* x (wait-signal 'go)))").unwrap();
        assert_eq!(
            top.eval_str("(+ 1 (f 10))").unwrap(),
            Outcome::Suspended(go.clone())
        );
        let bytes = top.snapshot(&go).unwrap().to_bytes().unwrap();

        let mut fresh = toplevel();
        fresh
            .resume_snapshot(go.clone(), &Snapshot::from_bytes(&bytes).unwrap())
            .unwrap();
        assert_eq!(
            fresh.post(&go, Value::int(4)).unwrap(),
            Outcome::Value(Value::int(41))
        );
        // The original is still waiting and unaffected.
        assert_eq!(
            top.post(&go, Value::int(2)).unwrap(),
            Outcome::Value(Value::int(21))
        );
    }

    #[test]
    fn suspended_inside_winds_and_handlers() {
        let mut top = toplevel();
        let go = Symbol::new("go");
        top.eval_str(
            "(define log '())
             (catch (lambda (e) (list 'caught e (reverse log)))
               (dynamic-wind
                 (lambda () (set! log (cons 'in log)))
                 (lambda () (throw (wait-signal 'go)))
                 (lambda () (set! log (cons 'out log)))))",
        )
        .unwrap();
        let snapshot = through_bytes(top.snapshot(&go).unwrap());
        let mut fresh = toplevel();
        fresh.resume_snapshot(go.clone(), &snapshot).unwrap();
        assert_eq!(
            fresh.post(&go, Value::sym("boom")).unwrap().to_string(),
            "(caught boom (in out))"
        );
    }

    #[test]
    fn deep_chains_encode_without_recursion() {
        let mut top = toplevel();
        let bottom = Symbol::new("bottom");
        top.eval_str(
            "(define (deep n) (if (= n 0) (wait-signal 'bottom) (+ 1 (deep (- n 1)))))
             (deep 50000)",
        )
        .unwrap();
        let snapshot = through_bytes(top.snapshot(&bottom).unwrap());
        let mut fresh = toplevel();
        fresh.resume_snapshot(bottom.clone(), &snapshot).unwrap();
        assert_eq!(
            fresh.post(&bottom, Value::int(0)).unwrap(),
            Outcome::Value(Value::int(50000))
        );
    }

    #[test]
    fn long_lists() {
        let list = Value::list((0..100_000).map(Value::int));
        let restored = through_bytes(Snapshot::of_value(&list)).restore_value().unwrap();
        assert_eq!(restored.to_vec().map(|xs| xs.len()), Some(100_000));
        assert_eq!(restored, list);
    }

    #[test]
    fn partial_continuations_survive() {
        let mut top = toplevel();
        top.eval_str("(define k (reset (* 2 (shift (lambda (k) k)))))")
            .unwrap();
        let snapshot = through_bytes(Snapshot::of_value(&global(&top, "k")));
        let mut fresh = toplevel();
        fresh.define(Symbol::new("k"), snapshot.restore_value().unwrap());
        assert_eq!(
            fresh.eval_str("(+ 1 (k 5))").unwrap(),
            Outcome::Value(Value::int(11))
        );
    }

    #[test]
    fn root_kind_is_checked() {
        let snapshot = Snapshot::of_value(&Value::int(1));
        assert!(matches!(
            snapshot.restore_continuation(),
            Err(SnapshotError::Root("continuation"))
        ));
        assert_eq!(snapshot.restore_value().unwrap(), Value::int(1));
    }

    #[test]
    fn corrupt_snapshots_are_rejected() {
        let unknown = Snapshot {
            exprs: vec![],
            lambdas: vec![],
            boxes: vec![],
            nodes: vec![Node::Primitive("no-such-thing".into())],
            root: Root::Value(Val::Node(0)),
        };
        assert!(matches!(
            unknown.restore_value(),
            Err(SnapshotError::UnknownPrimitive(name)) if name == "no-such-thing"
        ));
        let dangling = Snapshot {
            exprs: vec![],
            lambdas: vec![],
            boxes: vec![],
            nodes: vec![Node::Pair(Val::Nil, Val::Node(7))],
            root: Root::Value(Val::Node(0)),
        };
        assert!(matches!(
            dangling.restore_value(),
            Err(SnapshotError::Dangling { kind: "value", index: 7 })
        ));
    }
}
