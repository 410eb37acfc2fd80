//! Freeing guest heap graphs without native recursion.
//!
//! Values, closures, frames and continuation chains own each other through
//! `Rc`s, so a plain drop of a deep structure recurses once per level. Every
//! `Drop` impl on that path instead empties its node into a [`Reclaim`]
//! worklist, which takes apart whatever it owns alone one node at a time.

use std::{mem, rc::Rc};

use crate::{
    eval::{
        cont::{Cont, Continuation, Kont, Pending},
        env::Env,
        wind::{Action, Plan},
    },
    value::Value,
};

enum Node {
    Value(Value),
    Cont(Cont),
}

/// A worklist of uniquely owned heap nodes.
///
/// Shared nodes are never queued: dropping them only decrements a count.
#[derive(Default)]
pub(crate) struct Reclaim(Vec<Node>);

impl Reclaim {
    pub(crate) fn value(&mut self, v: Value) {
        let unique = match &v {
            Value::Pair(rc) => Rc::strong_count(rc) == 1,
            Value::Proc(rc) => Rc::strong_count(rc) == 1,
            Value::Condition(rc) => Rc::strong_count(rc) == 1,
            _ => false,
        };
        if unique {
            self.0.push(Node::Value(v));
        }
    }

    pub(crate) fn values<I: IntoIterator<Item = Value>>(&mut self, vs: I) {
        vs.into_iter().for_each(|v| self.value(v));
    }

    pub(crate) fn cont(&mut self, k: Cont) {
        if Rc::strong_count(&k) == 1 {
            self.0.push(Node::Cont(k));
        }
    }

    /// Empties the boxes of `env` that nothing else refers to.
    pub(crate) fn env(&mut self, env: &mut Env) {
        if let Some(boxes) = env.boxes_mut() {
            for cell in boxes {
                if let Some(v) = cell.take_if_unique() {
                    self.value(v);
                }
            }
        }
    }

    fn kont(&mut self, kind: Kont) {
        match kind {
            Kont::Halt | Kont::Prompt => {}
            Kont::If { mut env, .. }
            | Kont::SetVar { mut env, .. }
            | Kont::Seq { mut env, .. }
            | Kont::LetrecInit { mut env, .. }
            | Kont::AndOr { mut env, .. }
            | Kont::QuasiCar { mut env, .. }
            | Kont::CatchHandler { mut env, .. }
            | Kont::DynamicInit { mut env, .. } => self.env(&mut env),
            Kont::Gather { acc, mut env, .. } => {
                self.value(acc);
                self.env(&mut env);
            }
            Kont::QuasiCdr { car, .. } => self.value(car),
            Kont::Catch { handler } => self.value(Value::Proc(handler)),
            Kont::WindBody {
                before,
                thunk,
                after,
            } => self.values([before, thunk, after].map(Value::Proc)),
            Kont::Wind { before, after } => self.values([before, after].map(Value::Proc)),
            Kont::Resume(Pending::Return(v) | Pending::Throw(v)) => self.value(v),
            Kont::Transit { plan, .. } => {
                if let Ok(plan) = Rc::try_unwrap(plan) {
                    self.plan(plan);
                }
            }
            Kont::DynamicBind { mut cell, .. } => {
                if let Some(v) = cell.take_if_unique() {
                    self.value(v);
                }
            }
            Kont::Map {
                proc,
                mut lists,
                acc,
                ..
            } => {
                self.value(Value::Proc(proc));
                self.value(acc);
                if let Some(lists) = Rc::get_mut(&mut lists) {
                    self.values(lists.iter_mut().map(|v| mem::replace(v, Value::Nil)));
                }
            }
        }
    }

    fn plan(&mut self, plan: Plan) {
        for thunk in plan.thunks {
            self.value(Value::Proc(thunk.proc));
            self.cont(thunk.frame);
        }
        match plan.action {
            Action::Return(v, k) | Action::Throw(v, k) => {
                self.value(v);
                self.cont(k);
            }
            Action::Call(proc, args, k) => {
                self.value(Value::Proc(proc));
                self.values(args);
                self.cont(k);
            }
        }
    }

    /// Takes the contents of one continuation frame.
    pub(crate) fn frame(&mut self, k: &mut Continuation) {
        let (kind, parent) = k.take_contents();
        if let Some(parent) = parent {
            self.cont(parent);
        }
        self.kont(kind);
    }

    /// Frees everything queued. Each node is emptied before it is dropped,
    /// so its own `Drop` finds nothing left to walk.
    pub(crate) fn run(mut self) {
        while let Some(node) = self.0.pop() {
            match node {
                Node::Value(Value::Pair(rc)) => {
                    if let Ok(mut pair) = Rc::try_unwrap(rc) {
                        let (car, cdr) = pair.take_fields();
                        self.value(car);
                        self.value(cdr);
                    }
                }
                Node::Value(Value::Proc(mut rc)) => {
                    if let Some(proc) = Rc::get_mut(&mut rc) {
                        proc.release_into(&mut self);
                    }
                }
                Node::Value(Value::Condition(mut rc)) => {
                    if let Some(condition) = Rc::get_mut(&mut rc) {
                        self.values(condition.irritants.drain(..));
                    }
                }
                Node::Value(_) => {}
                Node::Cont(mut rc) => {
                    if let Some(k) = Rc::get_mut(&mut rc) {
                        self.frame(k);
                    }
                }
            }
        }
    }
}
