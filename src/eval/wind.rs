//! Continuation transitions: leaving and entering `dynamic-wind` extents on
//! the way from one chain to another.

use std::rc::Rc;

use tracing::debug;

use crate::{
    error::ReductionError,
    eval::{
        cont::{Cont, Continuation, Kont},
        procedure::Procedure,
        step::Step,
    },
    value::Value,
};

/// What to do at the destination once every thunk has run.
#[derive(Clone)]
pub enum Action {
    Return(Value, Cont),
    Throw(Value, Cont),
    Call(Rc<Procedure>, Vec<Value>, Cont),
}

impl Action {
    fn to_step(&self) -> Step {
        match self {
            Action::Return(v, k) => Step::Return(v.clone(), k.clone()),
            Action::Throw(v, k) => Step::Throw(v.clone(), k.clone()),
            Action::Call(proc, args, k) => Step::Call(proc.clone(), args.clone(), k.clone()),
        }
    }

    fn target(&self) -> &Cont {
        match self {
            Action::Return(_, k) | Action::Throw(_, k) | Action::Call(_, _, k) => k,
        }
    }

    fn remap(&self, f: &mut dyn FnMut(&Cont) -> Cont) -> Action {
        match self {
            Action::Return(v, k) => Action::Return(v.clone(), f(k)),
            Action::Throw(v, k) => Action::Throw(v.clone(), f(k)),
            Action::Call(proc, args, k) => Action::Call(proc.clone(), args.clone(), f(k)),
        }
    }
}

/// A wind thunk and the frame it runs in: the parent of its wind node.
#[derive(Clone)]
pub struct Thunk {
    pub proc: Rc<Procedure>,
    pub frame: Cont,
}

/// The ordered thunks of one transition followed by its final action.
pub struct Plan {
    pub thunks: Vec<Thunk>,
    pub action: Action,
}

impl Plan {
    pub(crate) fn conts(&self) -> Vec<&Cont> {
        self.thunks
            .iter()
            .map(|t| &t.frame)
            .chain(std::iter::once(self.action.target()))
            .collect()
    }

    pub(crate) fn remap(&self, f: &mut dyn FnMut(&Cont) -> Cont) -> Plan {
        Plan {
            thunks: self
                .thunks
                .iter()
                .map(|t| Thunk {
                    proc: t.proc.clone(),
                    frame: f(&t.frame),
                })
                .collect(),
            action: self.action.remap(f),
        }
    }
}

/// Lowest common ancestor of two chains, by walking the deeper one up to the
/// same depth and then both in lock step. `None` if they share no root.
pub fn common_ancestor(a: &Cont, b: &Cont) -> Option<Cont> {
    let (mut a, mut b) = (a.clone(), b.clone());
    while a.depth() > b.depth() {
        a = a.parent()?.clone();
    }
    while b.depth() > a.depth() {
        b = b.parent()?.clone();
    }
    loop {
        if Rc::ptr_eq(&a, &b) {
            return Some(a);
        }
        a = a.parent()?.clone();
        b = b.parent()?.clone();
    }
}

/// Wind thunks crossed walking from `from` up to `stop`, innermost first.
fn crossed(
    from: &Cont,
    stop: Option<&Cont>,
    pick: fn(&Continuation) -> Option<&Rc<Procedure>>,
) -> Result<Vec<Thunk>, ReductionError> {
    let mut thunks = vec![];
    let mut cur = Some(from);
    while let Some(node) = cur {
        if stop.is_some_and(|stop| Rc::ptr_eq(stop, node)) {
            break;
        }
        if let Some(proc) = pick(node) {
            let frame = node
                .parent()
                .ok_or(ReductionError::Orphan(node.kind().name()))?;
            thunks.push(Thunk {
                proc: proc.clone(),
                frame: frame.clone(),
            });
        }
        cur = node.parent();
    }
    Ok(thunks)
}

/// Moves control from `origin` to the destination of `action`: exit thunks
/// of the extents being left run innermost first, then entry thunks of the
/// extents being entered outermost first, then the action itself.
pub fn transition(origin: &Cont, action: Action) -> Result<Step, ReductionError> {
    let dest = action.target();
    let ancestor = common_ancestor(origin, dest);
    let mut thunks = crossed(origin, ancestor.as_ref(), Continuation::exit_proc)?;
    let exits = thunks.len();
    let mut entries = crossed(dest, ancestor.as_ref(), Continuation::entry_proc)?;
    entries.reverse();
    thunks.extend(entries);
    if thunks.is_empty() {
        return Ok(action.to_step());
    }
    debug!(exits, entries = thunks.len() - exits, "continuation transition");
    Ok(proceed(&Rc::new(Plan { thunks, action }), 0))
}

/// Runs thunk `next` of `plan`, or the final action when none remain.
pub(crate) fn proceed(plan: &Rc<Plan>, next: usize) -> Step {
    match plan.thunks.get(next) {
        Some(thunk) => {
            let k = Continuation::push(
                Kont::Transit {
                    plan: plan.clone(),
                    next: next + 1,
                },
                thunk.frame.clone(),
            );
            Step::Call(thunk.proc.clone(), vec![], k)
        }
        None => plan.action.to_step(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn prompt(parent: &Cont) -> Cont {
        Continuation::push(Kont::Prompt, parent.clone())
    }

    #[test]
    fn ancestor_of_uneven_branches() {
        let root = Continuation::halt();
        let shared = prompt(&prompt(&root));
        let left = prompt(&prompt(&prompt(&shared)));
        let right = prompt(&shared);
        let found = common_ancestor(&left, &right).unwrap();
        assert!(Rc::ptr_eq(&found, &shared));
        assert!(Rc::ptr_eq(&common_ancestor(&left, &shared).unwrap(), &shared));
    }

    #[test]
    fn unrelated_chains_have_no_ancestor() {
        let a = prompt(&Continuation::halt());
        let b = prompt(&prompt(&Continuation::halt()));
        assert!(common_ancestor(&a, &b).is_none());
    }

    #[test]
    fn transition_without_winds_is_direct() {
        let root = Continuation::halt();
        let origin = prompt(&root);
        let step = transition(&origin, Action::Return(Value::int(7), root.clone())).unwrap();
        assert!(matches!(step, Step::Return(v, k) if v == Value::int(7) && Rc::ptr_eq(&k, &root)));
    }
}
