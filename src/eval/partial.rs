use std::collections::{HashMap, HashSet};

use crate::{
    error::ReductionError,
    eval::cont::{Cont, Continuation},
};

/// The frames of a chain above a mark, detached from whatever lies below it.
///
/// Attaching rebuilds those frames over a new base. The rebuild is a graph
/// copy: a frame reached along several paths (its parent link and the
/// continuations held inside transition frames) is copied once and shared
/// again in the result.
#[derive(Clone)]
pub struct PartialContinuation {
    top: Cont,
    mark: Cont,
}

impl PartialContinuation {
    /// Fails if `mark` is not on the chain starting at `top`.
    pub fn capture(top: &Cont, mark: &Cont) -> Result<Self, ReductionError> {
        if top.depth() < mark.depth() {
            return Err(ReductionError::MarkNotFound);
        }
        let mut cur = top;
        while cur.depth() > mark.depth() {
            cur = cur.parent().ok_or(ReductionError::MarkNotFound)?;
        }
        if !std::rc::Rc::ptr_eq(cur, mark) {
            return Err(ReductionError::MarkNotFound);
        }
        Ok(Self {
            top: top.clone(),
            mark: mark.clone(),
        })
    }

    #[inline]
    pub fn top(&self) -> &Cont {
        &self.top
    }

    pub(crate) fn top_mut(&mut self) -> Option<&mut Continuation> {
        std::rc::Rc::get_mut(&mut self.top)
    }

    #[inline]
    pub fn mark(&self) -> &Cont {
        &self.mark
    }

    /// Number of detached frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.top.depth() - self.mark.depth()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds the detached frames with `base` in place of the mark.
    ///
    /// A frame is copied if the mark is among its ancestors; anything else it
    /// refers to is kept as is. The traversal keeps its own stack, so chain
    /// length never turns into native recursion.
    pub fn attach(&self, base: Cont) -> Result<Cont, ReductionError> {
        let mut copied: HashMap<usize, Cont> = HashMap::new();
        let mut outside: HashSet<usize> = HashSet::new();
        copied.insert(self.mark.addr(), base);

        let mut stack = vec![self.top.clone()];
        while let Some(node) = stack.last().cloned() {
            let addr = node.addr();
            if copied.contains_key(&addr) || outside.contains(&addr) {
                stack.pop();
                continue;
            }
            let Some(parent) = node.parent() else {
                outside.insert(addr);
                stack.pop();
                continue;
            };
            let parent_addr = parent.addr();
            if outside.contains(&parent_addr) {
                outside.insert(addr);
                stack.pop();
                continue;
            }
            let Some(new_parent) = copied.get(&parent_addr).cloned() else {
                stack.push(parent.clone());
                continue;
            };
            let unresolved = node
                .kind()
                .conts()
                .into_iter()
                .find(|c| !copied.contains_key(&c.addr()) && !outside.contains(&c.addr()))
                .cloned();
            if let Some(dep) = unresolved {
                stack.push(dep);
                continue;
            }
            let kind = node
                .kind()
                .remap(&mut |c| copied.get(&c.addr()).cloned().unwrap_or_else(|| c.clone()));
            copied.insert(addr, Continuation::push(kind, new_parent));
            stack.pop();
        }
        copied
            .get(&self.top.addr())
            .cloned()
            .ok_or(ReductionError::MarkNotFound)
    }
}

#[cfg(test)]
mod test {
    use std::rc::Rc;

    use super::*;
    use crate::{
        eval::{
            cont::Kont,
            procedure::Procedure,
            wind::{Action, Plan, Thunk},
        },
        value::Value,
    };

    fn prompt(parent: &Cont) -> Cont {
        Continuation::push(Kont::Prompt, parent.clone())
    }

    #[test]
    fn attach_rebuilds_above_new_base() {
        let root = Continuation::halt();
        let mark = prompt(&root);
        let top = prompt(&prompt(&mark));
        let partial = PartialContinuation::capture(&top, &mark).unwrap();
        assert_eq!(partial.len(), 2);

        let base = prompt(&prompt(&Continuation::halt()));
        let attached = partial.attach(base.clone()).unwrap();
        assert_eq!(attached.depth(), base.depth() + 2);
        let below = attached.parent().unwrap().parent().unwrap();
        assert!(Rc::ptr_eq(below, &base));
        assert!(!Rc::ptr_eq(&attached, &top));
    }

    #[test]
    fn mark_must_be_on_the_chain() {
        let top = prompt(&Continuation::halt());
        let stranger = prompt(&Continuation::halt());
        assert!(matches!(
            PartialContinuation::capture(&top, &stranger),
            Err(ReductionError::MarkNotFound)
        ));
    }

    #[test]
    fn shared_frames_stay_shared() {
        let root = Continuation::halt();
        let mark = prompt(&root);
        let inner = prompt(&mark);
        let thunk = Rc::new(Procedure::Continuation(root.clone()));
        // A transition frame whose thunk frame and destination are both
        // `inner`, which is also its parent.
        let plan = Rc::new(Plan {
            thunks: vec![Thunk {
                proc: thunk,
                frame: inner.clone(),
            }],
            action: Action::Return(Value::Nil, inner.clone()),
        });
        let top = Continuation::push(Kont::Transit { plan, next: 0 }, inner.clone());

        let partial = PartialContinuation::capture(&top, &mark).unwrap();
        let attached = partial.attach(prompt(&Continuation::halt())).unwrap();
        let Kont::Transit { plan, .. } = attached.kind() else {
            panic!("expected a transition frame");
        };
        let parent = attached.parent().unwrap();
        assert!(Rc::ptr_eq(&plan.thunks[0].frame, parent));
        assert!(plan.conts().iter().all(|c| Rc::ptr_eq(c, parent)));
        assert!(!Rc::ptr_eq(parent, &inner));
    }

    #[test]
    fn references_below_the_mark_are_kept() {
        let root = Continuation::halt();
        let mark = prompt(&root);
        let plan = Rc::new(Plan {
            thunks: vec![],
            action: Action::Return(Value::Nil, root.clone()),
        });
        let top = Continuation::push(Kont::Transit { plan, next: 0 }, mark.clone());
        let attached = PartialContinuation::capture(&top, &mark)
            .unwrap()
            .attach(prompt(&Continuation::halt()))
            .unwrap();
        let Kont::Transit { plan, .. } = attached.kind() else {
            panic!("expected a transition frame");
        };
        assert!(Rc::ptr_eq(plan.conts()[0], &root));
    }

    #[test]
    fn long_segments_attach_without_recursion() {
        let mark = prompt(&Continuation::halt());
        let mut top = mark.clone();
        for _ in 0..200_000 {
            top = prompt(&top);
        }
        let partial = PartialContinuation::capture(&top, &mark).unwrap();
        let attached = partial.attach(Continuation::halt()).unwrap();
        assert_eq!(attached.depth(), 200_000);
    }
}
