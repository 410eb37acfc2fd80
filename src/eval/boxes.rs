use std::{cell::RefCell, rc::Rc};

use crate::value::Value;

/// A mutable variable cell, possibly not yet initialized.
///
/// Boxes are shared by reference: every frame and closure that captured the
/// same variable holds the same box and sees the same writes.
#[derive(Clone, Default)]
pub struct VarBox(Rc<RefCell<Option<Value>>>);

impl VarBox {
    /// An uninitialized box, as allocated for `letrec` bindings before their
    /// initializers run.
    #[inline]
    pub fn fresh() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with(value: Value) -> Self {
        Self(Rc::new(RefCell::new(Some(value))))
    }

    /// `None` if nothing has been written yet.
    #[inline]
    pub fn get(&self) -> Option<Value> {
        self.0.borrow().clone()
    }

    #[inline]
    pub fn set(&self, value: Value) {
        *self.0.borrow_mut() = Some(value);
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.0.borrow().is_some()
    }

    #[inline]
    pub fn ptr_eq(&self, other: &VarBox) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Empties the box if no other frame holds it.
    pub(crate) fn take_if_unique(&mut self) -> Option<Value> {
        Rc::get_mut(&mut self.0).and_then(|cell| cell.get_mut().take())
    }

    /// Identity key, stable while the box is alive.
    #[inline]
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shared_writes_are_visible() {
        let a = VarBox::fresh();
        let b = a.clone();
        assert!(a.get().is_none());
        b.set(Value::int(3));
        assert!(a.is_bound());
        assert_eq!(a.get(), Some(Value::int(3)));
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&VarBox::fresh()));
    }
}
