use std::rc::Rc;

use crate::{error::ReductionError, eval::boxes::VarBox, value::Value};

/// A lexical frame: a fixed-length sequence of boxes.
///
/// Frames are never resized. Every "extend" builds a new frame from a selected
/// subset of this one's boxes (by index mapping) followed by new boxes, so the
/// shape always matches the descriptor the reading expressions were compiled
/// against.
#[derive(Clone)]
pub struct Env(Rc<[VarBox]>);

impl Env {
    pub fn empty() -> Self {
        Self(Rc::from(Vec::new()))
    }

    /// A root frame with one initialized box per value.
    pub fn root<I: IntoIterator<Item = Value>>(values: I) -> Self {
        Self(values.into_iter().map(VarBox::with).collect())
    }

    pub(crate) fn from_boxes(boxes: Vec<VarBox>) -> Self {
        Self(Rc::from(boxes))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn boxes(&self) -> &[VarBox] {
        &self.0
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// The boxes, if no other frame or closure shares this one.
    pub(crate) fn boxes_mut(&mut self) -> Option<&mut [VarBox]> {
        Rc::get_mut(&mut self.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn slot(&self, slot: usize) -> Result<&VarBox, ReductionError> {
        self.0.get(slot).ok_or(ReductionError::Shape {
            slot,
            len: self.0.len(),
        })
    }

    /// Reads a slot. `Ok(None)` means the box exists but was never written,
    /// which the caller turns into a guest `unbound-variable` condition.
    #[inline]
    pub fn lookup(&self, slot: usize) -> Result<Option<Value>, ReductionError> {
        Ok(self.slot(slot)?.get())
    }

    #[inline]
    pub fn assign(&self, slot: usize, value: Value) -> Result<(), ReductionError> {
        self.slot(slot)?.set(value);
        Ok(())
    }

    fn select(&self, mapping: &[usize], extra: usize) -> Result<Vec<VarBox>, ReductionError> {
        let mut boxes = Vec::with_capacity(mapping.len() + extra);
        for &i in mapping {
            boxes.push(self.slot(i)?.clone());
        }
        Ok(boxes)
    }

    /// Only the mapped boxes, shared with this frame.
    pub fn capture(&self, mapping: &[usize]) -> Result<Env, ReductionError> {
        Ok(Self::from_boxes(self.select(mapping, 0)?))
    }

    /// Mapped boxes followed by `count` uninitialized ones.
    pub fn extend_fresh(&self, mapping: &[usize], count: usize) -> Result<Env, ReductionError> {
        let mut boxes = self.select(mapping, count)?;
        boxes.extend((0..count).map(|_| VarBox::fresh()));
        Ok(Self::from_boxes(boxes))
    }

    /// Mapped boxes followed by one new box per value.
    pub fn extend_values<I>(&self, mapping: &[usize], values: I) -> Result<Env, ReductionError>
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: ExactSizeIterator,
    {
        let values = values.into_iter();
        let mut boxes = self.select(mapping, values.len())?;
        boxes.extend(values.map(VarBox::with));
        Ok(Self::from_boxes(boxes))
    }

    /// This whole frame followed by existing boxes, keeping their identity.
    pub fn extend_boxes(&self, extra: &[VarBox]) -> Env {
        let mut boxes = Vec::with_capacity(self.len() + extra.len());
        boxes.extend_from_slice(&self.0);
        boxes.extend_from_slice(extra);
        Self::from_boxes(boxes)
    }

    /// This whole frame followed by one new box per value. Used when calling a
    /// closure, whose captured frame is already exactly its capture set.
    pub fn append_values<I: IntoIterator<Item = Value>>(&self, values: I) -> Env {
        let mut boxes = self.0.to_vec();
        boxes.extend(values.into_iter().map(VarBox::with));
        Self::from_boxes(boxes)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extend_shares_selected_boxes() {
        let outer = Env::root([Value::int(1), Value::int(2), Value::int(3)]);
        let inner = outer.extend_values(&[2, 0], [Value::int(9)]).unwrap();
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.lookup(0).unwrap(), Some(Value::int(3)));
        assert_eq!(inner.lookup(2).unwrap(), Some(Value::int(9)));

        inner.assign(1, Value::int(10)).unwrap();
        assert_eq!(outer.lookup(0).unwrap(), Some(Value::int(10)));
    }

    #[test]
    fn fresh_boxes_start_unbound() {
        let outer = Env::root([Value::int(1)]);
        let rec = outer.extend_fresh(&[0], 2).unwrap();
        assert_eq!(rec.lookup(1).unwrap(), None);
        rec.assign(1, Value::Bool(true)).unwrap();
        assert_eq!(rec.lookup(1).unwrap(), Some(Value::Bool(true)));
    }

    #[test]
    fn extend_boxes_keeps_identity() {
        let shared = VarBox::with(Value::int(0));
        let env = Env::empty().extend_boxes(std::slice::from_ref(&shared));
        shared.set(Value::int(5));
        assert_eq!(env.lookup(0).unwrap(), Some(Value::int(5)));
    }

    #[test]
    fn shape_mismatch_is_fatal() {
        let env = Env::root([Value::int(1)]);
        assert!(matches!(
            env.lookup(3),
            Err(ReductionError::Shape { slot: 3, len: 1 })
        ));
        assert!(env.capture(&[0, 1]).is_err());
    }
}
