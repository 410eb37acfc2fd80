use indexmap::IndexMap;

use crate::{compiler::spec::EnvSpec, error::CompileError, symbol::Symbol};

/// Compile-time picture of a runtime frame: which symbol lives in which slot.
///
/// A descriptor is only valid for frames built by the same sequence of
/// extensions. Compiled expressions keep the slot numbers and forget the
/// names.
#[derive(Clone, Debug, Default)]
pub struct EnvDesc {
    slots: IndexMap<Symbol, Binding>,
    len: usize,
}

/// Where a name lives, and whether it is a top-level definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub slot: usize,
    pub global: bool,
}

impl EnvDesc {
    pub fn root<I: IntoIterator<Item = Symbol>>(names: I) -> Self {
        let mut desc = Self::default();
        desc.push_all(names, false);
        desc
    }

    /// A root descriptor whose names are top-level definitions.
    pub fn globals<I: IntoIterator<Item = Symbol>>(names: I) -> Self {
        let mut desc = Self::default();
        desc.push_all(names, true);
        desc
    }

    fn push_all<I: IntoIterator<Item = Symbol>>(&mut self, names: I, global: bool) {
        for name in names {
            // A later binding of the same name shadows the earlier slot.
            self.slots.shift_remove(&name);
            let slot = self.len;
            self.slots.insert(name, Binding { slot, global });
            self.len += 1;
        }
    }

    /// Number of slots in the frames this describes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn binding(&self, name: &Symbol) -> Option<Binding> {
        self.slots.get(name).copied()
    }

    #[inline]
    pub fn slot(&self, name: &Symbol) -> Option<usize> {
        self.binding(name).map(|b| b.slot)
    }

    pub fn resolve(&self, name: &Symbol) -> Result<Binding, CompileError> {
        self.binding(name)
            .ok_or_else(|| CompileError::Unbound(name.clone()))
    }

    /// Visible names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &Symbol> {
        self.slots.keys()
    }

    /// Appends new names after every existing slot.
    pub fn extend(&self, names: &[Symbol]) -> EnvDesc {
        let mut desc = self.clone();
        desc.push_all(names.iter().cloned(), false);
        desc
    }

    /// Appends top-level definitions, as the interactive top level does when
    /// it meets a name for the first time.
    pub(crate) fn extend_globals(&mut self, names: &[Symbol]) {
        self.push_all(names.iter().cloned(), true);
    }

    /// Builds the descriptor of an inner scope that binds `names` and needs
    /// `required` from its surroundings. Only the required outer names are
    /// carried over; the returned mapping lists their slots in this frame, in
    /// the order the inner frame holds them.
    pub fn shadow_extend(
        &self,
        required: &EnvSpec,
        names: &[Symbol],
    ) -> Result<(EnvDesc, Vec<usize>), CompileError> {
        let captured = required.clone().without(names);
        let mut desc = EnvDesc::default();
        let mut mapping = Vec::with_capacity(captured.len());
        for name in captured.iter() {
            let outer = self.resolve(name)?;
            mapping.push(outer.slot);
            desc.push_all([name.clone()], outer.global);
        }
        desc.push_all(names.iter().cloned(), false);
        Ok((desc, mapping))
    }

    /// `shadow_extend` over the union of several requirement sets, for scopes
    /// such as `letrec` and named loops where the new names are visible to
    /// more than one sub-expression.
    pub fn subset_shadow_extend(
        &self,
        parts: &[&EnvSpec],
        names: &[Symbol],
    ) -> Result<(EnvDesc, Vec<usize>), CompileError> {
        let required = EnvSpec::union_all(parts.iter().copied());
        self.shadow_extend(&required, names)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(Symbol::new).collect()
    }

    #[test]
    fn extend_appends_and_shadows() {
        let desc = EnvDesc::root(syms(&["a", "b"]));
        let inner = desc.extend(&syms(&["a"]));
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.slot(&Symbol::new("a")), Some(2));
        assert_eq!(inner.slot(&Symbol::new("b")), Some(1));
    }

    #[test]
    fn shadow_extend_captures_only_required() {
        let desc = EnvDesc::root(syms(&["a", "b", "c", "d"]));
        let required = EnvSpec::of(syms(&["d", "b", "x"]));
        let (inner, mapping) = desc.shadow_extend(&required, &syms(&["x"])).unwrap();
        assert_eq!(mapping, vec![1, 3]);
        assert_eq!(inner.len(), 3);
        assert_eq!(inner.slot(&Symbol::new("b")), Some(0));
        assert_eq!(inner.slot(&Symbol::new("d")), Some(1));
        assert_eq!(inner.slot(&Symbol::new("x")), Some(2));
        assert_eq!(inner.slot(&Symbol::new("a")), None);
    }

    #[test]
    fn globals_stay_global_through_captures() {
        let desc = EnvDesc::globals(syms(&["car", "x"]));
        let required = EnvSpec::of(syms(&["car", "x"]));
        let (inner, _) = desc.shadow_extend(&required, &syms(&["x"])).unwrap();
        assert_eq!(
            inner.binding(&Symbol::new("car")),
            Some(Binding { slot: 0, global: true })
        );
        assert_eq!(
            inner.binding(&Symbol::new("x")),
            Some(Binding { slot: 1, global: false })
        );
    }

    #[test]
    fn missing_requirement_is_unbound() {
        let desc = EnvDesc::root(syms(&["a"]));
        let required = EnvSpec::of(syms(&["zz"]));
        assert_eq!(
            desc.shadow_extend(&required, &[]).unwrap_err(),
            CompileError::Unbound(Symbol::new("zz"))
        );
    }

    #[test]
    fn subset_shadow_extend_unions_parts() {
        let desc = EnvDesc::root(syms(&["f", "g", "h"]));
        let init = EnvSpec::of(syms(&["loop", "g"]));
        let body = EnvSpec::of(syms(&["h"]));
        let (inner, mapping) = desc
            .subset_shadow_extend(&[&init, &body], &syms(&["loop"]))
            .unwrap();
        assert_eq!(mapping, vec![1, 2]);
        assert_eq!(inner.slot(&Symbol::new("loop")), Some(2));
    }
}
