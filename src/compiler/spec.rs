use std::collections::BTreeSet;

use crate::symbol::Symbol;

/// The free variables an expression requires from its surroundings.
///
/// Only exists at compile time. Iteration order is deterministic, which fixes
/// the slot order of capture sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvSpec(BTreeSet<Symbol>);

impl EnvSpec {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of<I: IntoIterator<Item = Symbol>>(names: I) -> Self {
        Self(names.into_iter().collect())
    }

    #[inline]
    pub fn single(name: Symbol) -> Self {
        Self::of([name])
    }

    pub fn union(mut self, other: &EnvSpec) -> Self {
        self.0.extend(other.0.iter().cloned());
        self
    }

    pub fn union_all<'a, I: IntoIterator<Item = &'a EnvSpec>>(specs: I) -> Self {
        specs
            .into_iter()
            .fold(Self::empty(), |acc, spec| acc.union(spec))
    }

    pub fn difference(&self, other: &EnvSpec) -> Self {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    pub fn intersection(&self, other: &EnvSpec) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn without<'a, I: IntoIterator<Item = &'a Symbol>>(mut self, names: I) -> Self {
        for name in names {
            self.0.remove(name);
        }
        self
    }

    #[inline]
    pub fn contains(&self, name: &Symbol) -> bool {
        self.0.contains(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.0.iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    fn arb_spec() -> impl Strategy<Value = EnvSpec> {
        prop::collection::vec("[a-e]", 0..6)
            .prop_map(|names| EnvSpec::of(names.iter().map(Symbol::new)))
    }

    proptest! {
        #[test]
        fn difference_then_union_restores(a in arb_spec(), b in arb_spec()) {
            let split = a.difference(&b).union(&a.intersection(&b));
            prop_assert_eq!(split, a);
        }

        #[test]
        fn difference_is_disjoint(a in arb_spec(), b in arb_spec()) {
            prop_assert!(a.difference(&b).intersection(&b).is_empty());
        }
    }

    #[test]
    fn without_removes_names() {
        let spec = EnvSpec::of(["x", "y", "z"].map(Symbol::new));
        let params = [Symbol::new("y")];
        let rest = spec.without(&params);
        assert_eq!(rest.iter().map(Symbol::name).collect::<Vec<_>>(), ["x", "z"]);
    }
}
