//! Two-pass lowering: `requirements` computes free variables bottom-up, then
//! `compile` resolves every name against an `EnvDesc` and erases it into a
//! slot index.

pub mod analyze;
pub mod desc;
pub mod source;
pub mod spec;

use crate::{
    error::CompileError,
    eval::{env::Env, expr::ExprRef},
    symbol::Symbol,
    value::Value,
};

use self::{desc::EnvDesc, source::Source};

/// Compiles `source` against a root frame built from `bindings`.
///
/// Only the bindings the expression actually requires go into the returned
/// root environment; a requirement missing from `bindings` is an error.
pub fn compile<I>(bindings: I, source: &Source) -> Result<(ExprRef, Env), CompileError>
where
    I: IntoIterator<Item = (Symbol, Value)>,
{
    let required = source.requirements();
    let (names, values): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .filter(|(name, _)| required.contains(name))
        .unzip();
    let desc = EnvDesc::globals(names);
    let expr = source.compile(&desc)?;
    Ok((expr, Env::root(values)))
}
