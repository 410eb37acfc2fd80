//! The evaluator: compiled expressions, defunctionalized continuations and the
//! trampoline that drives them.
//!
//! Every piece of guest control flow is data. An `Expr` evaluates by pushing a
//! `Continuation` frame and returning the next `Step`; a continuation resumes by
//! popping itself. Nothing here recurses on the native stack in proportion to
//! the guest program, so deep recursion, long loops and continuation re-entry
//! all run in constant native stack.

pub mod boxes;
pub mod cont;
pub mod env;
pub mod expr;
pub mod machine;
pub mod partial;
pub mod procedure;
pub(crate) mod reclaim;
pub mod step;
pub mod toplevel;
pub mod wind;

pub use machine::{Machine, Outcome};
pub use toplevel::TopLevel;

#[cfg(test)]
mod tests;
