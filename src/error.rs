use thiserror::Error;

use crate::{parser, symbol::Symbol};

/// Errors raised while lowering source to compiled expressions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("Unbound variable: {0}")]
    Unbound(Symbol),
    #[error("Bad syntax in {form}: {reason}")]
    Syntax { form: String, reason: String },
    #[error("Duplicate binding for {0}")]
    Duplicate(Symbol),
}

impl CompileError {
    pub(crate) fn syntax<F: ToString, R: Into<String>>(form: F, reason: R) -> Self {
        Self::Syntax {
            form: form.to_string(),
            reason: reason.into(),
        }
    }
}

/// Faults of the evaluator itself. None of these are visible to guest
/// `catch`: a guest error is a value thrown along the continuation chain,
/// while these abort the trampoline.
#[derive(Error, Debug)]
pub enum ReductionError {
    #[error("Environment shape mismatch: slot {slot} in a frame of {len}")]
    Shape { slot: usize, len: usize },
    #[error("Continuation {0} has no parent")]
    Orphan(&'static str),
    #[error("Continuation mark not found on the current chain")]
    MarkNotFound,
    #[error("Malformed {0} form reached the evaluator")]
    Malformed(&'static str),
    #[error("No computation is waiting on signal {0}")]
    NotWaiting(Symbol),
    #[error("Iteration limit of {0} reached")]
    LimitExceeded(usize),
    #[error("Console error: {0}")]
    Console(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Encoding error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("Unknown primitive: {0}")]
    UnknownPrimitive(String),
    #[error("Dangling {kind} reference {index}")]
    Dangling { kind: &'static str, index: usize },
    #[error("Snapshot root is not a {0}")]
    Root(&'static str),
}

/// Top-level error for embedding and the CLI.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Parser error: {0}")]
    Parser(#[from] parser::Error),
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
    #[error("Runtime error: {0}")]
    Reduction(#[from] ReductionError),
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}
