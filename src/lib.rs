#![doc = include_str!("../README.md")]
#![deny(unreachable_pub)]

pub mod builtins;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod eval;
pub mod num;
pub mod parser;
pub mod snapshot;
pub mod state;
pub mod symbol;
pub mod syntax;
pub mod value;

pub use num::Num;
pub use symbol::Symbol;
