//! Intermediate representation for control-flow simplification.
//!
//! This module defines a small SSA-form IR modeled on LLVM's: an arena of
//! basic blocks ending in explicit terminators, PHI nodes at block heads and
//! integer-only arithmetic. It is just rich enough to express every shape the
//! simplifier rewrites, and comes with a textual form ([`parser`],
//! [`printer`]) used by the CLI and the fixture tests.

mod types;
pub use types::*;

mod function;
pub use function::{Block, Function, User};

pub mod builder;
pub mod eval;
pub mod parser;
pub mod printer;

pub use builder::FunctionBuilder;
pub use parser::{parse_function, ParseError};
