//! A whole-program compiler for a small, statically typed, C-like
//! language.  The output is a 32-bit x86 assembly listing in flat
//! assembler syntax, linkable against the C runtime's `scanf` and
//! `printf` for integer input and output.
//!
//! See the `src/bin` directory for the executable program using this
//! library; the library entry point is [compile].

pub mod common;
pub mod front;
pub mod middle;
pub mod back;

pub use back::codegen::compile;
pub use common::{CompileError, ErrorKind, Location};
