//! Common definitions that are shared between different parts of the compiler.

use derive_more::Display;

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers and assembly symbols.
pub type Id = internment::Intern<String>;

/// Intern a string as an [Id].
pub fn id(name: &str) -> Id {
    Id::from_ref(name)
}

/// The result type used throughout the compiler.
pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// A position in the source text.  Line and column are 0-based; rendering
/// adds 1 to both for display.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
#[display("{}:{}:{}", file, line + 1, column + 1)]
pub struct Location {
    /// The logical name of the source unit, used only for diagnostics.
    pub file: Id,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: Id, line: usize, column: usize) -> Self {
        Location { file, line, column }
    }
}

/// Everything that can go wrong during a compilation.
///
/// The first error aborts the compilation and is reported to the caller;
/// there is no recovery and no error collection.
#[derive(Clone, PartialEq, Eq, Debug, Display)]
#[display("{location}: {kind}")]
pub struct CompileError {
    pub location: Location,
    pub kind: ErrorKind,
}

impl std::error::Error for CompileError {}

/// The error taxonomy.  Each variant carries whatever context its message
/// needs; the location lives on [CompileError].
#[derive(Clone, PartialEq, Eq, Debug, Display)]
pub enum ErrorKind {
    #[display("unexpected character {_0:?}")]
    UnexpectedCharacter(char),
    #[display("unexpected token `{found}`, expected {expected}")]
    UnexpectedToken { found: String, expected: String },
    #[display("unexpected construct, expected {_0}")]
    UnexpectedSyntaxNode(String),
    #[display("unknown identifier `{_0}`")]
    UnknownIdentifier(Id),
    #[display("invalid type cast: {_0}")]
    InvalidTypeCast(String),
    #[display("cannot negate a value of an unsigned type")]
    UnsignedType,
    #[display("expression cannot be assigned to")]
    NotLValue,
    #[display("called value is not a function")]
    NotCallableType,
    #[display("function `{_0}` does not return a value")]
    NoReturnValue(Id),
    #[display("return value does not match the function's return type")]
    MismatchingReturn,
    #[display("division by zero")]
    DivisionByZero,
    #[display("duplicate symbol `{_0}`")]
    DuplicateSymbol(Id),
    #[display("ran out of free registers")]
    OutOfRegisters,
    #[display("not implemented: {_0}")]
    NotImplemented(String),
}

impl ErrorKind {
    /// Attach a source location, producing the final error.
    pub fn at(self, location: Location) -> CompileError {
        CompileError {
            location,
            kind: self,
        }
    }
}
