//! The abstract syntax tree.
//!
//! Every node carries the [Location] of its first token so that the later
//! phases can report errors without re-reading the source.

use derive_more::Display;

use crate::common::{Id, Location};

/// A parsed source unit: the ordered list of top-level declarations.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub decls: Vec<Decl>,
}

/// A type as written in the source.  Types are syntactically just
/// identifiers; resolution against the type table happens in the back end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeExpr {
    pub name: Id,
    pub location: Location,
}

/// Top-level declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    /// A global variable with a constant initializer, e.g. `i32 a = 42;`.
    /// The grammar admits a declaration without a type; the back end
    /// rejects it.
    Variable {
        ty: Option<TypeExpr>,
        name: Id,
        initializer: Expr,
        location: Location,
    },
    /// A function definition.  An omitted return type means the function
    /// returns nothing.
    Function {
        return_ty: Option<TypeExpr>,
        name: Id,
        args: Vec<ArgDecl>,
        body: Vec<Stmt>,
        location: Location,
    },
}

/// A single `type name` entry in a function's argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgDecl {
    pub ty: TypeExpr,
    pub name: Id,
    pub location: Location,
}

/// Statements inside a function body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `lhs = rhs;`
    Assign {
        lhs: Expr,
        rhs: Expr,
        location: Location,
    },
    /// `return;` or `return expr;`
    Return {
        value: Option<Expr>,
        location: Location,
    },
    /// A bare function call used for its effect, e.g. `_write(a);`.
    Call(Expr),
}

/// Expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier {
        name: Id,
        location: Location,
    },
    /// A decimal integer literal.  Its type stays unresolved until some
    /// consumer supplies one.
    Integer {
        value: i64,
        location: Location,
    },
    Negation {
        inner: Box<Expr>,
        location: Location,
    },
    /// An explicit cast, `expr : type`.
    TypeCast {
        inner: Box<Expr>,
        target: TypeExpr,
        location: Location,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        location: Location,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        location: Location,
    },
}

impl Expr {
    pub fn location(&self) -> Location {
        match *self {
            Expr::Identifier { location, .. }
            | Expr::Integer { location, .. }
            | Expr::Negation { location, .. }
            | Expr::TypeCast { location, .. }
            | Expr::Binary { location, .. }
            | Expr::Call { location, .. } => location,
        }
    }
}

/// Binary operators, two precedence levels.  `*` and `/` parse and
/// constant-fold but have no instruction selection yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinOp {
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
}
