//! The middle-end of the compiler: constant folding.

pub mod fold;

pub use fold::fold_expr;
