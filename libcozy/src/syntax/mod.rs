//! The typed intermediate representation: types, expressions, statements,
//! and the spec/method declarations built out of them.

pub mod constructors;
pub mod expr;
pub mod spec;
pub mod stmt;
pub mod types;
pub mod visitor;

pub use expr::{BOp, Clause, Exp, ExpKind, Lambda, UOp, Var};
pub use spec::{ExternFunc, Method, Op, Query, Spec, Visibility};
pub use stmt::Stm;
pub use types::Type;
pub use visitor::{Explorer, Rewriter};
