//! The expression intermediate representation.
//!
//! Every expression is a tagged variant with immutable children (§9 of
//! SPEC_FULL.md). `Exp` pairs an `ExpKind` with a `.type`, mirroring the
//! original system's dynamic `.type` attribute, attached by the type
//! checker and read by everything downstream. Lambdas are not `Exp`s:
//! their type is determined entirely by the context that uses them, so
//! `Lambda` is a standalone struct with no `ty` field of its own.

use super::types::Type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BOp {
    And,
    Or,
    In,
    Eq,
    /// `===`, the "deep"/syntactic equality used by the simplifier to
    /// short-circuit on structurally-provable equalities.
    HardEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UOp {
    Sum,
    Not,
    Distinct,
    AreUnique,
    All,
    Any,
    Exists,
    Length,
    Empty,
    The,
    Negate,
}

/// A binder together with the type it is declared at. Used both for
/// `EVar` occurrences and for the names `Lambda`/`SForEach`/`SMapUpdate`
/// introduce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    pub id: String,
    pub ty: Type,
}

impl Var {
    pub fn new(id: impl Into<String>, ty: Type) -> Self {
        Var { id: id.into(), ty }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lambda {
    pub arg: Var,
    pub body: Box<Exp>,
}

impl Lambda {
    pub fn new(arg: Var, body: Exp) -> Self {
        Lambda {
            arg,
            body: Box::new(body),
        }
    }

    /// The type this lambda returns, i.e. its body's type.
    pub fn ret_type(&self) -> &Type {
        self.body.ty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Pull { id: String, e: Exp },
    Cond(Exp),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exp {
    pub kind: ExpKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpKind {
    Var(String),
    Bool(bool),
    Num(i64),
    Str(String),
    Null,
    EnumEntry(String),
    Cond {
        cond: Box<Exp>,
        then_branch: Box<Exp>,
        else_branch: Box<Exp>,
    },
    BinOp {
        op: BOp,
        e1: Box<Exp>,
        e2: Box<Exp>,
    },
    UnaryOp {
        op: UOp,
        e: Box<Exp>,
    },
    ArgMin {
        e: Box<Exp>,
        f: Lambda,
    },
    ArgMax {
        e: Box<Exp>,
        f: Lambda,
    },
    Handle {
        addr: Box<Exp>,
        value: Box<Exp>,
    },
    MakeRecord(Vec<(String, Exp)>),
    GetField {
        e: Box<Exp>,
        field: String,
    },
    EmptyList,
    Singleton(Box<Exp>),
    ListComprehension {
        clauses: Vec<Clause>,
        body: Box<Exp>,
    },
    Call {
        func: String,
        args: Vec<Exp>,
    },
    Tuple(Vec<Exp>),
    TupleGet {
        e: Box<Exp>,
        index: usize,
    },
    Let {
        e: Box<Exp>,
        f: Lambda,
    },
    Map {
        e: Box<Exp>,
        f: Lambda,
    },
    Filter {
        e: Box<Exp>,
        p: Lambda,
    },
    FlatMap {
        e: Box<Exp>,
        f: Lambda,
    },
    MakeMap {
        e: Box<Exp>,
        key: Lambda,
        value: Lambda,
    },
    MakeMap2 {
        e: Box<Exp>,
        value: Lambda,
    },
    MapGet {
        map: Box<Exp>,
        key: Box<Exp>,
    },
    MapKeys(Box<Exp>),
    /// The state-var barrier, see SPEC_FULL.md §9.
    StateVar(Box<Exp>),
    VectorGet {
        e: Box<Exp>,
        index: Box<Exp>,
    },
    WithAlteredValue {
        handle: Box<Exp>,
        new_value: Box<Exp>,
    },
    /// An embedded statement: execute `stm` for effect, then evaluate to `e`.
    Stm {
        stm: Box<super::stmt::Stm>,
        e: Box<Exp>,
    },
    EnumToInt(Box<Exp>),
    BoolToInt(Box<Exp>),
    Native(Box<Exp>),
}

impl Exp {
    pub fn new(kind: ExpKind) -> Self {
        Exp {
            kind,
            ty: Type::Default,
        }
    }

    /// Mirrors the original system's pervasive `.with_type(t)` smart
    /// constructor idiom: build the untyped node, then stamp its type.
    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = ty;
        self
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn is_true(&self) -> bool {
        matches!(self.kind, ExpKind::Bool(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self.kind, ExpKind::Bool(false))
    }

    pub fn as_var(&self) -> Option<&str> {
        match &self.kind {
            ExpKind::Var(id) => Some(id),
            _ => None,
        }
    }
}
