//! The closed set of types an expression may carry.
//!
//! Types have structural equality: two bag types are equivalent iff their
//! element types are, maps iff key and value types are, records iff their
//! field name/type sequences are (see `Type::equivalent`).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Int,
    Long,
    Bool,
    String,
    /// A named foreign type the core never looks inside.
    Native(String),
    /// A pointer-like reference: `statevar` names the family of handles
    /// this handle belongs to (handles from the same family may alias).
    Handle {
        statevar: String,
        value_type: Box<Type>,
    },
    Bag(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>, Box<Type>),
    Record(Vec<(String, Type)>),
    Enum(Vec<String>),
    Tuple(Vec<Type>),
    Func(Vec<Type>, Box<Type>),
    /// Fixed-length vector, carried from the original system.
    Vector(Box<Type>, usize),
    /// Internal: names a mutable slot during incrementalization.
    Ref(Box<Type>),
    /// A type name that has not yet been resolved against the spec's type
    /// aliases. Only appears before type-checking runs.
    Named(String),
    /// The type checker's sentinel for "could not be determined"; never
    /// appears in a fully elaborated spec except where an error was
    /// already reported.
    Default,
}

impl Type {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long)
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Type::Bag(_) | Type::Set(_))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Bag(t) | Type::Set(t) => Some(t),
            _ => None,
        }
    }

    /// Structural equivalence used by the type checker, distinct from
    /// `PartialEq` only in that it recurses through collection/map shape
    /// rather than comparing derived equality directly (kept separate so
    /// that future relaxations, e.g. numeric coercions, have one place to
    /// live).
    pub fn equivalent(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Map(k1, v1), Type::Map(k2, v2)) => k1.equivalent(k2) && v1.equivalent(v2),
            (Type::Bag(t1), Type::Bag(t2)) => t1.equivalent(t2),
            (Type::Set(t1), Type::Set(t2)) => t1.equivalent(t2),
            _ => self == other,
        }
    }

    pub fn numeric_lub(&self, other: &Type) -> Type {
        if *self == Type::Long || *other == Type::Long {
            Type::Long
        } else {
            Type::Int
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Long => write!(f, "Long"),
            Type::Bool => write!(f, "Bool"),
            Type::String => write!(f, "String"),
            Type::Native(n) => write!(f, "Native[{n}]"),
            Type::Handle { value_type, .. } => write!(f, "Handle<{value_type}>"),
            Type::Bag(t) => write!(f, "Bag<{t}>"),
            Type::Set(t) => write!(f, "Set<{t}>"),
            Type::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Type::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {t}")?;
                }
                write!(f, "}}")
            }
            Type::Enum(cases) => write!(f, "Enum{cases:?}"),
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            Type::Func(args, ret) => {
                write!(f, "(")?;
                for (i, t) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ") -> {ret}")
            }
            Type::Vector(t, n) => write!(f, "Vector<{t}, {n}>"),
            Type::Ref(t) => write!(f, "Ref<{t}>"),
            Type::Named(n) => write!(f, "{n}"),
            Type::Default => write!(f, "?"),
        }
    }
}
