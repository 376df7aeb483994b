//! Top-level spec and method declarations.

use super::expr::Exp;
use super::stmt::Stm;
use super::types::Type;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub name: String,
    pub args: Vec<(String, Type)>,
    pub assumptions: Vec<Exp>,
    pub body: Stm,
    pub docstring: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub name: String,
    pub visibility: Visibility,
    pub args: Vec<(String, Type)>,
    pub assumptions: Vec<Exp>,
    pub ret: Exp,
    pub docstring: String,
}

impl Query {
    pub fn out_type(&self) -> &Type {
        self.ret.ty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Method {
    Op(Op),
    Query(Query),
}

impl Method {
    pub fn name(&self) -> &str {
        match self {
            Method::Op(o) => &o.name,
            Method::Query(q) => &q.name,
        }
    }

    pub fn as_op(&self) -> Option<&Op> {
        match self {
            Method::Op(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&Query> {
        match self {
            Method::Query(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternFunc {
    pub name: String,
    pub args: Vec<(String, Type)>,
    pub out_type: Type,
    pub body_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub name: String,
    pub types: Vec<(String, Type)>,
    pub extern_funcs: Vec<ExternFunc>,
    pub statevars: Vec<(String, Type)>,
    pub assumptions: Vec<Exp>,
    pub methods: Vec<Method>,
    pub header: String,
    pub footer: String,
    pub docstring: String,
}

impl Spec {
    pub fn ops(&self) -> impl Iterator<Item = &Op> {
        self.methods.iter().filter_map(Method::as_op)
    }

    pub fn queries(&self) -> impl Iterator<Item = &Query> {
        self.methods.iter().filter_map(Method::as_query)
    }

    pub fn query_named(&self, name: &str) -> Option<&Query> {
        self.queries().find(|q| q.name == name)
    }
}
