//! The statement language: mutations over state variables.

use super::expr::{Exp, Var};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stm {
    NoOp,
    Seq(Box<Stm>, Box<Stm>),
    /// `target.func(args)`, where `func` is one of `add`/`remove`/`remove_all`.
    Call {
        target: Box<Exp>,
        func: String,
        args: Vec<Exp>,
    },
    Assign {
        lhs: Box<Exp>,
        rhs: Box<Exp>,
    },
    Decl {
        id: String,
        val: Box<Exp>,
    },
    ForEach {
        id: Var,
        iter: Box<Exp>,
        body: Box<Stm>,
    },
    If {
        cond: Box<Exp>,
        then_branch: Box<Stm>,
        else_branch: Box<Stm>,
    },
    While {
        cond: Box<Exp>,
        body: Box<Stm>,
    },
    EscapableBlock {
        label: String,
        body: Box<Stm>,
    },
    EscapeBlock(String),
    MapPut {
        map: Box<Exp>,
        key: Box<Exp>,
        value: Box<Exp>,
    },
    MapDel {
        map: Box<Exp>,
        key: Box<Exp>,
    },
    MapUpdate {
        map: Box<Exp>,
        key: Box<Exp>,
        val_var: Var,
        change: Box<Stm>,
    },
}

impl Stm {
    /// Sequencing smart constructor that drops `NoOp`s, mirroring the
    /// original system's `seq([...])` helper (see `constructors::seq`).
    pub fn then(self, next: Stm) -> Stm {
        match (&self, &next) {
            (Stm::NoOp, _) => next,
            (_, Stm::NoOp) => self,
            _ => Stm::Seq(Box::new(self), Box::new(next)),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Stm::NoOp)
    }
}

impl Default for Stm {
    fn default() -> Self {
        Stm::NoOp
    }
}
