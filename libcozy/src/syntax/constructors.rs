//! Smart constructors for common derived expression/statement shapes.
//!
//! Grounded on `cozy/syntax.py`'s free functions of the same names
//! (`seq`, `EAll`, `EAny`, `ENot`, `EIsSubset`, `EImplies`, ...), which
//! exist so that callers never have to hand-build the boolean skeleton of
//! e.g. "all of these assumptions hold" and get the associativity/empty
//! case right every time.

use super::expr::{BOp, Exp, ExpKind, UOp};
use super::stmt::Stm;
use super::types::Type;

pub fn seq(stmts: impl IntoIterator<Item = Stm>) -> Stm {
    stmts
        .into_iter()
        .fold(Stm::NoOp, |acc, s| acc.then(s))
}

fn bool_exp(b: bool) -> Exp {
    Exp::new(ExpKind::Bool(b)).with_type(Type::Bool)
}

fn bin(op: BOp, e1: Exp, e2: Exp) -> Exp {
    Exp::new(ExpKind::BinOp {
        op,
        e1: Box::new(e1),
        e2: Box::new(e2),
    })
    .with_type(Type::Bool)
}

/// Conjunction of `es`, short-circuiting the trivial `[]` and singleton
/// cases to avoid emitting `true && x` chains.
pub fn e_all(es: impl IntoIterator<Item = Exp>) -> Exp {
    let mut it = es.into_iter();
    let first = match it.next() {
        Some(e) => e,
        None => return bool_exp(true),
    };
    it.fold(first, |acc, e| bin(BOp::And, acc, e))
}

pub fn e_any(es: impl IntoIterator<Item = Exp>) -> Exp {
    let mut it = es.into_iter();
    let first = match it.next() {
        Some(e) => e,
        None => return bool_exp(false),
    };
    it.fold(first, |acc, e| bin(BOp::Or, acc, e))
}

pub fn e_not(e: Exp) -> Exp {
    Exp::new(ExpKind::UnaryOp {
        op: UOp::Not,
        e: Box::new(e),
    })
    .with_type(Type::Bool)
}

pub fn e_eq(e1: Exp, e2: Exp) -> Exp {
    bin(BOp::Eq, e1, e2)
}

pub fn e_in(e: Exp, collection: Exp) -> Exp {
    bin(BOp::In, e, collection)
}

pub fn e_implies(premise: Exp, conclusion: Exp) -> Exp {
    bin(BOp::Or, e_not(premise), conclusion)
}

/// `forall x in sub. x in sup`, built as `empty(sub - sup)` would be if
/// set difference existed as a primitive; instead mirrors the original's
/// direct quantified form via an unused binder name swept clean by the
/// caller's surrounding `fresh_name` context.
pub fn e_is_subset(sub: Exp, sup: Exp, binder: &str, elem_type: Type) -> Exp {
    use super::expr::{Lambda, Var};
    let x = Var::new(binder, elem_type);
    let body = e_in(
        Exp::new(ExpKind::Var(x.id.clone())).with_type(x.ty.clone()),
        sup,
    );
    let f = Lambda::new(x, body);
    Exp::new(ExpKind::UnaryOp {
        op: UOp::All,
        e: Box::new(
            Exp::new(ExpKind::Map { e: Box::new(sub), f }).with_type(Type::Bag(Box::new(Type::Bool))),
        ),
    })
    .with_type(Type::Bool)
}

pub fn e_is_singleton(e: Exp) -> Exp {
    Exp::new(ExpKind::BinOp {
        op: BOp::Eq,
        e1: Box::new(
            Exp::new(ExpKind::UnaryOp {
                op: UOp::Length,
                e: Box::new(e),
            })
            .with_type(Type::Int),
        ),
        e2: Box::new(Exp::new(ExpKind::Num(1)).with_type(Type::Int)),
    })
    .with_type(Type::Bool)
}

pub fn e_empty(e: Exp) -> Exp {
    Exp::new(ExpKind::UnaryOp {
        op: UOp::Empty,
        e: Box::new(e),
    })
    .with_type(Type::Bool)
}

/// A balanced binary merge of `items` using `combine`, for building e.g. a
/// wide disjunction as a tree instead of a long chain (keeps any recursive
/// cost-model walk over the result logarithmic rather than linear depth).
/// The balance is a construction-time convenience only: nothing downstream
/// may assume the result stays balanced after later rewriting.
pub fn build_balanced_tree<T>(items: Vec<T>, combine: impl Fn(T, T) -> T + Copy) -> Option<T> {
    fn go<T>(items: &mut Vec<T>, combine: impl Fn(T, T) -> T + Copy) -> T {
        if items.len() == 1 {
            return items.pop().unwrap();
        }
        let mid = items.len() / 2;
        let rest = items.split_off(mid);
        let left = go(items, combine);
        let mut rest = rest;
        let right = go(&mut rest, combine);
        combine(left, right)
    }
    if items.is_empty() {
        return None;
    }
    let mut items = items;
    Some(go(&mut items, combine))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e_all_of_empty_is_true() {
        assert!(e_all(std::iter::empty()).is_true());
    }

    #[test]
    fn e_any_of_empty_is_false() {
        assert!(e_any(std::iter::empty()).is_false());
    }

    #[test]
    fn build_balanced_tree_combines_all_items() {
        let sum = build_balanced_tree(vec![1, 2, 3, 4, 5], |a, b| a + b);
        assert_eq!(sum, Some(15));
    }

    #[test]
    fn build_balanced_tree_of_empty_is_none() {
        let sum: Option<i32> = build_balanced_tree(vec![], |a, b| a + b);
        assert_eq!(sum, None);
    }
}
