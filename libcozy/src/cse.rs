//! Common subexpression elimination.
//!
//! A simplified, single-pass relative of `cozy`'s subexpression sharing:
//! finds the largest repeated closed subexpression (no free variables) in
//! a tree and binds it once with `ELet`, substituting every occurrence
//! for the bound variable, then repeats until nothing repeats or a small
//! iteration budget is spent. The full system additionally shares
//! subexpressions across sibling statements in a block; this version
//! operates expression-locally, which is the scope the enumerator and
//! incrementalization actually feed it in this system (SPEC_FULL.md §9).

use crate::alpha_equiv::alpha_equivalent;
use crate::common::{NameGen, OrderedSet};
use crate::free_vars::free_vars;
use crate::fragments::enumerate_fragments;
use crate::syntax::{Exp, ExpKind, Lambda, Rewriter, Var};

const MAX_PASSES: usize = 8;

pub fn cse(e: &Exp, namegen: &NameGen) -> Exp {
    let mut cur = e.clone();
    for _ in 0..MAX_PASSES {
        match find_largest_duplicate(&cur) {
            Some(dup) => cur = bind_once(&cur, &dup, namegen),
            None => break,
        }
    }
    cur
}

fn is_trivial(e: &Exp) -> bool {
    matches!(
        e.kind,
        ExpKind::Var(_)
            | ExpKind::Bool(_)
            | ExpKind::Num(_)
            | ExpKind::Str(_)
            | ExpKind::Null
            | ExpKind::EnumEntry(_)
            | ExpKind::EmptyList
    )
}

fn size(e: &Exp) -> usize {
    enumerate_fragments(e).len()
}

/// The largest closed (no free variables), non-trivial subexpression that
/// occurs at least twice, preferring the occurrence closest to the root so
/// the binding scope is as wide as possible.
fn find_largest_duplicate(e: &Exp) -> Option<Exp> {
    let frags = enumerate_fragments(e);
    let mut best: Option<Exp> = None;
    for (i, candidate) in frags.iter().enumerate() {
        if is_trivial(candidate) || !free_vars(candidate).is_empty() {
            continue;
        }
        let occurs_again = frags[i + 1..]
            .iter()
            .any(|other| alpha_equivalent(candidate, other));
        if !occurs_again {
            continue;
        }
        if best
            .as_ref()
            .map(|b| size(candidate) > size(b))
            .unwrap_or(true)
        {
            best = Some(candidate.clone());
        }
    }
    best
}

/// Rebuilds `e` as `Let(dup, \v -> e[dup := v])`, substituting every
/// occurrence of `dup` (compared up to alpha-equivalence) with a fresh
/// variable.
fn bind_once(e: &Exp, dup: &Exp, namegen: &NameGen) -> Exp {
    let avoid: OrderedSet<String> = free_vars(e).into_iter().map(|v| v.id).collect();
    let name = namegen.fresh_name("cse", &avoid);
    let var = Var::new(name.clone(), dup.ty.clone());
    let replaced = replace_all(e, dup, &var);
    let f = Lambda::new(var, replaced);
    let ty = e.ty.clone();
    Exp::new(ExpKind::Let {
        e: Box::new(dup.clone()),
        f,
    })
    .with_type(ty)
}

/// Replace every occurrence of `target` (compared up to alpha-equivalence)
/// in `e` with a reference to `var`. Safe to rebuild children unguarded
/// because `target` is closed: it can never mention a name that an
/// intervening binder would shadow.
fn replace_all(e: &Exp, target: &Exp, var: &Var) -> Exp {
    struct Replacer<'a> {
        target: &'a Exp,
        var: &'a Var,
    }
    impl<'a> Rewriter for Replacer<'a> {
        fn visit_exp(&mut self, e: Exp) -> Exp {
            if alpha_equivalent(&e, self.target) {
                Exp::new(ExpKind::Var(self.var.id.clone())).with_type(self.var.ty.clone())
            } else {
                self.walk_exp(e)
            }
        }
    }
    let mut r = Replacer { target, var };
    r.visit_exp(e.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Type;

    #[test]
    fn binds_a_repeated_closed_subexpression() {
        let five = Exp::new(ExpKind::Num(5)).with_type(Type::Int);
        let plus = |a: Exp, b: Exp| {
            Exp::new(ExpKind::BinOp {
                op: crate::syntax::BOp::Plus,
                e1: Box::new(a),
                e2: Box::new(b),
            })
            .with_type(Type::Int)
        };
        let shared = plus(five.clone(), five.clone());
        let e = plus(shared.clone(), shared);
        let namegen = NameGen::new("_cse");
        let result = cse(&e, &namegen);
        assert!(matches!(result.kind, ExpKind::Let { .. }));
    }

    #[test]
    fn leaves_expressions_without_duplicates_alone() {
        let e = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(Exp::new(ExpKind::Num(1)).with_type(Type::Int)),
            e2: Box::new(Exp::new(ExpKind::Num(2)).with_type(Type::Int)),
        })
        .with_type(Type::Int);
        let namegen = NameGen::new("_cse");
        let result = cse(&e, &namegen);
        assert_eq!(result, e);
    }
}
