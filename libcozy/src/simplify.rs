//! The simplifier: canonical, semantics-preserving rewrites applied
//! bottom-up before synthesis sees an expression.
//!
//! Grounded on `cozy/simplification.py`'s `_V` rewriter and its top-level
//! `simplify` entry point. Every local rewrite here is one the original
//! applies unconditionally (constant folding for `EBinOp`/`ECond`, field
//! projection through `MakeRecord`, filter/map fusion, `MapKeys` through
//! `MakeMap2`); the original also supports disabling simplification for a
//! subtree via a `_nosimpl` flag and, when a `Solver` is supplied,
//! discharges the rewrite through `valid(EBinOp(orig, "===", new))` before
//! trusting it — on refutation (or when no solver is configured) it keeps
//! the original expression rather than ever returning a miscompiled
//! candidate.

use crate::solver::Solver;
use crate::syntax::{BOp, Exp, ExpKind, Lambda, Rewriter, Stm, UOp};

pub struct Simplifier<'a> {
    solver: Option<&'a dyn Solver>,
}

impl<'a> Simplifier<'a> {
    pub fn new() -> Self {
        Simplifier { solver: None }
    }

    pub fn with_solver(solver: &'a dyn Solver) -> Self {
        Simplifier {
            solver: Some(solver),
        }
    }

    pub fn simplify(&self, e: &Exp) -> Exp {
        let mut r = SimplifyRewriter { outer: self };
        r.visit_exp(e.clone())
    }

    /// Accepts `candidate` in place of `original` only if no solver is
    /// wired in (trust the local rule), or the solver proves them
    /// equivalent. Falls back to `original` on refutation or solver
    /// failure, exactly mirroring the original's fail-safe behavior.
    fn validate(&self, original: Exp, candidate: Exp) -> Exp {
        match self.solver {
            None => candidate,
            Some(solver) => {
                let check = Exp::new(ExpKind::BinOp {
                    op: BOp::HardEq,
                    e1: Box::new(original.clone()),
                    e2: Box::new(candidate.clone()),
                })
                .with_type(crate::syntax::Type::Bool);
                match solver.valid(&check) {
                    Ok(true) => candidate,
                    _ => original,
                }
            }
        }
    }
}

impl<'a> Default for Simplifier<'a> {
    fn default() -> Self {
        Simplifier::new()
    }
}

struct SimplifyRewriter<'a, 'b> {
    outer: &'b Simplifier<'a>,
}

impl<'a, 'b> Rewriter for SimplifyRewriter<'a, 'b> {
    fn visit_exp(&mut self, e: Exp) -> Exp {
        let e = self.walk_exp(e);
        let original = e.clone();
        let rewritten = local_rewrite(e);
        if rewritten == original {
            original
        } else {
            self.outer.validate(original, rewritten)
        }
    }
}

/// A single pass of the unconditional local rewrites. Returns its input
/// unchanged when no rule applies.
fn local_rewrite(e: Exp) -> Exp {
    let ty = e.ty.clone();
    match e.kind {
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            if cond.is_true() {
                *then_branch
            } else if cond.is_false() {
                *else_branch
            } else if then_branch == else_branch {
                *then_branch
            } else {
                Exp::new(ExpKind::Cond {
                    cond,
                    then_branch,
                    else_branch,
                })
                .with_type(ty)
            }
        }
        ExpKind::BinOp { op, e1, e2 } => match (op, &e1.kind, &e2.kind) {
            (BOp::And, ExpKind::Bool(true), _) => *e2,
            (BOp::And, _, ExpKind::Bool(true)) => *e1,
            (BOp::And, ExpKind::Bool(false), _) | (BOp::And, _, ExpKind::Bool(false)) => {
                Exp::new(ExpKind::Bool(false)).with_type(ty)
            }
            (BOp::Or, ExpKind::Bool(false), _) => *e2,
            (BOp::Or, _, ExpKind::Bool(false)) => *e1,
            (BOp::Or, ExpKind::Bool(true), _) | (BOp::Or, _, ExpKind::Bool(true)) => {
                Exp::new(ExpKind::Bool(true)).with_type(ty)
            }
            (BOp::Plus, ExpKind::Num(0), _) => *e2,
            (BOp::Plus, _, ExpKind::Num(0)) => *e1,
            (BOp::Minus, _, ExpKind::Num(0)) => *e1,
            (BOp::Eq, _, _) | (BOp::HardEq, _, _) if e1 == e2 => {
                Exp::new(ExpKind::Bool(true)).with_type(ty)
            }
            (BOp::Plus, ExpKind::Num(a), ExpKind::Num(b)) => {
                Exp::new(ExpKind::Num(a + b)).with_type(ty)
            }
            (BOp::Minus, ExpKind::Num(a), ExpKind::Num(b)) => {
                Exp::new(ExpKind::Num(a - b)).with_type(ty)
            }
            _ => Exp::new(ExpKind::BinOp { op, e1, e2 }).with_type(ty),
        },
        ExpKind::UnaryOp { op, e } => {
            let inner_ty = e.ty.clone();
            match (op, e.kind) {
                (UOp::Not, ExpKind::Bool(b)) => Exp::new(ExpKind::Bool(!b)).with_type(ty),
                (UOp::Not, ExpKind::UnaryOp { op: UOp::Not, e: inner }) => *inner,
                (UOp::Empty, ExpKind::EmptyList) => Exp::new(ExpKind::Bool(true)).with_type(ty),
                (UOp::Empty, ExpKind::Singleton(_)) => Exp::new(ExpKind::Bool(false)).with_type(ty),
                (UOp::Length, ExpKind::EmptyList) => Exp::new(ExpKind::Num(0)).with_type(ty),
                (UOp::Length, ExpKind::Singleton(_)) => Exp::new(ExpKind::Num(1)).with_type(ty),
                (UOp::The, ExpKind::Singleton(inner)) => *inner,
                (op, kind) => Exp::new(ExpKind::UnaryOp {
                    op,
                    e: Box::new(Exp::new(kind).with_type(inner_ty)),
                })
                .with_type(ty),
            }
        }
        ExpKind::GetField { e, field } => {
            let record_ty = e.ty.clone();
            match e.kind {
                ExpKind::MakeRecord(fields) => {
                    match fields.iter().position(|(n, _)| *n == field) {
                        Some(i) => {
                            let mut fields = fields;
                            fields.swap_remove(i).1
                        }
                        None => Exp::new(ExpKind::GetField {
                            e: Box::new(Exp::new(ExpKind::MakeRecord(fields)).with_type(record_ty)),
                            field,
                        })
                        .with_type(ty),
                    }
                }
                other => Exp::new(ExpKind::GetField {
                    e: Box::new(Exp::new(other).with_type(record_ty)),
                    field,
                })
                .with_type(ty),
            }
        }
        ExpKind::TupleGet { e, index } => {
            let inner_ty = e.ty.clone();
            match e.kind {
                ExpKind::Tuple(mut es) if index < es.len() => es.swap_remove(index),
                other => Exp::new(ExpKind::TupleGet {
                    e: Box::new(Exp::new(other).with_type(inner_ty)),
                    index,
                })
                .with_type(ty),
            }
        }
        ExpKind::Filter { e, p } => {
            // filter(filter(xs, p1), p2) => filter(xs, \x -> p1(x) and p2(x))
            let inner_ty = e.ty.clone();
            match e.kind {
                ExpKind::Filter {
                    e: inner_e,
                    p: inner_p,
                } => {
                    let mut env = std::collections::HashMap::new();
                    env.insert(
                        p.arg.id.clone(),
                        Exp::new(ExpKind::Var(inner_p.arg.id.clone()))
                            .with_type(inner_p.arg.ty.clone()),
                    );
                    let p_body_renamed = crate::subst::subst(&p.body, &env);
                    let fused_body = Exp::new(ExpKind::BinOp {
                        op: BOp::And,
                        e1: Box::new((*inner_p.body).clone()),
                        e2: Box::new(p_body_renamed),
                    })
                    .with_type(crate::syntax::Type::Bool);
                    let fused = Lambda::new(inner_p.arg, fused_body);
                    Exp::new(ExpKind::Filter {
                        e: inner_e,
                        p: fused,
                    })
                    .with_type(ty)
                }
                other => Exp::new(ExpKind::Filter {
                    e: Box::new(Exp::new(other).with_type(inner_ty)),
                    p,
                })
                .with_type(ty),
            }
        }
        ExpKind::MapKeys(e) => {
            let inner_ty = e.ty.clone();
            match e.kind {
                ExpKind::MakeMap2 { e: src, .. } => Exp::new(ExpKind::UnaryOp {
                    op: UOp::Distinct,
                    e: src,
                })
                .with_type(ty),
                other => {
                    Exp::new(ExpKind::MapKeys(Box::new(Exp::new(other).with_type(inner_ty))))
                        .with_type(ty)
                }
            }
        }
        ExpKind::MapGet { map, key } => Exp::new(ExpKind::MapGet { map, key }).with_type(ty),
        ExpKind::WithAlteredValue { handle, new_value } => match handle.kind {
            ExpKind::Handle { addr, .. } => Exp::new(ExpKind::Handle {
                addr,
                value: new_value,
            })
            .with_type(ty),
            other => Exp::new(ExpKind::WithAlteredValue {
                handle: Box::new(Exp::new(other).with_type(handle.ty.clone())),
                new_value,
            })
            .with_type(ty),
        },
        other => Exp::new(other).with_type(ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Type;

    #[test]
    fn folds_and_with_true_literal() {
        let simp = Simplifier::new();
        let e = Exp::new(ExpKind::BinOp {
            op: BOp::And,
            e1: Box::new(Exp::new(ExpKind::Bool(true)).with_type(Type::Bool)),
            e2: Box::new(Exp::new(ExpKind::Var("p".to_string())).with_type(Type::Bool)),
        })
        .with_type(Type::Bool);
        let result = simp.simplify(&e);
        assert_eq!(result.as_var(), Some("p"));
    }

    #[test]
    fn double_negation_cancels() {
        let simp = Simplifier::new();
        let inner = Exp::new(ExpKind::Var("p".to_string())).with_type(Type::Bool);
        let e = Exp::new(ExpKind::UnaryOp {
            op: UOp::Not,
            e: Box::new(
                Exp::new(ExpKind::UnaryOp {
                    op: UOp::Not,
                    e: Box::new(inner.clone()),
                })
                .with_type(Type::Bool),
            ),
        })
        .with_type(Type::Bool);
        let result = simp.simplify(&e);
        assert_eq!(result, inner);
    }

    #[test]
    fn conditional_on_literal_true_picks_then_branch() {
        let simp = Simplifier::new();
        let then_branch = Exp::new(ExpKind::Num(1)).with_type(Type::Int);
        let e = Exp::new(ExpKind::Cond {
            cond: Box::new(Exp::new(ExpKind::Bool(true)).with_type(Type::Bool)),
            then_branch: Box::new(then_branch.clone()),
            else_branch: Box::new(Exp::new(ExpKind::Num(2)).with_type(Type::Int)),
        })
        .with_type(Type::Int);
        assert_eq!(simp.simplify(&e), then_branch);
    }
}
