//! Enumeration of an expression's subterms, tagged with the pool (state or
//! runtime) each one lives in.
//!
//! Grounded on `cozy/syntax_tools.py`'s `enumerate_fragments`, the source
//! the enumerator and the well-formedness checker both draw candidate
//! terms from. `EStateVar` is the pool boundary (SPEC_FULL.md §9): every
//! subterm strictly inside an `EStateVar` belongs to the state pool,
//! everything else to the runtime pool. Once a subterm crosses into the
//! state pool its descendants stay there — `EStateVar` does not nest in
//! well-formed specs, but if it did the inner barrier would simply be a
//! redundant no-op.

use crate::syntax::constructors::e_not;
use crate::syntax::{Clause, Exp, ExpKind, Stm};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    Runtime,
    State,
}

/// Every subexpression of `e`, each tagged with the pool it occurs in.
/// Includes `e` itself. Order is pre-order (parents before children),
/// matching the order `enumerate_fragments` yields them in, which the
/// enumerator relies on to prefer smaller candidates first.
pub fn enumerate_fragments_and_pools(e: &Exp) -> Vec<(Exp, Pool)> {
    let mut out = Vec::new();
    walk(e, Pool::Runtime, &mut out);
    out
}

pub fn enumerate_fragments(e: &Exp) -> Vec<Exp> {
    enumerate_fragments_and_pools(e)
        .into_iter()
        .map(|(e, _)| e)
        .collect()
}

/// `enumerate_fragments`, but over a statement. There's no pool tagging
/// here: statements are runtime-pool code by construction, so only the
/// embedded expressions matter to callers (the well-formedness checker,
/// the implementation manager's read-after-write analysis).
pub fn enumerate_fragments_in_stm(s: &Stm) -> Vec<Exp> {
    let mut out = Vec::new();
    walk_stm(s, &mut out);
    out
}

fn walk_stm(s: &Stm, out: &mut Vec<Exp>) {
    match s {
        Stm::NoOp | Stm::EscapeBlock(_) => {}
        Stm::Seq(s1, s2) => {
            walk_stm(s1, out);
            walk_stm(s2, out);
        }
        Stm::Call { target, args, .. } => {
            out.extend(enumerate_fragments(target));
            for a in args {
                out.extend(enumerate_fragments(a));
            }
        }
        Stm::Assign { lhs, rhs } => {
            out.extend(enumerate_fragments(lhs));
            out.extend(enumerate_fragments(rhs));
        }
        Stm::Decl { val, .. } => out.extend(enumerate_fragments(val)),
        Stm::ForEach { iter, body, .. } => {
            out.extend(enumerate_fragments(iter));
            walk_stm(body, out);
        }
        Stm::If {
            cond,
            then_branch,
            else_branch,
        } => {
            out.extend(enumerate_fragments(cond));
            walk_stm(then_branch, out);
            walk_stm(else_branch, out);
        }
        Stm::While { cond, body } => {
            out.extend(enumerate_fragments(cond));
            walk_stm(body, out);
        }
        Stm::EscapableBlock { body, .. } => walk_stm(body, out),
        Stm::MapPut { map, key, value } => {
            out.extend(enumerate_fragments(map));
            out.extend(enumerate_fragments(key));
            out.extend(enumerate_fragments(value));
        }
        Stm::MapDel { map, key } => {
            out.extend(enumerate_fragments(map));
            out.extend(enumerate_fragments(key));
        }
        Stm::MapUpdate {
            map, key, change, ..
        } => {
            out.extend(enumerate_fragments(map));
            out.extend(enumerate_fragments(key));
            walk_stm(change, out);
        }
    }
}

fn walk(e: &Exp, pool: Pool, out: &mut Vec<(Exp, Pool)>) {
    out.push((e.clone(), pool));
    let child_pool = if matches!(e.kind, ExpKind::StateVar(_)) {
        Pool::State
    } else {
        pool
    };
    match &e.kind {
        ExpKind::Var(_)
        | ExpKind::Bool(_)
        | ExpKind::Num(_)
        | ExpKind::Str(_)
        | ExpKind::Null
        | ExpKind::EnumEntry(_)
        | ExpKind::EmptyList => {}
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            walk(cond, child_pool, out);
            walk(then_branch, child_pool, out);
            walk(else_branch, child_pool, out);
        }
        ExpKind::BinOp { e1, e2, .. } => {
            walk(e1, child_pool, out);
            walk(e2, child_pool, out);
        }
        ExpKind::UnaryOp { e, .. }
        | ExpKind::Singleton(e)
        | ExpKind::MapKeys(e)
        | ExpKind::StateVar(e)
        | ExpKind::EnumToInt(e)
        | ExpKind::BoolToInt(e)
        | ExpKind::Native(e)
        | ExpKind::GetField { e, .. }
        | ExpKind::TupleGet { e, .. } => walk(e, child_pool, out),
        ExpKind::ArgMin { e, f } | ExpKind::ArgMax { e, f } => {
            walk(e, child_pool, out);
            walk(&f.body, child_pool, out);
        }
        ExpKind::Handle { addr, value } => {
            walk(addr, child_pool, out);
            walk(value, child_pool, out);
        }
        ExpKind::MakeRecord(fields) => {
            for (_, v) in fields {
                walk(v, child_pool, out);
            }
        }
        ExpKind::ListComprehension { clauses, body } => {
            for c in clauses {
                match c {
                    Clause::Pull { e, .. } => walk(e, child_pool, out),
                    Clause::Cond(e) => walk(e, child_pool, out),
                }
            }
            walk(body, child_pool, out);
        }
        ExpKind::Call { args, .. } => {
            for a in args {
                walk(a, child_pool, out);
            }
        }
        ExpKind::Tuple(es) => {
            for e in es {
                walk(e, child_pool, out);
            }
        }
        ExpKind::Let { e, f } | ExpKind::Map { e, f } | ExpKind::FlatMap { e, f } => {
            walk(e, child_pool, out);
            walk(&f.body, child_pool, out);
        }
        ExpKind::Filter { e, p } => {
            walk(e, child_pool, out);
            walk(&p.body, child_pool, out);
        }
        ExpKind::MakeMap { e, key, value } => {
            walk(e, child_pool, out);
            walk(&key.body, child_pool, out);
            walk(&value.body, child_pool, out);
        }
        ExpKind::MakeMap2 { e, value } => {
            walk(e, child_pool, out);
            walk(&value.body, child_pool, out);
        }
        ExpKind::MapGet { map, key } => {
            walk(map, child_pool, out);
            walk(key, child_pool, out);
        }
        ExpKind::VectorGet { e, index } => {
            walk(e, child_pool, out);
            walk(index, child_pool, out);
        }
        ExpKind::WithAlteredValue { handle, new_value } => {
            walk(handle, child_pool, out);
            walk(new_value, child_pool, out);
        }
        ExpKind::Stm { e, .. } => walk(e, child_pool, out),
    }
}

/// A subterm of an expression, paired with the assumptions that provably
/// hold at the point it occurs. Unlike the flat `enumerate_fragments`,
/// this narrows under `ECond`/`EFilter`: a sub-fragment under the `then`
/// branch of a conditional may assume the condition, one under the `else`
/// branch may assume its negation, and one under a filter's predicate
/// lambda may assume the predicate itself holds for its own bound
/// argument. Grounded on `cozy/syntax_tools.py`'s `enumerate_fragments`,
/// which yields exactly these `(assumptions, ...)` tuples per fragment;
/// `replace`/`bound` aren't needed by this crate's only per-fragment
/// consumer (`invariant_preservation::check_the_wf`) and are left for a
/// caller that needs them to add later.
pub struct FragmentContext {
    pub assumptions: Vec<Exp>,
    pub exp: Exp,
}

/// `enumerate_fragments`, with each fragment paired with the assumptions
/// valid at its occurrence. `assumptions` seeds the context at the root
/// (typically the method's own assumptions).
pub fn enumerate_fragments_with_assumptions(e: &Exp, assumptions: &[Exp]) -> Vec<FragmentContext> {
    let mut out = Vec::new();
    walk_ctx(e, assumptions.to_vec(), &mut out);
    out
}

/// The statement-level counterpart, narrowing assumptions under `If`.
pub fn enumerate_fragments_in_stm_with_assumptions(
    s: &Stm,
    assumptions: &[Exp],
) -> Vec<FragmentContext> {
    let mut out = Vec::new();
    walk_stm_ctx(s, assumptions.to_vec(), &mut out);
    out
}

fn walk_stm_ctx(s: &Stm, assumptions: Vec<Exp>, out: &mut Vec<FragmentContext>) {
    match s {
        Stm::NoOp | Stm::EscapeBlock(_) => {}
        Stm::Seq(s1, s2) => {
            walk_stm_ctx(s1, assumptions.clone(), out);
            walk_stm_ctx(s2, assumptions, out);
        }
        Stm::Call { target, args, .. } => {
            walk_ctx(target, assumptions.clone(), out);
            for a in args {
                walk_ctx(a, assumptions.clone(), out);
            }
        }
        Stm::Assign { lhs, rhs } => {
            walk_ctx(lhs, assumptions.clone(), out);
            walk_ctx(rhs, assumptions, out);
        }
        Stm::Decl { val, .. } => walk_ctx(val, assumptions, out),
        Stm::ForEach { iter, body, .. } => {
            walk_ctx(iter, assumptions.clone(), out);
            walk_stm_ctx(body, assumptions, out);
        }
        Stm::If {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_ctx(cond, assumptions.clone(), out);
            let mut then_assumptions = assumptions.clone();
            then_assumptions.push((**cond).clone());
            walk_stm_ctx(then_branch, then_assumptions, out);
            let mut else_assumptions = assumptions;
            else_assumptions.push(e_not((**cond).clone()));
            walk_stm_ctx(else_branch, else_assumptions, out);
        }
        Stm::While { cond, body } => {
            walk_ctx(cond, assumptions.clone(), out);
            walk_stm_ctx(body, assumptions, out);
        }
        Stm::EscapableBlock { body, .. } => walk_stm_ctx(body, assumptions, out),
        Stm::MapPut { map, key, value } => {
            walk_ctx(map, assumptions.clone(), out);
            walk_ctx(key, assumptions.clone(), out);
            walk_ctx(value, assumptions, out);
        }
        Stm::MapDel { map, key } => {
            walk_ctx(map, assumptions.clone(), out);
            walk_ctx(key, assumptions, out);
        }
        Stm::MapUpdate {
            map, key, change, ..
        } => {
            walk_ctx(map, assumptions.clone(), out);
            walk_ctx(key, assumptions.clone(), out);
            walk_stm_ctx(change, assumptions, out);
        }
    }
}

fn walk_ctx(e: &Exp, assumptions: Vec<Exp>, out: &mut Vec<FragmentContext>) {
    out.push(FragmentContext {
        assumptions: assumptions.clone(),
        exp: e.clone(),
    });
    match &e.kind {
        ExpKind::Var(_)
        | ExpKind::Bool(_)
        | ExpKind::Num(_)
        | ExpKind::Str(_)
        | ExpKind::Null
        | ExpKind::EnumEntry(_)
        | ExpKind::EmptyList => {}
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            walk_ctx(cond, assumptions.clone(), out);
            let mut then_assumptions = assumptions.clone();
            then_assumptions.push((**cond).clone());
            walk_ctx(then_branch, then_assumptions, out);
            let mut else_assumptions = assumptions;
            else_assumptions.push(e_not((**cond).clone()));
            walk_ctx(else_branch, else_assumptions, out);
        }
        ExpKind::BinOp { e1, e2, .. } => {
            walk_ctx(e1, assumptions.clone(), out);
            walk_ctx(e2, assumptions, out);
        }
        ExpKind::UnaryOp { e, .. }
        | ExpKind::Singleton(e)
        | ExpKind::MapKeys(e)
        | ExpKind::StateVar(e)
        | ExpKind::EnumToInt(e)
        | ExpKind::BoolToInt(e)
        | ExpKind::Native(e)
        | ExpKind::GetField { e, .. }
        | ExpKind::TupleGet { e, .. } => walk_ctx(e, assumptions, out),
        ExpKind::ArgMin { e, f } | ExpKind::ArgMax { e, f } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&f.body, assumptions, out);
        }
        ExpKind::Handle { addr, value } => {
            walk_ctx(addr, assumptions.clone(), out);
            walk_ctx(value, assumptions, out);
        }
        ExpKind::MakeRecord(fields) => {
            for (_, v) in fields {
                walk_ctx(v, assumptions.clone(), out);
            }
        }
        ExpKind::ListComprehension { clauses, body } => {
            let mut current = assumptions;
            for c in clauses {
                match c {
                    Clause::Pull { e, .. } => walk_ctx(e, current.clone(), out),
                    Clause::Cond(e) => {
                        walk_ctx(e, current.clone(), out);
                        current.push(e.clone());
                    }
                }
            }
            walk_ctx(body, current, out);
        }
        ExpKind::Call { args, .. } => {
            for a in args {
                walk_ctx(a, assumptions.clone(), out);
            }
        }
        ExpKind::Tuple(es) => {
            for e in es {
                walk_ctx(e, assumptions.clone(), out);
            }
        }
        ExpKind::Let { e, f } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&f.body, assumptions, out);
        }
        ExpKind::Map { e, f } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&f.body, assumptions, out);
        }
        ExpKind::Filter { e, p } => {
            walk_ctx(e, assumptions.clone(), out);
            // The predicate is assumed to hold within its own body, the
            // same way a spec-level `EFilter` narrows the context for
            // everything nested inside its lambda.
            let mut inner = assumptions;
            inner.push(p.body.clone());
            walk_ctx(&p.body, inner, out);
        }
        ExpKind::FlatMap { e, f } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&f.body, assumptions, out);
        }
        ExpKind::MakeMap { e, key, value } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&key.body, assumptions.clone(), out);
            walk_ctx(&value.body, assumptions, out);
        }
        ExpKind::MakeMap2 { e, value } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(&value.body, assumptions, out);
        }
        ExpKind::MapGet { map, key } => {
            walk_ctx(map, assumptions.clone(), out);
            walk_ctx(key, assumptions, out);
        }
        ExpKind::VectorGet { e, index } => {
            walk_ctx(e, assumptions.clone(), out);
            walk_ctx(index, assumptions, out);
        }
        ExpKind::WithAlteredValue { handle, new_value } => {
            walk_ctx(handle, assumptions.clone(), out);
            walk_ctx(new_value, assumptions, out);
        }
        ExpKind::Stm { e, .. } => walk_ctx(e, assumptions, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Type;

    #[test]
    fn includes_self_and_all_subterms() {
        let e = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(Exp::new(ExpKind::Num(1)).with_type(Type::Int)),
            e2: Box::new(Exp::new(ExpKind::Num(2)).with_type(Type::Int)),
        })
        .with_type(Type::Int);
        let frags = enumerate_fragments(&e);
        assert_eq!(frags.len(), 3);
    }

    #[test]
    fn state_var_tags_descendants_as_state_pool() {
        let inner = Exp::new(ExpKind::Var("s".to_string())).with_type(Type::Int);
        let e = Exp::new(ExpKind::StateVar(Box::new(inner))).with_type(Type::Int);
        let tagged = enumerate_fragments_and_pools(&e);
        assert_eq!(tagged[0].1, Pool::Runtime);
        assert_eq!(tagged[1].1, Pool::State);
    }
}
