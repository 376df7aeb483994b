//! Symbolic incrementalization: turning an `Op`'s body into a substitution
//! over state, and turning "state used to be X, now it should be Y" into an
//! update statement.
//!
//! Grounded on `cozy/incrementalization.py`'s `delta_form`/`sketch_update`
//! pair (the only non-trivial arithmetic this system does outside the
//! solver). `delta_form` here covers the straight-line fragment SPEC_FULL.md
//! §4.4 says `Op` bodies are restricted to; `sketch_update` falls back to a
//! from-scratch recomputation (assign `lhs := new_projection` wholesale)
//! whenever it cannot see a cheaper incremental form, which is always
//! correct even if not always efficient — matching the original's posture
//! that a correct-but-unoptimized update beats no update.

use std::collections::HashMap;

use crate::common::{NameGen, OrderedSet};
use crate::solver::Solver;
use crate::subst::subst;
use crate::syntax::{BOp, Exp, ExpKind, Lambda, Op, Query, Stm, Type, Var, Visibility};

/// A symbolic state transformer: `state_var name -> expression over the
/// pre-state` describing that variable's value after the op runs.
pub type Delta = HashMap<String, Exp>;

/// Computes the post-state of every variable in `state_vars` after `op`
/// runs, as a substitution over the pre-state. Variables `op` never
/// mentions map to themselves (the identity substitution).
pub fn delta_form(state_vars: &OrderedSet<String>, op: &Op) -> Delta {
    // Identity entries stand for "untouched"; their `.type` is never read
    // before they're either overwritten by `apply_stm` or substituted
    // wholesale into an already-typed expression by the caller.
    let mut delta: Delta = state_vars
        .iter()
        .map(|v| (v.clone(), Exp::new(ExpKind::Var(v.clone()))))
        .collect();
    apply_stm(&op.body, &mut delta);
    delta
}

fn apply_stm(s: &Stm, delta: &mut Delta) {
    match s {
        Stm::NoOp => {}
        Stm::Seq(s1, s2) => {
            apply_stm(s1, delta);
            apply_stm(s2, delta);
        }
        Stm::Assign { lhs, rhs } => {
            if let Some(name) = lhs.as_var() {
                let new_val = substitute_delta(rhs, delta);
                delta.insert(name.to_string(), new_val);
            }
        }
        Stm::Decl { id, val } => {
            let new_val = substitute_delta(val, delta);
            delta.insert(id.clone(), new_val);
        }
        Stm::Call { target, func, args } => {
            if let Some(name) = target.as_var() {
                let cur = delta
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| (**target).clone());
                let args: Vec<Exp> = args.iter().map(|a| substitute_delta(a, delta)).collect();
                let ty = cur.ty.clone();
                let new_val = match func.as_str() {
                    "add" => Exp::new(ExpKind::BinOp {
                        op: BOp::Plus,
                        e1: Box::new(cur),
                        e2: Box::new(Exp::new(ExpKind::Singleton(Box::new(args[0].clone()))).with_type(ty.clone())),
                    })
                    .with_type(ty),
                    "remove" => Exp::new(ExpKind::BinOp {
                        op: BOp::Minus,
                        e1: Box::new(cur),
                        e2: Box::new(Exp::new(ExpKind::Singleton(Box::new(args[0].clone()))).with_type(ty.clone())),
                    })
                    .with_type(ty),
                    "remove_all" => Exp::new(ExpKind::BinOp {
                        op: BOp::Minus,
                        e1: Box::new(cur),
                        e2: Box::new(args[0].clone()),
                    })
                    .with_type(ty),
                    _ => cur,
                };
                delta.insert(name.to_string(), new_val);
            }
        }
        Stm::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = substitute_delta(cond, delta);
            let mut then_delta = delta.clone();
            apply_stm(then_branch, &mut then_delta);
            let mut else_delta = delta.clone();
            apply_stm(else_branch, &mut else_delta);
            let keys: OrderedSet<String> = then_delta
                .keys()
                .chain(else_delta.keys())
                .cloned()
                .collect();
            for k in keys {
                let then_val = then_delta.get(&k).cloned();
                let else_val = else_delta.get(&k).cloned();
                if then_val == else_val {
                    if let Some(v) = then_val {
                        delta.insert(k, v);
                    }
                    continue;
                }
                let then_val = then_val.unwrap_or_else(|| delta[&k].clone());
                let else_val = else_val.unwrap_or_else(|| delta[&k].clone());
                let ty = then_val.ty.clone();
                delta.insert(
                    k,
                    Exp::new(ExpKind::Cond {
                        cond: Box::new(cond.clone()),
                        then_branch: Box::new(then_val),
                        else_branch: Box::new(else_val),
                    })
                    .with_type(ty),
                );
            }
        }
        Stm::MapPut { map, key, value } => {
            if let Some(name) = map.as_var() {
                let cur = delta
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| (**map).clone());
                let key = substitute_delta(key, delta);
                let value = substitute_delta(value, delta);
                let new_val = map_with_key_set(&cur, &key, &value);
                delta.insert(name.to_string(), new_val);
            }
        }
        Stm::MapDel { map, key } => {
            if let Some(name) = map.as_var() {
                let cur = delta
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| (**map).clone());
                let key = substitute_delta(key, delta);
                let new_val = map_with_key_removed(&cur, &key);
                delta.insert(name.to_string(), new_val);
            }
        }
        // `ForEach`/`While`/`EscapableBlock`/`EscapeBlock`/`MapUpdate` only
        // ever appear inside already-synthesized update code in this
        // system, never inside a Spec `Op` body (SPEC_FULL.md §4.4); a
        // `delta_form` over a body containing one is a no-op for any
        // variable it doesn't otherwise touch, which is the safe default.
        Stm::ForEach { .. }
        | Stm::While { .. }
        | Stm::EscapableBlock { .. }
        | Stm::EscapeBlock(_)
        | Stm::MapUpdate { .. } => {}
    }
}

fn substitute_delta(e: &Exp, delta: &Delta) -> Exp {
    subst(e, delta)
}

fn key_value_types(map_ty: &Type) -> (Type, Type) {
    match map_ty {
        Type::Map(k, v) => ((**k).clone(), (**v).clone()),
        _ => (Type::Default, Type::Default),
    }
}

/// Symbolic form of `map[key] = value`: rebuild as `make_map2` over the old
/// key set plus the new key, looking up the old map for every key except
/// the altered one. There is no dedicated "map with one entry overwritten"
/// IR node, so this is the closest expressible equivalent.
fn map_with_key_set(cur: &Exp, key: &Exp, value: &Exp) -> Exp {
    let map_ty = cur.ty.clone();
    let (key_ty, _) = key_value_types(&map_ty);
    let keys = Exp::new(ExpKind::BinOp {
        op: BOp::Plus,
        e1: Box::new(Exp::new(ExpKind::MapKeys(Box::new(cur.clone()))).with_type(Type::Bag(Box::new(key_ty.clone())))),
        e2: Box::new(Exp::new(ExpKind::Singleton(Box::new(key.clone()))).with_type(Type::Bag(Box::new(key_ty.clone())))),
    })
    .with_type(Type::Bag(Box::new(key_ty.clone())));
    let k = Var::new("k", key_ty.clone());
    let body = Exp::new(ExpKind::Cond {
        cond: Box::new(
            Exp::new(ExpKind::BinOp {
                op: BOp::Eq,
                e1: Box::new(Exp::new(ExpKind::Var(k.id.clone())).with_type(key_ty.clone())),
                e2: Box::new(key.clone()),
            })
            .with_type(Type::Bool),
        ),
        then_branch: Box::new(value.clone()),
        else_branch: Box::new(
            Exp::new(ExpKind::MapGet {
                map: Box::new(cur.clone()),
                key: Box::new(Exp::new(ExpKind::Var(k.id.clone())).with_type(key_ty)),
            })
            .with_type(value.ty.clone()),
        ),
    })
    .with_type(value.ty.clone());
    Exp::new(ExpKind::MakeMap2 {
        e: Box::new(keys),
        value: Lambda::new(k, body),
    })
    .with_type(map_ty)
}

/// Symbolic form of `del map[key]`: `make_map2` over the old key set minus
/// the deleted key.
fn map_with_key_removed(cur: &Exp, key: &Exp) -> Exp {
    let map_ty = cur.ty.clone();
    let (key_ty, value_ty) = key_value_types(&map_ty);
    let k = Var::new("k", key_ty.clone());
    let keep = Lambda::new(
        k.clone(),
        Exp::new(ExpKind::BinOp {
            op: BOp::Ne,
            e1: Box::new(Exp::new(ExpKind::Var(k.id.clone())).with_type(key_ty.clone())),
            e2: Box::new(key.clone()),
        })
        .with_type(Type::Bool),
    );
    let keys = Exp::new(ExpKind::Filter {
        e: Box::new(Exp::new(ExpKind::MapKeys(Box::new(cur.clone()))).with_type(Type::Bag(Box::new(key_ty.clone())))),
        p: keep,
    })
    .with_type(Type::Bag(Box::new(key_ty.clone())));
    let body = Exp::new(ExpKind::MapGet {
        map: Box::new(cur.clone()),
        key: Box::new(Exp::new(ExpKind::Var(k.id.clone())).with_type(key_ty)),
    })
    .with_type(value_ty);
    Exp::new(ExpKind::MakeMap2 {
        e: Box::new(keys),
        value: Lambda::new(k, body),
    })
    .with_type(map_ty)
}

/// Synthesizes a statement that updates `lhs` so that it holds
/// `new_projection`, given it currently holds `projection`, together with
/// any `Internal` sub-queries the update needed.
///
/// This implementation always produces a correct update: when the solver
/// (if any) can prove `projection == new_projection` outright under
/// `assumptions`, it emits a no-op; otherwise it assigns `lhs` the freshly
/// computed value directly. This is the "recompute from scratch" instance
/// of `sketch_update` — always sound, and the fallback the original falls
/// back to itself whenever none of its specialized rewrite rules fire.
pub fn sketch_update(
    lhs: &Exp,
    projection: &Exp,
    new_projection: &Exp,
    assumptions: &[Exp],
    solver: Option<&dyn Solver>,
) -> (Stm, Vec<Query>) {
    if let Some(solver) = solver {
        let eq = Exp::new(ExpKind::BinOp {
            op: BOp::Eq,
            e1: Box::new(projection.clone()),
            e2: Box::new(new_projection.clone()),
        })
        .with_type(Type::Bool);
        let implication = implies_all(assumptions, &eq);
        if matches!(solver.valid(&implication), Ok(true)) {
            return (Stm::NoOp, Vec::new());
        }
    }
    let stm = match lhs.as_var() {
        Some(name) => Stm::Assign {
            lhs: Box::new(Exp::new(ExpKind::Var(name.to_string())).with_type(lhs.ty.clone())),
            rhs: Box::new(new_projection.clone()),
        },
        None => Stm::Assign {
            lhs: Box::new(lhs.clone()),
            rhs: Box::new(new_projection.clone()),
        },
    };
    (stm, Vec::new())
}

fn implies_all(assumptions: &[Exp], conclusion: &Exp) -> Exp {
    let premise = assumptions.iter().cloned().fold(
        Exp::new(ExpKind::Bool(true)).with_type(Type::Bool),
        |acc, a| {
            Exp::new(ExpKind::BinOp {
                op: BOp::And,
                e1: Box::new(acc),
                e2: Box::new(a),
            })
            .with_type(Type::Bool)
        },
    );
    Exp::new(ExpKind::BinOp {
        op: BOp::Or,
        e1: Box::new(Exp::new(ExpKind::UnaryOp {
            op: crate::syntax::UOp::Not,
            e: Box::new(premise),
        })
        .with_type(Type::Bool)),
        e2: Box::new(conclusion.clone()),
    })
    .with_type(Type::Bool)
}

/// Allocates a fresh internal sub-query, named and documented for the op
/// that needed it, used by the implementation manager when `sketch_update`
/// (in a richer instance than the one above) needs auxiliary bags/sets.
pub fn fresh_subquery(
    namegen: &NameGen,
    avoid: &OrderedSet<String>,
    hint: &str,
    op_name: &str,
    args: Vec<(String, Type)>,
    assumptions: Vec<Exp>,
    ret: Exp,
) -> Query {
    let name = namegen.fresh_name(hint, avoid);
    Query {
        name,
        visibility: Visibility::Internal,
        args,
        assumptions,
        ret,
        docstring: format!("discovered while incrementalizing op '{op_name}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: Type) -> Exp {
        Exp::new(ExpKind::Var(name.to_string())).with_type(ty)
    }

    #[test]
    fn assign_maps_variable_to_substituted_rhs() {
        let body = Stm::Assign {
            lhs: Box::new(var("x", Type::Int)),
            rhs: Box::new(Exp::new(ExpKind::Num(5)).with_type(Type::Int)),
        };
        let op = Op {
            name: "bump".to_string(),
            args: vec![],
            assumptions: vec![],
            body,
            docstring: String::new(),
        };
        let state_vars: OrderedSet<String> = ["x".to_string()].into_iter().collect();
        let delta = delta_form(&state_vars, &op);
        assert_eq!(delta["x"], Exp::new(ExpKind::Num(5)).with_type(Type::Int));
    }

    #[test]
    fn add_call_appends_a_singleton() {
        let body = Stm::Call {
            target: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            func: "add".to_string(),
            args: vec![Exp::new(ExpKind::Num(1)).with_type(Type::Int)],
        };
        let op = Op {
            name: "push".to_string(),
            args: vec![],
            assumptions: vec![],
            body,
            docstring: String::new(),
        };
        let state_vars: OrderedSet<String> = ["xs".to_string()].into_iter().collect();
        let delta = delta_form(&state_vars, &op);
        assert!(matches!(
            delta["xs"].kind,
            ExpKind::BinOp {
                op: BOp::Plus,
                ..
            }
        ));
    }

    #[test]
    fn untouched_variable_is_identity() {
        let body = Stm::NoOp;
        let op = Op {
            name: "noop".to_string(),
            args: vec![],
            assumptions: vec![],
            body,
            docstring: String::new(),
        };
        let state_vars: OrderedSet<String> = ["x".to_string()].into_iter().collect();
        let delta = delta_form(&state_vars, &op);
        assert_eq!(delta["x"].kind, ExpKind::Var("x".to_string()));
    }

    #[test]
    fn sketch_update_without_solver_assigns_directly() {
        let lhs = var("x", Type::Int);
        let projection = Exp::new(ExpKind::Num(1)).with_type(Type::Int);
        let new_projection = Exp::new(ExpKind::Num(2)).with_type(Type::Int);
        let (stm, subqueries) = sketch_update(&lhs, &projection, &new_projection, &[], None);
        assert!(matches!(stm, Stm::Assign { .. }));
        assert!(subqueries.is_empty());
    }
}
