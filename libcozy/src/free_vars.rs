//! Free variable computation.
//!
//! Needs special binder handling that a generic bottom-up walk can't give
//! for free, so it is not built on `syntax::visitor` — each binder-typed
//! variant filters its own bound name out of the children's free variable
//! sets (grounded on `cozy/syntax_tools.py`'s `free_vars`, which does the
//! same filtering by hand rather than going through `BottomUpExplorer`).

use crate::common::OrderedSet;
use crate::syntax::{Clause, Exp, ExpKind, Lambda, Stm, Var};

/// Free variables of `e`, in the order they are first encountered during a
/// left-to-right, depth-first walk (mirrors the original's reliance on
/// dict-insertion order for the order in which free variables become
/// synthesized query arguments).
pub fn free_vars(e: &Exp) -> OrderedSet<Var> {
    let mut out = OrderedSet::new();
    collect_exp(e, &mut out);
    out
}

pub fn free_vars_stm(s: &Stm) -> OrderedSet<Var> {
    let mut out = OrderedSet::new();
    collect_stm(s, &mut out);
    out
}

fn remove(vars: &mut OrderedSet<Var>, id: &str) {
    vars.retain(|v| v.id != id);
}

fn collect_lambda(f: &Lambda, out: &mut OrderedSet<Var>) {
    let mut inner = OrderedSet::new();
    collect_exp(&f.body, &mut inner);
    remove(&mut inner, &f.arg.id);
    out.extend(inner);
}

fn collect_exp(e: &Exp, out: &mut OrderedSet<Var>) {
    match &e.kind {
        ExpKind::Var(id) => {
            out.insert(Var::new(id.clone(), e.ty.clone()));
        }
        ExpKind::Bool(_)
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
            collect_exp(cond, out);
            collect_exp(then_branch, out);
            collect_exp(else_branch, out);
        }
        ExpKind::BinOp { e1, e2, .. } => {
            collect_exp(e1, out);
            collect_exp(e2, out);
        }
        ExpKind::UnaryOp { e, .. }
        | ExpKind::Singleton(e)
        | ExpKind::MapKeys(e)
        | ExpKind::StateVar(e)
        | ExpKind::EnumToInt(e)
        | ExpKind::BoolToInt(e)
        | ExpKind::Native(e)
        | ExpKind::GetField { e, .. }
        | ExpKind::TupleGet { e, .. } => collect_exp(e, out),
        ExpKind::ArgMin { e, f } | ExpKind::ArgMax { e, f } => {
            collect_exp(e, out);
            collect_lambda(f, out);
        }
        ExpKind::Handle { addr, value } => {
            collect_exp(addr, out);
            collect_exp(value, out);
        }
        ExpKind::MakeRecord(fields) => {
            for (_, v) in fields {
                collect_exp(v, out);
            }
        }
        ExpKind::ListComprehension { clauses, body } => {
            // Each `Pull` binds its id for every clause/body to its right,
            // same scoping as a sequence of nested `for`s.
            let mut bound: Vec<String> = Vec::new();
            let mut inner = OrderedSet::new();
            for c in clauses {
                match c {
                    Clause::Pull { id, e } => {
                        collect_exp(e, &mut inner);
                        bound.push(id.clone());
                    }
                    Clause::Cond(e) => collect_exp(e, &mut inner),
                }
            }
            collect_exp(body, &mut inner);
            for id in &bound {
                remove(&mut inner, id);
            }
            out.extend(inner);
        }
        ExpKind::Call { args, .. } => {
            for a in args {
                collect_exp(a, out);
            }
        }
        ExpKind::Tuple(es) => {
            for e in es {
                collect_exp(e, out);
            }
        }
        ExpKind::Let { e, f } | ExpKind::Map { e, f } | ExpKind::FlatMap { e, f } => {
            collect_exp(e, out);
            collect_lambda(f, out);
        }
        ExpKind::Filter { e, p } => {
            collect_exp(e, out);
            collect_lambda(p, out);
        }
        ExpKind::MakeMap { e, key, value } => {
            collect_exp(e, out);
            collect_lambda(key, out);
            collect_lambda(value, out);
        }
        ExpKind::MakeMap2 { e, value } => {
            collect_exp(e, out);
            collect_lambda(value, out);
        }
        ExpKind::MapGet { map, key } => {
            collect_exp(map, out);
            collect_exp(key, out);
        }
        ExpKind::VectorGet { e, index } => {
            collect_exp(e, out);
            collect_exp(index, out);
        }
        ExpKind::WithAlteredValue { handle, new_value } => {
            collect_exp(handle, out);
            collect_exp(new_value, out);
        }
        ExpKind::Stm { stm, e } => {
            collect_stm(stm, out);
            collect_exp(e, out);
        }
    }
}

fn collect_stm(s: &Stm, out: &mut OrderedSet<Var>) {
    match s {
        Stm::NoOp | Stm::EscapeBlock(_) => {}
        Stm::Seq(s1, s2) => {
            collect_stm(s1, out);
            collect_stm(s2, out);
        }
        Stm::Call { target, args, .. } => {
            collect_exp(target, out);
            for a in args {
                collect_exp(a, out);
            }
        }
        Stm::Assign { lhs, rhs } => {
            collect_exp(lhs, out);
            collect_exp(rhs, out);
        }
        Stm::Decl { val, .. } => collect_exp(val, out),
        Stm::ForEach { id, iter, body } => {
            collect_exp(iter, out);
            let mut inner = OrderedSet::new();
            collect_stm(body, &mut inner);
            remove(&mut inner, &id.id);
            out.extend(inner);
        }
        Stm::If {
            cond,
            then_branch,
            else_branch,
        } => {
            collect_exp(cond, out);
            collect_stm(then_branch, out);
            collect_stm(else_branch, out);
        }
        Stm::While { cond, body } => {
            collect_exp(cond, out);
            collect_stm(body, out);
        }
        Stm::EscapableBlock { body, .. } => collect_stm(body, out),
        Stm::MapPut { map, key, value } => {
            collect_exp(map, out);
            collect_exp(key, out);
            collect_exp(value, out);
        }
        Stm::MapDel { map, key } => {
            collect_exp(map, out);
            collect_exp(key, out);
        }
        Stm::MapUpdate {
            map,
            key,
            val_var,
            change,
        } => {
            collect_exp(map, out);
            collect_exp(key, out);
            let mut inner = OrderedSet::new();
            collect_stm(change, &mut inner);
            remove(&mut inner, &val_var.id);
            out.extend(inner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Type;

    fn var(id: &str, ty: Type) -> Exp {
        Exp::new(ExpKind::Var(id.to_string())).with_type(ty)
    }

    #[test]
    fn var_is_its_own_free_var() {
        let e = var("x", Type::Int);
        let fv = free_vars(&e);
        assert_eq!(fv.len(), 1);
        assert_eq!(fv[0].id, "x");
    }

    #[test]
    fn lambda_binder_is_not_free() {
        let body = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(var("x", Type::Int)),
            e2: Box::new(var("y", Type::Int)),
        })
        .with_type(Type::Int);
        let f = Lambda::new(Var::new("x", Type::Int), body);
        let map_exp = Exp::new(ExpKind::Map {
            e: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            f,
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        let fv = free_vars(&map_exp);
        let ids: Vec<&str> = fv.iter().map(|v| v.id.as_str()).collect();
        assert!(ids.contains(&"xs"));
        assert!(ids.contains(&"y"));
        assert!(!ids.contains(&"x"));
    }

    #[test]
    fn nested_comprehension_binds_left_to_right() {
        // [x + y | x <- xs, y <- ys]
        let body = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(var("x", Type::Int)),
            e2: Box::new(var("y", Type::Int)),
        })
        .with_type(Type::Int);
        let comp = Exp::new(ExpKind::ListComprehension {
            clauses: vec![
                Clause::Pull {
                    id: "x".to_string(),
                    e: var("xs", Type::Bag(Box::new(Type::Int))),
                },
                Clause::Pull {
                    id: "y".to_string(),
                    e: var("ys", Type::Bag(Box::new(Type::Int))),
                },
            ],
            body: Box::new(body),
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        let fv = free_vars(&comp);
        let ids: Vec<&str> = fv.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["xs", "ys"]);
    }
}
