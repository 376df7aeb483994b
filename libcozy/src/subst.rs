//! Capture-avoiding substitution.
//!
//! Grounded on `cozy/syntax_tools.py`'s `subst`, which renames a bound
//! variable in place whenever it would otherwise capture a free variable
//! of one of the expressions being substituted in. The Rust version keeps
//! the same two-part strategy: a precomputed `avoid` set (the free
//! variables of every replacement expression) decides whether a binder
//! needs renaming at all, and a shared `NameGen` picks the replacement
//! name when it does.

use std::collections::HashMap;

use crate::common::NameGen;
use crate::errors::CozyError;
use crate::free_vars::free_vars;
use crate::syntax::{Clause, Exp, ExpKind, Lambda, Op, Query, Stm, Type, Var};

/// Checks the one substitution case `subst`/`subst_stm` can never recover
/// from by renaming: a query or op argument can't be renamed the way a
/// lambda/`ForEach`/`MapUpdate` binder can (callers depend on its name and
/// position), so if `env` would capture one, this fails loudly rather than
/// silently shadowing it. Grounded on `cozy/syntax_tools.py:640-745`'s
/// `visit_Query`/`visit_Op`, which raise `NotImplementedError` in exactly
/// this case.
pub fn check_no_arg_capture(
    args: &[(String, Type)],
    env: &HashMap<String, Exp>,
    method: &str,
) -> Result<(), CozyError> {
    let avoid = avoid_set(env);
    for (name, _) in args {
        if avoid.contains(name) {
            return Err(CozyError::CaptureError {
                arg: name.clone(),
                method: method.to_string(),
            });
        }
    }
    Ok(())
}

/// Substitutes into a query's assumptions and return expression,
/// shadowing any replacement whose key is one of `q`'s own arguments, and
/// failing with `CozyError::CaptureError` instead of renaming them if one
/// would otherwise be captured.
pub fn subst_query(q: &Query, env: &HashMap<String, Exp>) -> Result<Query, CozyError> {
    check_no_arg_capture(&q.args, env, &q.name)?;
    let mut inner = env.clone();
    for (name, _) in &q.args {
        inner.remove(name);
    }
    Ok(Query {
        name: q.name.clone(),
        visibility: q.visibility,
        args: q.args.clone(),
        assumptions: q.assumptions.iter().map(|a| subst(a, &inner)).collect(),
        ret: subst(&q.ret, &inner),
        docstring: q.docstring.clone(),
    })
}

/// The `subst_query` analogue for ops.
pub fn subst_op(op: &Op, env: &HashMap<String, Exp>) -> Result<Op, CozyError> {
    check_no_arg_capture(&op.args, env, &op.name)?;
    let mut inner = env.clone();
    for (name, _) in &op.args {
        inner.remove(name);
    }
    Ok(Op {
        name: op.name.clone(),
        args: op.args.clone(),
        assumptions: op.assumptions.iter().map(|a| subst(a, &inner)).collect(),
        body: subst_stm(&op.body, &inner),
        docstring: op.docstring.clone(),
    })
}

pub fn subst(e: &Exp, env: &HashMap<String, Exp>) -> Exp {
    if env.is_empty() {
        return e.clone();
    }
    let avoid = avoid_set(env);
    let namegen = NameGen::new("_capture");
    let mut s = Subst {
        namegen: &namegen,
        avoid: &avoid,
    };
    s.exp(e, env)
}

pub fn subst_stm(s: &Stm, env: &HashMap<String, Exp>) -> Stm {
    if env.is_empty() {
        return s.clone();
    }
    let avoid = avoid_set(env);
    let namegen = NameGen::new("_capture");
    let mut subst = Subst {
        namegen: &namegen,
        avoid: &avoid,
    };
    subst.stm(s, env)
}

fn avoid_set(env: &HashMap<String, Exp>) -> crate::common::OrderedSet<String> {
    let mut avoid = crate::common::OrderedSet::new();
    for e in env.values() {
        for v in free_vars(e) {
            avoid.insert(v.id);
        }
    }
    avoid
}

struct Subst<'a> {
    namegen: &'a NameGen,
    avoid: &'a crate::common::OrderedSet<String>,
}

impl<'a> Subst<'a> {
    /// Enter a binder named `arg`. Returns the (possibly renamed) binder
    /// and the environment to use while recursing into its scope.
    fn enter(&self, arg: &Var, env: &HashMap<String, Exp>) -> (Var, HashMap<String, Exp>) {
        let mut inner = env.clone();
        if self.avoid.contains(&arg.id) {
            let fresh_id = self.namegen.fresh_name(&arg.id, self.avoid);
            let fresh = Var::new(fresh_id.clone(), arg.ty.clone());
            inner.insert(
                arg.id.clone(),
                Exp::new(ExpKind::Var(fresh_id)).with_type(arg.ty.clone()),
            );
            (fresh, inner)
        } else {
            // Shadowing: this binder's name is no longer substitutable
            // inside its own body.
            inner.remove(&arg.id);
            (arg.clone(), inner)
        }
    }

    fn lambda(&self, f: &Lambda, env: &HashMap<String, Exp>) -> Lambda {
        let (arg, inner) = self.enter(&f.arg, env);
        Lambda::new(arg, self.exp(&f.body, &inner))
    }

    fn exp(&mut self, e: &Exp, env: &HashMap<String, Exp>) -> Exp {
        let ty = e.ty.clone();
        match &e.kind {
            ExpKind::Var(id) => match env.get(id) {
                Some(replacement) => replacement.clone(),
                None => e.clone(),
            },
            ExpKind::Bool(_)
            | ExpKind::Num(_)
            | ExpKind::Str(_)
            | ExpKind::Null
            | ExpKind::EnumEntry(_)
            | ExpKind::EmptyList => e.clone(),
            ExpKind::Cond {
                cond,
                then_branch,
                else_branch,
            } => Exp::new(ExpKind::Cond {
                cond: Box::new(self.exp(cond, env)),
                then_branch: Box::new(self.exp(then_branch, env)),
                else_branch: Box::new(self.exp(else_branch, env)),
            })
            .with_type(ty),
            ExpKind::BinOp { op, e1, e2 } => Exp::new(ExpKind::BinOp {
                op: *op,
                e1: Box::new(self.exp(e1, env)),
                e2: Box::new(self.exp(e2, env)),
            })
            .with_type(ty),
            ExpKind::UnaryOp { op, e } => Exp::new(ExpKind::UnaryOp {
                op: *op,
                e: Box::new(self.exp(e, env)),
            })
            .with_type(ty),
            ExpKind::ArgMin { e, f } => Exp::new(ExpKind::ArgMin {
                e: Box::new(self.exp(e, env)),
                f: self.lambda(f, env),
            })
            .with_type(ty),
            ExpKind::ArgMax { e, f } => Exp::new(ExpKind::ArgMax {
                e: Box::new(self.exp(e, env)),
                f: self.lambda(f, env),
            })
            .with_type(ty),
            ExpKind::Handle { addr, value } => Exp::new(ExpKind::Handle {
                addr: Box::new(self.exp(addr, env)),
                value: Box::new(self.exp(value, env)),
            })
            .with_type(ty),
            ExpKind::MakeRecord(fields) => Exp::new(ExpKind::MakeRecord(
                fields
                    .iter()
                    .map(|(n, v)| (n.clone(), self.exp(v, env)))
                    .collect(),
            ))
            .with_type(ty),
            ExpKind::GetField { e, field } => Exp::new(ExpKind::GetField {
                e: Box::new(self.exp(e, env)),
                field: field.clone(),
            })
            .with_type(ty),
            ExpKind::Singleton(e) => {
                Exp::new(ExpKind::Singleton(Box::new(self.exp(e, env)))).with_type(ty)
            }
            ExpKind::ListComprehension { clauses, body } => {
                let mut cur_env = env.clone();
                let mut new_clauses = Vec::with_capacity(clauses.len());
                for c in clauses {
                    match c {
                        Clause::Pull { id, e } => {
                            let new_e = self.exp(e, &cur_env);
                            let (new_var, inner) =
                                self.enter(&Var::new(id.clone(), e.ty.clone()), &cur_env);
                            cur_env = inner;
                            new_clauses.push(Clause::Pull {
                                id: new_var.id,
                                e: new_e,
                            });
                        }
                        Clause::Cond(e) => {
                            new_clauses.push(Clause::Cond(self.exp(e, &cur_env)));
                        }
                    }
                }
                let body = self.exp(body, &cur_env);
                Exp::new(ExpKind::ListComprehension {
                    clauses: new_clauses,
                    body: Box::new(body),
                })
                .with_type(ty)
            }
            ExpKind::Call { func, args } => Exp::new(ExpKind::Call {
                func: func.clone(),
                args: args.iter().map(|a| self.exp(a, env)).collect(),
            })
            .with_type(ty),
            ExpKind::Tuple(es) => {
                Exp::new(ExpKind::Tuple(es.iter().map(|e| self.exp(e, env)).collect()))
                    .with_type(ty)
            }
            ExpKind::TupleGet { e, index } => Exp::new(ExpKind::TupleGet {
                e: Box::new(self.exp(e, env)),
                index: *index,
            })
            .with_type(ty),
            ExpKind::Let { e, f } => Exp::new(ExpKind::Let {
                e: Box::new(self.exp(e, env)),
                f: self.lambda(f, env),
            })
            .with_type(ty),
            ExpKind::Map { e, f } => Exp::new(ExpKind::Map {
                e: Box::new(self.exp(e, env)),
                f: self.lambda(f, env),
            })
            .with_type(ty),
            ExpKind::Filter { e, p } => Exp::new(ExpKind::Filter {
                e: Box::new(self.exp(e, env)),
                p: self.lambda(p, env),
            })
            .with_type(ty),
            ExpKind::FlatMap { e, f } => Exp::new(ExpKind::FlatMap {
                e: Box::new(self.exp(e, env)),
                f: self.lambda(f, env),
            })
            .with_type(ty),
            ExpKind::MakeMap { e, key, value } => Exp::new(ExpKind::MakeMap {
                e: Box::new(self.exp(e, env)),
                key: self.lambda(key, env),
                value: self.lambda(value, env),
            })
            .with_type(ty),
            ExpKind::MakeMap2 { e, value } => Exp::new(ExpKind::MakeMap2 {
                e: Box::new(self.exp(e, env)),
                value: self.lambda(value, env),
            })
            .with_type(ty),
            ExpKind::MapGet { map, key } => Exp::new(ExpKind::MapGet {
                map: Box::new(self.exp(map, env)),
                key: Box::new(self.exp(key, env)),
            })
            .with_type(ty),
            ExpKind::MapKeys(e) => {
                Exp::new(ExpKind::MapKeys(Box::new(self.exp(e, env)))).with_type(ty)
            }
            ExpKind::StateVar(e) => {
                Exp::new(ExpKind::StateVar(Box::new(self.exp(e, env)))).with_type(ty)
            }
            ExpKind::VectorGet { e, index } => Exp::new(ExpKind::VectorGet {
                e: Box::new(self.exp(e, env)),
                index: Box::new(self.exp(index, env)),
            })
            .with_type(ty),
            ExpKind::WithAlteredValue { handle, new_value } => {
                Exp::new(ExpKind::WithAlteredValue {
                    handle: Box::new(self.exp(handle, env)),
                    new_value: Box::new(self.exp(new_value, env)),
                })
                .with_type(ty)
            }
            ExpKind::Stm { stm, e } => Exp::new(ExpKind::Stm {
                stm: Box::new(self.stm(stm, env)),
                e: Box::new(self.exp(e, env)),
            })
            .with_type(ty),
            ExpKind::EnumToInt(e) => {
                Exp::new(ExpKind::EnumToInt(Box::new(self.exp(e, env)))).with_type(ty)
            }
            ExpKind::BoolToInt(e) => {
                Exp::new(ExpKind::BoolToInt(Box::new(self.exp(e, env)))).with_type(ty)
            }
            ExpKind::Native(e) => {
                Exp::new(ExpKind::Native(Box::new(self.exp(e, env)))).with_type(ty)
            }
        }
    }

    fn stm(&mut self, s: &Stm, env: &HashMap<String, Exp>) -> Stm {
        match s {
            Stm::NoOp => Stm::NoOp,
            Stm::Seq(s1, s2) => Stm::Seq(
                Box::new(self.stm(s1, env)),
                Box::new(self.stm(s2, env)),
            ),
            Stm::Call {
                target,
                func,
                args,
            } => Stm::Call {
                target: Box::new(self.exp(target, env)),
                func: func.clone(),
                args: args.iter().map(|a| self.exp(a, env)).collect(),
            },
            Stm::Assign { lhs, rhs } => Stm::Assign {
                lhs: Box::new(self.exp(lhs, env)),
                rhs: Box::new(self.exp(rhs, env)),
            },
            Stm::Decl { id, val } => Stm::Decl {
                id: id.clone(),
                val: Box::new(self.exp(val, env)),
            },
            Stm::ForEach { id, iter, body } => {
                let new_iter = self.exp(iter, env);
                let (new_id, inner) = self.enter(id, env);
                Stm::ForEach {
                    id: new_id,
                    iter: Box::new(new_iter),
                    body: Box::new(self.stm(body, &inner)),
                }
            }
            Stm::If {
                cond,
                then_branch,
                else_branch,
            } => Stm::If {
                cond: Box::new(self.exp(cond, env)),
                then_branch: Box::new(self.stm(then_branch, env)),
                else_branch: Box::new(self.stm(else_branch, env)),
            },
            Stm::While { cond, body } => Stm::While {
                cond: Box::new(self.exp(cond, env)),
                body: Box::new(self.stm(body, env)),
            },
            Stm::EscapableBlock { label, body } => Stm::EscapableBlock {
                label: label.clone(),
                body: Box::new(self.stm(body, env)),
            },
            Stm::EscapeBlock(label) => Stm::EscapeBlock(label.clone()),
            Stm::MapPut { map, key, value } => Stm::MapPut {
                map: Box::new(self.exp(map, env)),
                key: Box::new(self.exp(key, env)),
                value: Box::new(self.exp(value, env)),
            },
            Stm::MapDel { map, key } => Stm::MapDel {
                map: Box::new(self.exp(map, env)),
                key: Box::new(self.exp(key, env)),
            },
            Stm::MapUpdate {
                map,
                key,
                val_var,
                change,
            } => {
                let new_map = self.exp(map, env);
                let new_key = self.exp(key, env);
                let (new_val_var, inner) = self.enter(val_var, env);
                Stm::MapUpdate {
                    map: Box::new(new_map),
                    key: Box::new(new_key),
                    val_var: new_val_var,
                    change: Box::new(self.stm(change, &inner)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Type, Visibility};

    fn var(id: &str, ty: Type) -> Exp {
        Exp::new(ExpKind::Var(id.to_string())).with_type(ty)
    }

    #[test]
    fn subst_query_substitutes_into_ret_and_assumptions() {
        let q = Query {
            name: "q".to_string(),
            visibility: Visibility::Public,
            args: vec![("n".to_string(), Type::Int)],
            assumptions: vec![Exp::new(ExpKind::BinOp {
                op: crate::syntax::BOp::Ge,
                e1: Box::new(var("total", Type::Int)),
                e2: Box::new(Exp::new(ExpKind::Num(0)).with_type(Type::Int)),
            })
            .with_type(Type::Bool)],
            ret: var("total", Type::Int),
            docstring: String::new(),
        };
        let mut env = HashMap::new();
        env.insert("total".to_string(), var("state_total", Type::Int));
        let result = subst_query(&q, &env).unwrap();
        assert_eq!(result.ret.as_var(), Some("state_total"));
    }

    #[test]
    fn subst_query_leaves_its_own_argument_untouched() {
        let q = Query {
            name: "q".to_string(),
            visibility: Visibility::Public,
            args: vec![("n".to_string(), Type::Int)],
            assumptions: vec![],
            ret: var("n", Type::Int),
            docstring: String::new(),
        };
        let mut env = HashMap::new();
        env.insert("n".to_string(), var("replacement", Type::Int));
        let result = subst_query(&q, &env).unwrap();
        assert_eq!(result.ret.as_var(), Some("n"));
    }

    #[test]
    fn subst_query_fails_loudly_when_env_would_capture_an_argument() {
        let q = Query {
            name: "q".to_string(),
            visibility: Visibility::Public,
            args: vec![("n".to_string(), Type::Int)],
            assumptions: vec![],
            ret: var("m", Type::Int),
            docstring: String::new(),
        };
        // Replacing `m` with an expression that mentions `n` would capture
        // `q`'s own argument if `subst_query` silently renamed it.
        let mut env = HashMap::new();
        env.insert("m".to_string(), var("n", Type::Int));
        let err = subst_query(&q, &env).unwrap_err();
        assert!(matches!(
            err,
            CozyError::CaptureError { arg, method } if arg == "n" && method == "q"
        ));
    }

    #[test]
    fn subst_op_substitutes_into_body_and_respects_its_own_argument() {
        let op = Op {
            name: "bump".to_string(),
            args: vec![("by".to_string(), Type::Int)],
            assumptions: vec![],
            body: Stm::Assign {
                lhs: Box::new(var("total", Type::Int)),
                rhs: Box::new(Exp::new(ExpKind::BinOp {
                    op: crate::syntax::BOp::Plus,
                    e1: Box::new(var("total", Type::Int)),
                    e2: Box::new(var("by", Type::Int)),
                })
                .with_type(Type::Int)),
            },
            docstring: String::new(),
        };
        let mut env = HashMap::new();
        env.insert("total".to_string(), var("state_total", Type::Int));
        let result = subst_op(&op, &env).unwrap();
        if let Stm::Assign { lhs, rhs } = &result.body {
            assert_eq!(lhs.as_var(), Some("state_total"));
            if let ExpKind::BinOp { e1, e2, .. } = &rhs.kind {
                assert_eq!(e1.as_var(), Some("state_total"));
                assert_eq!(e2.as_var(), Some("by"));
            } else {
                panic!("expected BinOp");
            }
        } else {
            panic!("expected Assign");
        }
    }

    #[test]
    fn replaces_free_occurrence() {
        let e = var("x", Type::Int);
        let mut env = HashMap::new();
        env.insert("x".to_string(), var("y", Type::Int));
        let result = subst(&e, &env);
        assert_eq!(result.as_var(), Some("y"));
    }

    #[test]
    fn does_not_substitute_under_shadowing_binder() {
        // (\x -> x)[x := y] should leave the lambda's `x` untouched.
        let f = Lambda::new(Var::new("x", Type::Int), var("x", Type::Int));
        let e = Exp::new(ExpKind::Map {
            e: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            f,
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        let mut env = HashMap::new();
        env.insert("x".to_string(), var("y", Type::Int));
        let result = subst(&e, &env);
        if let ExpKind::Map { f, .. } = &result.kind {
            assert_eq!(f.arg.id, "x");
            assert_eq!(f.body.as_var(), Some("x"));
        } else {
            panic!("expected Map");
        }
    }

    #[test]
    fn renames_binder_to_avoid_capture() {
        // (\y -> x + y)[x := y] must rename the bound y.
        let body = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(var("x", Type::Int)),
            e2: Box::new(var("y", Type::Int)),
        })
        .with_type(Type::Int);
        let f = Lambda::new(Var::new("y", Type::Int), body);
        let e = Exp::new(ExpKind::Map {
            e: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            f,
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        let mut env = HashMap::new();
        env.insert("x".to_string(), var("y", Type::Int));
        let result = subst(&e, &env);
        if let ExpKind::Map { f, .. } = &result.kind {
            assert_ne!(f.arg.id, "y");
            assert_ne!(f.arg.id, "x");
        } else {
            panic!("expected Map");
        }
    }
}
