//! Alpha-equivalence: are two expressions equal up to the names of their
//! bound variables?
//!
//! Grounded on `cozy/syntax_tools.py`'s `alpha_equivalent` and the test
//! scenarios in `tests/alpha_equivalence.py` (binders, free variables,
//! mixed binders, lambdas, `MakeMap`, tuples, and `MakeRecord` field
//! order). Two binders are matched by position: walking both trees in
//! lockstep, each side's bound names are mapped to the same synthetic
//! de Bruijn level, so renaming a binder consistently never changes the
//! comparison, but permuting `MakeRecord` fields does (field order is
//! part of a record's shape, same as `PartialEq` on `Vec`).

use std::collections::HashMap;

use crate::syntax::{Clause, Exp, ExpKind, Lambda, Var};

pub fn alpha_equivalent(e1: &Exp, e2: &Exp) -> bool {
    let mut ctx = Ctx::default();
    ctx.exp(e1, e2)
}

#[derive(Default)]
struct Ctx {
    left: HashMap<String, u64>,
    right: HashMap<String, u64>,
    depth: u64,
}

impl Ctx {
    fn with_binder<R>(&mut self, l: &str, r: &str, f: impl FnOnce(&mut Self) -> R) -> R {
        let level = self.depth;
        self.depth += 1;
        let old_l = self.left.insert(l.to_string(), level);
        let old_r = self.right.insert(r.to_string(), level);
        let result = f(self);
        match old_l {
            Some(v) => {
                self.left.insert(l.to_string(), v);
            }
            None => {
                self.left.remove(l);
            }
        }
        match old_r {
            Some(v) => {
                self.right.insert(r.to_string(), v);
            }
            None => {
                self.right.remove(r);
            }
        }
        self.depth -= 1;
        result
    }

    fn var_eq(&self, l: &str, r: &str) -> bool {
        match (self.left.get(l), self.right.get(r)) {
            (Some(a), Some(b)) => a == b,
            // Neither bound: both free, must be the literal same name.
            (None, None) => l == r,
            _ => false,
        }
    }

    fn lambda(&mut self, f1: &Lambda, f2: &Lambda) -> bool {
        if !f1.arg.ty.equivalent(&f2.arg.ty) {
            return false;
        }
        self.with_binder(&f1.arg.id, &f2.arg.id, |ctx| ctx.exp(&f1.body, &f2.body))
    }

    fn exp(&mut self, e1: &Exp, e2: &Exp) -> bool {
        if !e1.ty.equivalent(&e2.ty) {
            return false;
        }
        match (&e1.kind, &e2.kind) {
            (ExpKind::Var(a), ExpKind::Var(b)) => self.var_eq(a, b),
            (ExpKind::Bool(a), ExpKind::Bool(b)) => a == b,
            (ExpKind::Num(a), ExpKind::Num(b)) => a == b,
            (ExpKind::Str(a), ExpKind::Str(b)) => a == b,
            (ExpKind::Null, ExpKind::Null) => true,
            (ExpKind::EnumEntry(a), ExpKind::EnumEntry(b)) => a == b,
            (ExpKind::EmptyList, ExpKind::EmptyList) => true,
            (
                ExpKind::Cond {
                    cond: c1,
                    then_branch: t1,
                    else_branch: e1b,
                },
                ExpKind::Cond {
                    cond: c2,
                    then_branch: t2,
                    else_branch: e2b,
                },
            ) => self.exp(c1, c2) && self.exp(t1, t2) && self.exp(e1b, e2b),
            (
                ExpKind::BinOp {
                    op: o1,
                    e1: a1,
                    e2: b1,
                },
                ExpKind::BinOp {
                    op: o2,
                    e1: a2,
                    e2: b2,
                },
            ) => o1 == o2 && self.exp(a1, a2) && self.exp(b1, b2),
            (ExpKind::UnaryOp { op: o1, e: a }, ExpKind::UnaryOp { op: o2, e: b }) => {
                o1 == o2 && self.exp(a, b)
            }
            (ExpKind::ArgMin { e: a, f: fa }, ExpKind::ArgMin { e: b, f: fb })
            | (ExpKind::ArgMax { e: a, f: fa }, ExpKind::ArgMax { e: b, f: fb }) => {
                self.exp(a, b) && self.lambda(fa, fb)
            }
            (
                ExpKind::Handle {
                    addr: a1,
                    value: v1,
                },
                ExpKind::Handle {
                    addr: a2,
                    value: v2,
                },
            ) => self.exp(a1, a2) && self.exp(v1, v2),
            (ExpKind::MakeRecord(f1), ExpKind::MakeRecord(f2)) => {
                f1.len() == f2.len()
                    && f1
                        .iter()
                        .zip(f2.iter())
                        .all(|((n1, v1), (n2, v2))| n1 == n2 && self.exp(v1, v2))
            }
            (ExpKind::GetField { e: a, field: f1 }, ExpKind::GetField { e: b, field: f2 }) => {
                f1 == f2 && self.exp(a, b)
            }
            (ExpKind::Singleton(a), ExpKind::Singleton(b)) => self.exp(a, b),
            (
                ExpKind::ListComprehension {
                    clauses: c1,
                    body: b1,
                },
                ExpKind::ListComprehension {
                    clauses: c2,
                    body: b2,
                },
            ) => self.clauses(c1, c2, b1, b2),
            (ExpKind::Call { func: f1, args: a1 }, ExpKind::Call { func: f2, args: a2 }) => {
                f1 == f2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| self.exp(x, y))
            }
            (ExpKind::Tuple(a), ExpKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| self.exp(x, y))
            }
            (ExpKind::TupleGet { e: a, index: i1 }, ExpKind::TupleGet { e: b, index: i2 }) => {
                i1 == i2 && self.exp(a, b)
            }
            (ExpKind::Let { e: a, f: fa }, ExpKind::Let { e: b, f: fb })
            | (ExpKind::Map { e: a, f: fa }, ExpKind::Map { e: b, f: fb })
            | (ExpKind::FlatMap { e: a, f: fa }, ExpKind::FlatMap { e: b, f: fb }) => {
                self.exp(a, b) && self.lambda(fa, fb)
            }
            (ExpKind::Filter { e: a, p: pa }, ExpKind::Filter { e: b, p: pb }) => {
                self.exp(a, b) && self.lambda(pa, pb)
            }
            (
                ExpKind::MakeMap {
                    e: a,
                    key: k1,
                    value: v1,
                },
                ExpKind::MakeMap {
                    e: b,
                    key: k2,
                    value: v2,
                },
            ) => self.exp(a, b) && self.lambda(k1, k2) && self.lambda(v1, v2),
            (
                ExpKind::MakeMap2 { e: a, value: v1 },
                ExpKind::MakeMap2 { e: b, value: v2 },
            ) => self.exp(a, b) && self.lambda(v1, v2),
            (
                ExpKind::MapGet { map: m1, key: k1 },
                ExpKind::MapGet { map: m2, key: k2 },
            ) => self.exp(m1, m2) && self.exp(k1, k2),
            (ExpKind::MapKeys(a), ExpKind::MapKeys(b))
            | (ExpKind::StateVar(a), ExpKind::StateVar(b))
            | (ExpKind::EnumToInt(a), ExpKind::EnumToInt(b))
            | (ExpKind::BoolToInt(a), ExpKind::BoolToInt(b))
            | (ExpKind::Native(a), ExpKind::Native(b)) => self.exp(a, b),
            (
                ExpKind::VectorGet { e: a, index: i1 },
                ExpKind::VectorGet { e: b, index: i2 },
            ) => self.exp(a, b) && self.exp(i1, i2),
            (
                ExpKind::WithAlteredValue {
                    handle: h1,
                    new_value: n1,
                },
                ExpKind::WithAlteredValue {
                    handle: h2,
                    new_value: n2,
                },
            ) => self.exp(h1, h2) && self.exp(n1, n2),
            (ExpKind::Stm { e: a, .. }, ExpKind::Stm { e: b, .. }) => {
                // Embedded statements only ever appear internally during
                // incrementalization, where they are compared referentially
                // rather than up to alpha; comparing their result
                // expressions is the practically useful approximation.
                self.exp(a, b)
            }
            _ => false,
        }
    }

    fn clauses(
        &mut self,
        c1: &[Clause],
        c2: &[Clause],
        b1: &Exp,
        b2: &Exp,
    ) -> bool {
        if c1.len() != c2.len() {
            return false;
        }
        match (c1.split_first(), c2.split_first()) {
            (None, None) => self.exp(b1, b2),
            (Some((Clause::Pull { id: id1, e: e1 }, rest1)), Some((Clause::Pull { id: id2, e: e2 }, rest2))) => {
                if !self.exp(e1, e2) {
                    return false;
                }
                self.with_binder(id1, id2, |ctx| ctx.clauses(rest1, rest2, b1, b2))
            }
            (Some((Clause::Cond(e1), rest1)), Some((Clause::Cond(e2), rest2))) => {
                self.exp(e1, e2) && self.clauses(rest1, rest2, b1, b2)
            }
            _ => false,
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
    fn same_variable_name_is_equivalent() {
        assert!(alpha_equivalent(&var("x", Type::Int), &var("x", Type::Int)));
    }

    #[test]
    fn different_free_variables_are_not_equivalent() {
        assert!(!alpha_equivalent(&var("x", Type::Int), &var("y", Type::Int)));
    }

    #[test]
    fn lambdas_with_differently_named_binders_are_equivalent() {
        let f1 = Lambda::new(Var::new("x", Type::Int), var("x", Type::Int));
        let f2 = Lambda::new(Var::new("y", Type::Int), var("y", Type::Int));
        let e1 = Exp::new(ExpKind::Map {
            e: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            f: f1,
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        let e2 = Exp::new(ExpKind::Map {
            e: Box::new(var("xs", Type::Bag(Box::new(Type::Int)))),
            f: f2,
        })
        .with_type(Type::Bag(Box::new(Type::Int)));
        assert!(alpha_equivalent(&e1, &e2));
    }

    #[test]
    fn mixed_binders_still_compare_free_vars_literally() {
        // (\x -> x + z) vs (\y -> y + z): bound x/y unify, free z must match.
        let body1 = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(var("x", Type::Int)),
            e2: Box::new(var("z", Type::Int)),
        })
        .with_type(Type::Int);
        let body2 = Exp::new(ExpKind::BinOp {
            op: crate::syntax::BOp::Plus,
            e1: Box::new(var("y", Type::Int)),
            e2: Box::new(var("z", Type::Int)),
        })
        .with_type(Type::Int);
        let f1 = Lambda::new(Var::new("x", Type::Int), body1);
        let f2 = Lambda::new(Var::new("y", Type::Int), body2);
        assert!(Ctx::default().lambda(&f1, &f2));
    }

    #[test]
    fn make_record_field_order_matters() {
        let r1 = Exp::new(ExpKind::MakeRecord(vec![
            ("a".to_string(), var("x", Type::Int)),
            ("b".to_string(), var("y", Type::Int)),
        ]))
        .with_type(Type::Record(vec![("a".to_string(), Type::Int), ("b".to_string(), Type::Int)]));
        let r2 = Exp::new(ExpKind::MakeRecord(vec![
            ("b".to_string(), var("y", Type::Int)),
            ("a".to_string(), var("x", Type::Int)),
        ]))
        .with_type(Type::Record(vec![("b".to_string(), Type::Int), ("a".to_string(), Type::Int)]));
        assert!(!alpha_equivalent(&r1, &r2));
    }

    #[test]
    fn tuples_compare_elementwise() {
        let t1 = Exp::new(ExpKind::Tuple(vec![var("x", Type::Int), var("y", Type::Bool)]))
            .with_type(Type::Tuple(vec![Type::Int, Type::Bool]));
        let t2 = Exp::new(ExpKind::Tuple(vec![var("x", Type::Int), var("y", Type::Bool)]))
            .with_type(Type::Tuple(vec![Type::Int, Type::Bool]));
        assert!(alpha_equivalent(&t1, &t2));
    }

    #[test]
    fn tuple_is_not_equivalent_to_non_tuple() {
        let t1 = Exp::new(ExpKind::Tuple(vec![var("x", Type::Int)]))
            .with_type(Type::Tuple(vec![Type::Int]));
        let x = var("x", Type::Int);
        assert!(!alpha_equivalent(&t1, &x));
    }
}
