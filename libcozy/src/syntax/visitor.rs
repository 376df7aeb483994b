//! Bottom-up rewriting over the IR.
//!
//! The original system dispatches on a dynamically-looked-up
//! `visit_<TypeName>` method (`cozy.common.Visitor`). A statically typed
//! implementation expresses the same contract as an exhaustive match that
//! rebuilds a node from its already-rewritten children and then applies an
//! optional node-specific rule (SPEC_FULL.md §9, "Visitors"). `Rewriter`
//! is that contract: implementors override `visit_exp`/`visit_stm` for the
//! cases they care about and delegate to `walk_exp`/`walk_stm` (the
//! generic "rewrite my children, keep my shape" step) for everything else,
//! exactly mirroring how the teacher's `Visitor` implementations
//! (`SwitchToIf`, `ToBoxStack`) override only the cases they touch.

use super::expr::{Clause, Exp, ExpKind, Lambda};
use super::stmt::Stm;

pub trait Rewriter {
    fn visit_exp(&mut self, e: Exp) -> Exp {
        self.walk_exp(e)
    }

    fn visit_stm(&mut self, s: Stm) -> Stm {
        self.walk_stm(s)
    }

    fn visit_lambda(&mut self, f: Lambda) -> Lambda {
        Lambda {
            arg: f.arg,
            body: Box::new(self.visit_exp(*f.body)),
        }
    }

    /// Rewrite every immediate child with `visit_exp`/`visit_stm`/
    /// `visit_lambda` and rebuild the same variant. Call this from inside
    /// an overridden `visit_exp` to recurse before applying a
    /// node-specific rule.
    fn walk_exp(&mut self, e: Exp) -> Exp {
        let ty = e.ty;
        let kind = match e.kind {
            ExpKind::Var(_)
            | ExpKind::Bool(_)
            | ExpKind::Num(_)
            | ExpKind::Str(_)
            | ExpKind::Null
            | ExpKind::EnumEntry(_)
            | ExpKind::EmptyList => return Exp { kind: e.kind, ty },
            ExpKind::Cond {
                cond,
                then_branch,
                else_branch,
            } => ExpKind::Cond {
                cond: Box::new(self.visit_exp(*cond)),
                then_branch: Box::new(self.visit_exp(*then_branch)),
                else_branch: Box::new(self.visit_exp(*else_branch)),
            },
            ExpKind::BinOp { op, e1, e2 } => ExpKind::BinOp {
                op,
                e1: Box::new(self.visit_exp(*e1)),
                e2: Box::new(self.visit_exp(*e2)),
            },
            ExpKind::UnaryOp { op, e } => ExpKind::UnaryOp {
                op,
                e: Box::new(self.visit_exp(*e)),
            },
            ExpKind::ArgMin { e, f } => ExpKind::ArgMin {
                e: Box::new(self.visit_exp(*e)),
                f: self.visit_lambda(f),
            },
            ExpKind::ArgMax { e, f } => ExpKind::ArgMax {
                e: Box::new(self.visit_exp(*e)),
                f: self.visit_lambda(f),
            },
            ExpKind::Handle { addr, value } => ExpKind::Handle {
                addr: Box::new(self.visit_exp(*addr)),
                value: Box::new(self.visit_exp(*value)),
            },
            ExpKind::MakeRecord(fields) => ExpKind::MakeRecord(
                fields
                    .into_iter()
                    .map(|(name, val)| (name, self.visit_exp(val)))
                    .collect(),
            ),
            ExpKind::GetField { e, field } => ExpKind::GetField {
                e: Box::new(self.visit_exp(*e)),
                field,
            },
            ExpKind::Singleton(e) => ExpKind::Singleton(Box::new(self.visit_exp(*e))),
            ExpKind::ListComprehension { clauses, body } => ExpKind::ListComprehension {
                clauses: clauses
                    .into_iter()
                    .map(|c| match c {
                        Clause::Pull { id, e } => Clause::Pull {
                            id,
                            e: self.visit_exp(e),
                        },
                        Clause::Cond(e) => Clause::Cond(self.visit_exp(e)),
                    })
                    .collect(),
                body: Box::new(self.visit_exp(*body)),
            },
            ExpKind::Call { func, args } => ExpKind::Call {
                func,
                args: args.into_iter().map(|a| self.visit_exp(a)).collect(),
            },
            ExpKind::Tuple(es) => {
                ExpKind::Tuple(es.into_iter().map(|e| self.visit_exp(e)).collect())
            }
            ExpKind::TupleGet { e, index } => ExpKind::TupleGet {
                e: Box::new(self.visit_exp(*e)),
                index,
            },
            ExpKind::Let { e, f } => ExpKind::Let {
                e: Box::new(self.visit_exp(*e)),
                f: self.visit_lambda(f),
            },
            ExpKind::Map { e, f } => ExpKind::Map {
                e: Box::new(self.visit_exp(*e)),
                f: self.visit_lambda(f),
            },
            ExpKind::Filter { e, p } => ExpKind::Filter {
                e: Box::new(self.visit_exp(*e)),
                p: self.visit_lambda(p),
            },
            ExpKind::FlatMap { e, f } => ExpKind::FlatMap {
                e: Box::new(self.visit_exp(*e)),
                f: self.visit_lambda(f),
            },
            ExpKind::MakeMap { e, key, value } => ExpKind::MakeMap {
                e: Box::new(self.visit_exp(*e)),
                key: self.visit_lambda(key),
                value: self.visit_lambda(value),
            },
            ExpKind::MakeMap2 { e, value } => ExpKind::MakeMap2 {
                e: Box::new(self.visit_exp(*e)),
                value: self.visit_lambda(value),
            },
            ExpKind::MapGet { map, key } => ExpKind::MapGet {
                map: Box::new(self.visit_exp(*map)),
                key: Box::new(self.visit_exp(*key)),
            },
            ExpKind::MapKeys(e) => ExpKind::MapKeys(Box::new(self.visit_exp(*e))),
            ExpKind::StateVar(e) => ExpKind::StateVar(Box::new(self.visit_exp(*e))),
            ExpKind::VectorGet { e, index } => ExpKind::VectorGet {
                e: Box::new(self.visit_exp(*e)),
                index: Box::new(self.visit_exp(*index)),
            },
            ExpKind::WithAlteredValue { handle, new_value } => ExpKind::WithAlteredValue {
                handle: Box::new(self.visit_exp(*handle)),
                new_value: Box::new(self.visit_exp(*new_value)),
            },
            ExpKind::Stm { stm, e } => ExpKind::Stm {
                stm: Box::new(self.visit_stm(*stm)),
                e: Box::new(self.visit_exp(*e)),
            },
            ExpKind::EnumToInt(e) => ExpKind::EnumToInt(Box::new(self.visit_exp(*e))),
            ExpKind::BoolToInt(e) => ExpKind::BoolToInt(Box::new(self.visit_exp(*e))),
            ExpKind::Native(e) => ExpKind::Native(Box::new(self.visit_exp(*e))),
        };
        Exp { kind, ty }
    }

    fn walk_stm(&mut self, s: Stm) -> Stm {
        match s {
            Stm::NoOp => Stm::NoOp,
            Stm::Seq(s1, s2) => Stm::Seq(
                Box::new(self.visit_stm(*s1)),
                Box::new(self.visit_stm(*s2)),
            ),
            Stm::Call {
                target,
                func,
                args,
            } => Stm::Call {
                target: Box::new(self.visit_exp(*target)),
                func,
                args: args.into_iter().map(|a| self.visit_exp(a)).collect(),
            },
            Stm::Assign { lhs, rhs } => Stm::Assign {
                lhs: Box::new(self.visit_exp(*lhs)),
                rhs: Box::new(self.visit_exp(*rhs)),
            },
            Stm::Decl { id, val } => Stm::Decl {
                id,
                val: Box::new(self.visit_exp(*val)),
            },
            Stm::ForEach { id, iter, body } => Stm::ForEach {
                id,
                iter: Box::new(self.visit_exp(*iter)),
                body: Box::new(self.visit_stm(*body)),
            },
            Stm::If {
                cond,
                then_branch,
                else_branch,
            } => Stm::If {
                cond: Box::new(self.visit_exp(*cond)),
                then_branch: Box::new(self.visit_stm(*then_branch)),
                else_branch: Box::new(self.visit_stm(*else_branch)),
            },
            Stm::While { cond, body } => Stm::While {
                cond: Box::new(self.visit_exp(*cond)),
                body: Box::new(self.visit_stm(*body)),
            },
            Stm::EscapableBlock { label, body } => Stm::EscapableBlock {
                label,
                body: Box::new(self.visit_stm(*body)),
            },
            Stm::EscapeBlock(label) => Stm::EscapeBlock(label),
            Stm::MapPut { map, key, value } => Stm::MapPut {
                map: Box::new(self.visit_exp(*map)),
                key: Box::new(self.visit_exp(*key)),
                value: Box::new(self.visit_exp(*value)),
            },
            Stm::MapDel { map, key } => Stm::MapDel {
                map: Box::new(self.visit_exp(*map)),
                key: Box::new(self.visit_exp(*key)),
            },
            Stm::MapUpdate {
                map,
                key,
                val_var,
                change,
            } => Stm::MapUpdate {
                map: Box::new(self.visit_exp(*map)),
                key: Box::new(self.visit_exp(*key)),
                val_var,
                change: Box::new(self.visit_stm(*change)),
            },
        }
    }
}

/// Read-only traversal, for callers that only need to observe the tree
/// (e.g. collecting the set of queries an update statement calls).
pub trait Explorer {
    fn visit_exp(&mut self, e: &Exp) {
        self.walk_exp(e)
    }

    fn visit_stm(&mut self, s: &Stm) {
        self.walk_stm(s)
    }

    fn walk_exp(&mut self, e: &Exp) {
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
                self.visit_exp(cond);
                self.visit_exp(then_branch);
                self.visit_exp(else_branch);
            }
            ExpKind::BinOp { e1, e2, .. } => {
                self.visit_exp(e1);
                self.visit_exp(e2);
            }
            ExpKind::UnaryOp { e, .. }
            | ExpKind::Singleton(e)
            | ExpKind::MapKeys(e)
            | ExpKind::StateVar(e)
            | ExpKind::EnumToInt(e)
            | ExpKind::BoolToInt(e)
            | ExpKind::Native(e)
            | ExpKind::GetField { e, .. }
            | ExpKind::TupleGet { e, .. } => self.visit_exp(e),
            ExpKind::ArgMin { e, f } | ExpKind::ArgMax { e, f } => {
                self.visit_exp(e);
                self.visit_exp(&f.body);
            }
            ExpKind::Handle { addr, value } => {
                self.visit_exp(addr);
                self.visit_exp(value);
            }
            ExpKind::MakeRecord(fields) => {
                for (_, v) in fields {
                    self.visit_exp(v);
                }
            }
            ExpKind::ListComprehension { clauses, body } => {
                for c in clauses {
                    match c {
                        Clause::Pull { e, .. } => self.visit_exp(e),
                        Clause::Cond(e) => self.visit_exp(e),
                    }
                }
                self.visit_exp(body);
            }
            ExpKind::Call { args, .. } => {
                for a in args {
                    self.visit_exp(a);
                }
            }
            ExpKind::Tuple(es) => {
                for e in es {
                    self.visit_exp(e);
                }
            }
            ExpKind::Let { e, f } | ExpKind::Map { e, f } | ExpKind::FlatMap { e, f } => {
                self.visit_exp(e);
                self.visit_exp(&f.body);
            }
            ExpKind::Filter { e, p } => {
                self.visit_exp(e);
                self.visit_exp(&p.body);
            }
            ExpKind::MakeMap { e, key, value } => {
                self.visit_exp(e);
                self.visit_exp(&key.body);
                self.visit_exp(&value.body);
            }
            ExpKind::MakeMap2 { e, value } => {
                self.visit_exp(e);
                self.visit_exp(&value.body);
            }
            ExpKind::MapGet { map, key } => {
                self.visit_exp(map);
                self.visit_exp(key);
            }
            ExpKind::VectorGet { e, index } => {
                self.visit_exp(e);
                self.visit_exp(index);
            }
            ExpKind::WithAlteredValue { handle, new_value } => {
                self.visit_exp(handle);
                self.visit_exp(new_value);
            }
            ExpKind::Stm { stm, e } => {
                self.visit_stm(stm);
                self.visit_exp(e);
            }
        }
    }

    fn walk_stm(&mut self, s: &Stm) {
        match s {
            Stm::NoOp | Stm::EscapeBlock(_) => {}
            Stm::Seq(s1, s2) => {
                self.visit_stm(s1);
                self.visit_stm(s2);
            }
            Stm::Call { target, args, .. } => {
                self.visit_exp(target);
                for a in args {
                    self.visit_exp(a);
                }
            }
            Stm::Assign { lhs, rhs } => {
                self.visit_exp(lhs);
                self.visit_exp(rhs);
            }
            Stm::Decl { val, .. } => self.visit_exp(val),
            Stm::ForEach { iter, body, .. } => {
                self.visit_exp(iter);
                self.visit_stm(body);
            }
            Stm::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.visit_exp(cond);
                self.visit_stm(then_branch);
                self.visit_stm(else_branch);
            }
            Stm::While { cond, body } => {
                self.visit_exp(cond);
                self.visit_stm(body);
            }
            Stm::EscapableBlock { body, .. } => self.visit_stm(body),
            Stm::MapPut { map, key, value } => {
                self.visit_exp(map);
                self.visit_exp(key);
                self.visit_exp(value);
            }
            Stm::MapDel { map, key } => {
                self.visit_exp(map);
                self.visit_exp(key);
            }
            Stm::MapUpdate { map, key, change, .. } => {
                self.visit_exp(map);
                self.visit_exp(key);
                self.visit_stm(change);
            }
        }
    }
}
