//! Two optional, feature-flagged post-typecheck soundness checks.
//!
//! Grounded on `cozy/invariant_preservation.py`. Neither check mutates the
//! spec it inspects (aside from `add_implicit_handle_assumptions`, which
//! produces a new spec rather than mutating in place, matching the
//! immutable-Spec lifecycle SPEC_FULL.md §3 describes); both collect
//! diagnostics into a `Vec<String>` rather than aborting synthesis, which
//! is the same accumulate-don't-abort posture the type checker uses (§7).

use crate::common::{NameGen, OrderedSet};
use crate::fragments::{
    enumerate_fragments_in_stm_with_assumptions, enumerate_fragments_with_assumptions,
    FragmentContext,
};
use crate::handle_tools::implicit_handle_assumptions_for_method;
use crate::incrementalization::delta_form;
use crate::solver::Solver;
use crate::subst::subst;
use crate::syntax::constructors::{e_all, e_is_singleton, e_empty, e_not};
use crate::syntax::{BOp, Exp, ExpKind, Method, Op, Spec, UOp};

/// Prepends, to every method's assumptions, the implicit aliasing facts
/// `handle_tools::implicit_handle_assumptions_for_method` derives for it.
pub fn add_implicit_handle_assumptions(spec: &Spec, namegen: &NameGen) -> Spec {
    let mut out = spec.clone();
    for method in out.methods.iter_mut() {
        let implicit = implicit_handle_assumptions_for_method(spec, method, namegen);
        let assumptions = match method {
            Method::Op(o) => &mut o.assumptions,
            Method::Query(q) => &mut q.assumptions,
        };
        let mut merged = implicit;
        merged.extend(assumptions.drain(..));
        *assumptions = merged;
    }
    out
}

/// For every op, checks that every spec-level assumption still holds in
/// the post-state the op's `delta_form` describes. Returns one
/// human-readable diagnostic per failing `(op, assumption)` pair; never
/// aborts early.
pub fn check_ops_preserve_invariants(spec: &Spec, solver: &dyn Solver) -> Vec<String> {
    let statevar_names: OrderedSet<String> =
        spec.statevars.iter().map(|(n, _)| n.clone()).collect();
    let mut diagnostics = Vec::new();
    for op in spec.ops() {
        let delta = delta_form(&statevar_names, op);
        let premise = e_all(
            spec.assumptions
                .iter()
                .cloned()
                .chain(op.assumptions.iter().cloned()),
        );
        for assumption in &spec.assumptions {
            let shifted = subst(assumption, &delta);
            let implication = Exp::new(ExpKind::BinOp {
                op: BOp::Or,
                e1: Box::new(e_not(premise.clone())),
                e2: Box::new(shifted),
            })
            .with_type(crate::syntax::Type::Bool);
            match solver.valid(&implication) {
                Ok(true) => {}
                Ok(false) => diagnostics.push(format!(
                    "op '{}' may violate the assumption '{assumption}'",
                    op.name
                )),
                Err(e) => diagnostics.push(format!(
                    "op '{}': could not check assumption '{assumption}': {e}",
                    op.name
                )),
            }
        }
    }
    diagnostics
}

/// For every `the(xs)` fragment appearing anywhere in the spec, checks
/// that `xs` is provably a singleton or empty wherever it's evaluated,
/// under the assumptions provable AT THAT FRAGMENT's occurrence — not just
/// the method's own assumptions. A fragment reached only through the
/// `then` branch of a conditional may additionally assume that condition
/// (likewise the `else` branch its negation), and one reached through a
/// filter's predicate may assume the predicate itself; `the(xs)` is
/// routinely only a singleton because of exactly such a guard, so using
/// the whole-method assumptions alone flags many sound uses as violations.
pub fn check_the_wf(spec: &Spec, solver: &dyn Solver) -> Vec<String> {
    let mut diagnostics = Vec::new();
    for method in &spec.methods {
        let fragments: Vec<FragmentContext> = match method {
            Method::Op(o) => {
                let base: Vec<Exp> = spec
                    .assumptions
                    .iter()
                    .cloned()
                    .chain(o.assumptions.iter().cloned())
                    .collect();
                enumerate_fragments_in_stm_with_assumptions(&o.body, &base)
            }
            Method::Query(q) => {
                let base: Vec<Exp> = spec
                    .assumptions
                    .iter()
                    .cloned()
                    .chain(q.assumptions.iter().cloned())
                    .collect();
                enumerate_fragments_with_assumptions(&q.ret, &base)
            }
        };
        for fragment in fragments {
            if let ExpKind::UnaryOp { op: UOp::The, e: xs } = &fragment.exp.kind {
                let ok = Exp::new(ExpKind::BinOp {
                    op: BOp::Or,
                    e1: Box::new(e_is_singleton((**xs).clone())),
                    e2: Box::new(e_empty((**xs).clone())),
                })
                .with_type(crate::syntax::Type::Bool);
                let premise = e_all(fragment.assumptions.iter().cloned());
                let implication = Exp::new(ExpKind::BinOp {
                    op: BOp::Or,
                    e1: Box::new(e_not(premise)),
                    e2: Box::new(ok),
                })
                .with_type(crate::syntax::Type::Bool);
                match solver.valid(&implication) {
                    Ok(true) => {}
                    Ok(false) => diagnostics.push(format!(
                        "'{}' in method '{}' is not provably a singleton or empty",
                        fragment.exp,
                        method.name()
                    )),
                    Err(err) => diagnostics.push(format!(
                        "method '{}': could not check 'the' well-formedness: {err}",
                        method.name()
                    )),
                }
            }
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Z3Solver;
    use crate::syntax::{Query, Type, Visibility};

    fn trivial_spec() -> Spec {
        Spec {
            name: "t".to_string(),
            types: vec![],
            extern_funcs: vec![],
            statevars: vec![("x".to_string(), Type::Int)],
            assumptions: vec![Exp::new(ExpKind::BinOp {
                op: BOp::Ge,
                e1: Box::new(Exp::new(ExpKind::Var("x".to_string())).with_type(Type::Int)),
                e2: Box::new(Exp::new(ExpKind::Num(0)).with_type(Type::Int)),
            })
            .with_type(Type::Bool)],
            methods: vec![Method::Op(Op {
                name: "bump".to_string(),
                args: vec![],
                assumptions: vec![],
                body: crate::syntax::Stm::Assign {
                    lhs: Box::new(Exp::new(ExpKind::Var("x".to_string())).with_type(Type::Int)),
                    rhs: Box::new(Exp::new(ExpKind::BinOp {
                        op: BOp::Plus,
                        e1: Box::new(Exp::new(ExpKind::Var("x".to_string())).with_type(Type::Int)),
                        e2: Box::new(Exp::new(ExpKind::Num(1)).with_type(Type::Int)),
                    })
                    .with_type(Type::Int)),
                },
                docstring: String::new(),
            })],
            header: String::new(),
            footer: String::new(),
            docstring: String::new(),
        }
    }

    #[test]
    fn flags_an_op_that_can_violate_a_nonnegativity_assumption() {
        let spec = trivial_spec();
        let solver = Z3Solver::new();
        let diagnostics = check_ops_preserve_invariants(&spec, &solver);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn the_is_not_flagged_when_only_its_branch_guard_proves_it_singleton() {
        let xs = Exp::new(ExpKind::Var("xs".to_string())).with_type(Type::Bag(Box::new(Type::Int)));
        let cond = e_is_singleton(xs.clone());
        let the_xs = Exp::new(ExpKind::UnaryOp {
            op: UOp::The,
            e: Box::new(xs),
        })
        .with_type(Type::Int);
        let ret = Exp::new(ExpKind::Cond {
            cond: Box::new(cond),
            then_branch: Box::new(the_xs),
            else_branch: Box::new(Exp::new(ExpKind::Num(0)).with_type(Type::Int)),
        })
        .with_type(Type::Int);
        let mut spec = trivial_spec();
        spec.methods.push(Method::Query(Query {
            name: "first_or_zero".to_string(),
            visibility: Visibility::Public,
            args: vec![("xs".to_string(), Type::Bag(Box::new(Type::Int)))],
            assumptions: vec![],
            ret,
            docstring: String::new(),
        }));
        let solver = Z3Solver::new();
        let diagnostics = check_the_wf(&spec, &solver);
        assert!(
            diagnostics.is_empty(),
            "unexpected diagnostics: {diagnostics:?}"
        );
    }

    #[test]
    fn add_implicit_handle_assumptions_is_a_no_op_without_handles() {
        let mut spec = trivial_spec();
        spec.methods.push(Method::Query(Query {
            name: "get".to_string(),
            visibility: Visibility::Public,
            args: vec![],
            assumptions: vec![],
            ret: Exp::new(ExpKind::Var("x".to_string())).with_type(Type::Int),
            docstring: String::new(),
        }));
        let namegen = NameGen::new("_ip");
        let out = add_implicit_handle_assumptions(&spec, &namegen);
        for m in &out.methods {
            let assumptions = match m {
                Method::Op(o) => &o.assumptions,
                Method::Query(q) => &q.assumptions,
            };
            assert!(assumptions.is_empty());
        }
    }
}
