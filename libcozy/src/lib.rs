//! The cozy data-structure synthesizer, without IO/main.
//!
//! Grounded on the teacher's own top-level shape (`libjankscripten::lib`
//! re-exports every pipeline stage as a module and offers one
//! `javascript_to_wasm`-style pipeline function); `synthesize` plays that
//! role here, running every stage SPEC_FULL.md §4 lists end to end.

pub mod alpha_equiv;
pub mod common;
pub mod config;
pub mod cost_model;
pub mod cse;
pub mod enumerator;
pub mod errors;
pub mod fragments;
pub mod free_vars;
pub mod handle_tools;
pub mod implementation;
pub mod incrementalization;
pub mod invariant_preservation;
pub mod pretty;
pub mod simplify;
pub mod solver;
pub mod subst;
pub mod syntax;
pub mod synthesis;
pub mod typecheck;
pub mod wf;

use std::time::Duration;

use crate::common::{NameGen, OrderedSet};
use crate::config::Config;
use crate::errors::CozyError;
use crate::implementation::construct_initial_implementation;
use crate::invariant_preservation::{
    add_implicit_handle_assumptions, check_ops_preserve_invariants, check_the_wf,
};
use crate::solver::{Solver, Z3Solver};
use crate::syntax::{Method, Spec};
use crate::synthesis::improve_implementation;
use crate::typecheck::typecheck;
use crate::wf::exp_wf;

/// Runs the full pipeline described in SPEC_FULL.md §4's control-flow
/// summary: type-check, add implicit handle assumptions, optionally run
/// the invariant-preservation and state-var-barrier checks, build the
/// initial implementation, then spend up to `timeout` improving every
/// public query before emitting the final concrete spec.
///
/// Type errors are fatal (`CozyError::TypeErrors`), and so is a state-var
/// barrier violation (`CozyError::IllegalStateVarBoundary`) when
/// `config.enforce_well_formed_state_var_boundaries` is set — both are
/// soundness gates on the IR itself. A failing invariant-preservation
/// check is not fatal — it is logged as a warning and synthesis proceeds,
/// matching §7's "local fallback where safe, else surfaced" recovery
/// policy (there is nothing unsafe about continuing: that check is
/// advisory, not a soundness gate).
pub fn synthesize(spec: Spec, config: &Config, timeout: Duration) -> Result<Spec, CozyError> {
    let (spec, errors) = typecheck(&spec);
    if !errors.is_empty() {
        return Err(CozyError::TypeErrors(errors));
    }

    let namegen = NameGen::new("_cozy");
    let solver = Z3Solver::new();

    let spec = add_implicit_handle_assumptions(&spec, &namegen);

    if config.enforce_well_formed_state_var_boundaries {
        let statevars: OrderedSet<String> =
            spec.statevars.iter().map(|(n, _)| n.clone()).collect();
        for method in &spec.methods {
            match method {
                Method::Op(o) => {
                    for e in crate::fragments::enumerate_fragments_in_stm(&o.body) {
                        exp_wf(&e, &statevars)?;
                    }
                }
                Method::Query(q) => exp_wf(&q.ret, &statevars)?,
            }
        }
    }

    if config.invariant_preservation_check {
        for diagnostic in check_ops_preserve_invariants(&spec, &solver) {
            log::warn!("{diagnostic}");
        }
        for diagnostic in check_the_wf(&spec, &solver) {
            log::warn!("{diagnostic}");
        }
    }

    let mut implementation = construct_initial_implementation(&spec, &namegen);
    for q in spec.queries() {
        implementation.add_query(q.clone(), &namegen, Some(&solver))?;
    }
    implementation.cleanup();

    let implementation =
        improve_implementation(implementation, &namegen, Some(&solver), config, timeout)?;

    Ok(implementation.code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{BOp, Exp, ExpKind, Method, Op, Query, Stm, Type, Visibility};

    fn counter_spec() -> Spec {
        Spec {
            name: "counter".to_string(),
            types: vec![],
            extern_funcs: vec![],
            statevars: vec![("total".to_string(), Type::Int)],
            assumptions: vec![],
            methods: vec![
                Method::Op(Op {
                    name: "bump".to_string(),
                    args: vec![("by".to_string(), Type::Int)],
                    assumptions: vec![],
                    body: Stm::Assign {
                        lhs: Box::new(
                            Exp::new(ExpKind::Var("total".to_string())).with_type(Type::Int),
                        ),
                        rhs: Box::new(
                            Exp::new(ExpKind::BinOp {
                                op: BOp::Plus,
                                e1: Box::new(
                                    Exp::new(ExpKind::Var("total".to_string()))
                                        .with_type(Type::Int),
                                ),
                                e2: Box::new(
                                    Exp::new(ExpKind::Var("by".to_string())).with_type(Type::Int),
                                ),
                            })
                            .with_type(Type::Int),
                        ),
                    },
                    docstring: String::new(),
                }),
                Method::Query(Query {
                    name: "get_total".to_string(),
                    visibility: Visibility::Public,
                    args: vec![],
                    assumptions: vec![],
                    ret: Exp::new(ExpKind::Var("total".to_string())).with_type(Type::Int),
                    docstring: String::new(),
                }),
            ],
            header: String::new(),
            footer: String::new(),
            docstring: String::new(),
        }
    }

    #[test]
    fn synthesizes_a_concrete_spec_for_a_well_typed_input() {
        let config = Config::default();
        let out = synthesize(counter_spec(), &config, Duration::from_millis(200)).unwrap();
        assert_eq!(out.statevars.len(), 1);
        assert_eq!(out.queries().count(), 1);
    }

    #[test]
    fn rejects_an_ill_typed_spec() {
        let mut spec = counter_spec();
        if let Method::Op(op) = &mut spec.methods[0] {
            op.body = Stm::Assign {
                lhs: Box::new(
                    Exp::new(ExpKind::Var("total".to_string())).with_type(Type::Int),
                ),
                rhs: Box::new(Exp::new(ExpKind::Bool(true)).with_type(Type::Bool)),
            };
        }
        let config = Config::default();
        let err = synthesize(spec, &config, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, CozyError::TypeErrors(_)));
    }
}
