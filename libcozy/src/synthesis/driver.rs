//! The synthesis driver: launches one improvement job per public query,
//! applies accepted improvements, and returns the resulting implementation.
//!
//! Grounded on `cozy/synthesis/high_level_interface.py`'s
//! `improve_implementation`: one OS thread per query (`reconcile_jobs`),
//! an `mpsc`-style result queue polled in ≤500ms slices
//! (`solutions_q.drain(block=True, timeout=0.5)`), results grouped by
//! query name favoring the latest, reordered to match `query_specs`
//! before being applied, and a cooperative stop flag
//! (`self.stop_requested` there, `Arc<AtomicBool>` here) raised once the
//! deadline passes. The main thread is the sole mutator of `impl`,
//! matching SPEC_FULL.md §5's concurrency model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::common::NameGen;
use crate::config::Config;
use crate::cost_model::TrivialCostModel;
use crate::enumerator::ReferenceEnumerator;
use crate::errors::CozyError;
use crate::implementation::Implementation;
use crate::solver::Solver;
use crate::syntax::{Exp, Type};

use super::jobs::{ImproveQueryJob, QuerySolution};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs every public query's improvement job for up to `timeout`, applying
/// each accepted improvement through `Implementation::add_query` and
/// cleaning up afterward, then returns the (possibly unchanged)
/// implementation. With only `ReferenceEnumerator`/`TrivialCostModel`
/// wired in, no job ever proposes a strictly cheaper candidate than the
/// query's own body — this exercises the full thread/channel/apply path
/// without claiming to improve anything, matching SPEC_FULL.md §6's "trait
/// boundary plus a minimal reference implementation" posture.
///
/// Propagates `CozyError::CaptureError` rather than swallowing it: per
/// SPEC_FULL.md §7 it's the one substitution failure that must fail
/// loudly, so an improvement that would trigger it aborts the whole
/// improvement pass instead of being silently dropped.
pub fn improve_implementation(
    mut implementation: Implementation,
    namegen: &NameGen,
    solver: Option<&dyn Solver>,
    config: &Config,
    timeout: Duration,
) -> Result<Implementation, CozyError> {
    let deadline = Instant::now() + timeout;
    let stop_requested = Arc::new(AtomicBool::new(false));
    let (tx, rx) = mpsc::channel::<QuerySolution>();

    let hints: Vec<Exp> = implementation
        .concretization_functions()
        .into_iter()
        .map(|(_, projection)| projection)
        .collect();
    let state_vars: Vec<(String, Type)> = implementation.spec.statevars.clone();

    let mut handles = Vec::new();
    for q in implementation.query_specs.clone() {
        let assumptions: Vec<Exp> = implementation
            .spec
            .assumptions
            .iter()
            .cloned()
            .chain(q.assumptions.iter().cloned())
            .collect();
        let job = ImproveQueryJob {
            query: q,
            state_vars: state_vars.clone(),
            assumptions,
            hints: hints.clone(),
            binders: Vec::new(),
            enumerator: ReferenceEnumerator::default(),
            cost_model: TrivialCostModel,
            log_dir: Some(config.log_dir.clone().into()),
            stop_requested: Arc::clone(&stop_requested),
        };
        let tx = tx.clone();
        handles.push(thread::spawn(move || job.run(tx)));
    }
    drop(tx);

    loop {
        if Instant::now() >= deadline {
            stop_requested.store(true, Ordering::SeqCst);
            break;
        }
        if handles.iter().all(|h| h.is_finished()) {
            break;
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(first) => {
                let mut latest: HashMap<String, QuerySolution> = HashMap::new();
                latest.insert(first.query_name.clone(), first);
                while let Ok(more) = rx.try_recv() {
                    latest.insert(more.query_name.clone(), more);
                }
                if let Err(e) = apply_solutions(&mut implementation, latest, namegen, solver) {
                    stop_requested.store(true, Ordering::SeqCst);
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(e);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    stop_requested.store(true, Ordering::SeqCst);
    for h in handles {
        let _ = h.join();
    }
    Ok(implementation)
}

/// Applies accepted improvements in canonical `query_specs` order (so
/// re-running with the same results is deterministic regardless of which
/// job finished first), then cleans up variables and sub-queries the
/// replaced bodies no longer reference.
fn apply_solutions(
    implementation: &mut Implementation,
    mut latest: HashMap<String, QuerySolution>,
    namegen: &NameGen,
    solver: Option<&dyn Solver>,
) -> Result<(), CozyError> {
    let order: Vec<String> = implementation
        .query_specs
        .iter()
        .map(|q| q.name.clone())
        .collect();
    for name in order {
        let Some(solution) = latest.remove(&name) else {
            continue;
        };
        let Some(spec) = implementation
            .query_specs
            .iter()
            .find(|q| q.name == name)
            .cloned()
        else {
            continue;
        };
        let mut updated = spec;
        updated.ret = solution.ret;
        implementation.query_specs.retain(|q| q.name != name);
        implementation.add_query(updated, namegen, solver)?;
        implementation.cleanup();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::construct_initial_implementation;
    use crate::syntax::{BOp, ExpKind, Method, Op, Query, Spec, Stm, Visibility};

    fn simple_spec() -> Spec {
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
    fn runs_to_completion_within_its_timeout_and_changes_nothing() {
        let namegen = NameGen::new("_t");
        let spec = simple_spec();
        let mut implementation = construct_initial_implementation(&spec, &namegen);
        implementation
            .add_query(spec.queries().next().unwrap().clone(), &namegen, None)
            .unwrap();
        let before = implementation.code();
        let config = Config::default();
        let after = improve_implementation(
            implementation,
            &namegen,
            None,
            &config,
            Duration::from_millis(200),
        )
        .unwrap();
        assert_eq!(before, after.code());
    }
}
