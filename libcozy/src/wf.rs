//! The state-var barrier well-formedness check.
//!
//! `EStateVar` marks the boundary between the runtime pool (recomputed on
//! every call, may read the op's/query's arguments) and the state pool
//! (computed once per abstract-state update and memoized as concrete
//! state, so it may never depend on a particular call's arguments).
//! SPEC_FULL.md §4.1/§9: a subexpression inside an `EStateVar` may only
//! reference the spec's declared state variables and names bound by
//! binders that are themselves inside the barrier. Grounded on the
//! invariant the original system enforces by construction when it builds
//! `concrete_state` entries in `cozy/synthesis/impls.py`.

use crate::common::OrderedSet;
use crate::fragments::Pool;
use crate::syntax::{Clause, Exp, ExpKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WfViolation {
    pub var: String,
}

impl std::fmt::Display for WfViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' crosses the state-var barrier: a state-pool expression may not reference a runtime-bound name",
            self.var
        )
    }
}

impl std::error::Error for WfViolation {}

/// Checks that every subexpression of `e` respects the state-var barrier.
/// `state_vars` is the spec's declared abstract state variable names.
pub fn exp_wf(e: &Exp, state_vars: &OrderedSet<String>) -> Result<(), WfViolation> {
    let mut bound_in_state = OrderedSet::new();
    walk(e, Pool::Runtime, state_vars, &mut bound_in_state)
}

fn walk(
    e: &Exp,
    pool: Pool,
    state_vars: &OrderedSet<String>,
    bound_in_state: &mut OrderedSet<String>,
) -> Result<(), WfViolation> {
    if pool == Pool::State {
        if let ExpKind::Var(id) = &e.kind {
            if !state_vars.contains(id) && !bound_in_state.contains(id) {
                return Err(WfViolation { var: id.clone() });
            }
        }
    }
    let child_pool = if matches!(e.kind, ExpKind::StateVar(_)) {
        Pool::State
    } else {
        pool
    };

    macro_rules! rec {
        ($child:expr) => {
            walk($child, child_pool, state_vars, bound_in_state)?
        };
    }
    macro_rules! rec_lambda {
        ($f:expr) => {{
            let added = child_pool == Pool::State && bound_in_state.insert($f.arg.id.clone());
            let r = walk(&$f.body, child_pool, state_vars, bound_in_state);
            if added {
                bound_in_state.shift_remove(&$f.arg.id);
            }
            r?
        }};
    }

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
            rec!(cond);
            rec!(then_branch);
            rec!(else_branch);
        }
        ExpKind::BinOp { e1, e2, .. } => {
            rec!(e1);
            rec!(e2);
        }
        ExpKind::UnaryOp { e, .. }
        | ExpKind::Singleton(e)
        | ExpKind::MapKeys(e)
        | ExpKind::StateVar(e)
        | ExpKind::EnumToInt(e)
        | ExpKind::BoolToInt(e)
        | ExpKind::Native(e)
        | ExpKind::GetField { e, .. }
        | ExpKind::TupleGet { e, .. } => rec!(e),
        ExpKind::ArgMin { e, f } | ExpKind::ArgMax { e, f } => {
            rec!(e);
            rec_lambda!(f);
        }
        ExpKind::Handle { addr, value } => {
            rec!(addr);
            rec!(value);
        }
        ExpKind::MakeRecord(fields) => {
            for (_, v) in fields {
                rec!(v);
            }
        }
        ExpKind::ListComprehension { clauses, body } => {
            let mut added = Vec::new();
            for c in clauses {
                match c {
                    Clause::Pull { id, e } => {
                        rec!(e);
                        if child_pool == Pool::State && bound_in_state.insert(id.clone()) {
                            added.push(id.clone());
                        }
                    }
                    Clause::Cond(e) => rec!(e),
                }
            }
            let r = walk(body, child_pool, state_vars, bound_in_state);
            for id in added {
                bound_in_state.shift_remove(&id);
            }
            r?
        }
        ExpKind::Call { args, .. } => {
            for a in args {
                rec!(a);
            }
        }
        ExpKind::Tuple(es) => {
            for e in es {
                rec!(e);
            }
        }
        ExpKind::Let { e, f } | ExpKind::Map { e, f } | ExpKind::FlatMap { e, f } => {
            rec!(e);
            rec_lambda!(f);
        }
        ExpKind::Filter { e, p } => {
            rec!(e);
            rec_lambda!(p);
        }
        ExpKind::MakeMap { e, key, value } => {
            rec!(e);
            rec_lambda!(key);
            rec_lambda!(value);
        }
        ExpKind::MakeMap2 { e, value } => {
            rec!(e);
            rec_lambda!(value);
        }
        ExpKind::MapGet { map, key } => {
            rec!(map);
            rec!(key);
        }
        ExpKind::VectorGet { e, index } => {
            rec!(e);
            rec!(index);
        }
        ExpKind::WithAlteredValue { handle, new_value } => {
            rec!(handle);
            rec!(new_value);
        }
        ExpKind::Stm { e, .. } => rec!(e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Type;

    fn var(id: &str, ty: Type) -> Exp {
        Exp::new(ExpKind::Var(id.to_string())).with_type(ty)
    }

    #[test]
    fn state_var_barrier_around_declared_state_var_is_fine() {
        let mut sv = OrderedSet::new();
        sv.insert("s".to_string());
        let e = Exp::new(ExpKind::StateVar(Box::new(var("s", Type::Int)))).with_type(Type::Int);
        assert!(exp_wf(&e, &sv).is_ok());
    }

    #[test]
    fn state_var_barrier_referencing_an_argument_is_rejected() {
        let sv = OrderedSet::new();
        let e = Exp::new(ExpKind::StateVar(Box::new(var("arg", Type::Int)))).with_type(Type::Int);
        assert!(exp_wf(&e, &sv).is_err());
    }

    #[test]
    fn runtime_pool_may_freely_reference_arguments() {
        let sv = OrderedSet::new();
        let e = var("arg", Type::Int);
        assert!(exp_wf(&e, &sv).is_ok());
    }
}
