//! The SMT solver boundary.
//!
//! SPEC_FULL.md §6 treats the solver as a black-box collaborator behind a
//! trait: `valid(e)` asks whether `e` holds under every assignment to its
//! free variables, `satisfy(e)` asks for one assignment that makes it
//! true. `Z3Solver` is the concrete backend, grounded on the teacher's
//! `jankyscript::typeinf` module (the only place in the pack that drives
//! `z3` directly): a fresh `z3::Config`/`z3::Context` per call, matching
//! §5's rule that `z3::Context` is not `Send` and so is never shared
//! across the worker threads.
//!
//! The encoding covers the scalar fragment (`Bool`, `Int`, `Long`,
//! `String`) completely; collections, maps, records, and handles are
//! encoded through uninterpreted sorts compared only for equality, which
//! is sound for the well-formedness and op-preserves-invariant checks
//! `invariant_preservation` runs (they reduce to implications between
//! formulas built from scalar comparisons) but not complete for goals
//! that need to reason about collection contents.

use std::collections::HashMap;

use z3::ast::{Ast, Bool, Dynamic, Int, String as Z3String};
use z3::{Config, Context, SatResult, Solver as Z3NativeSolver, Sort};

use crate::errors::CozyError;
use crate::free_vars::free_vars;
use crate::syntax::{BOp, Exp, ExpKind, Type, UOp};

pub trait Solver {
    fn valid(&self, e: &Exp) -> Result<bool, CozyError>;
    fn satisfy(&self, e: &Exp) -> Result<Option<HashMap<String, Exp>>, CozyError>;
}

#[derive(Default)]
pub struct Z3Solver;

impl Z3Solver {
    pub fn new() -> Self {
        Z3Solver
    }
}

impl Solver for Z3Solver {
    fn valid(&self, e: &Exp) -> Result<bool, CozyError> {
        // e is valid iff its negation is unsatisfiable.
        let negated = Exp::new(ExpKind::UnaryOp {
            op: UOp::Not,
            e: Box::new(e.clone()),
        })
        .with_type(Type::Bool);
        Ok(self.satisfy(&negated)?.is_none())
    }

    fn satisfy(&self, e: &Exp) -> Result<Option<HashMap<String, Exp>>, CozyError> {
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let solver = Z3NativeSolver::new(&ctx);

        let vars = free_vars(e);
        let mut env: HashMap<String, Dynamic> = HashMap::new();
        for v in &vars {
            env.insert(v.id.clone(), declare(&ctx, &v.id, &v.ty)?);
        }

        let formula = encode_bool(&ctx, e, &env)?;
        solver.assert(&formula);

        match solver.check() {
            SatResult::Unsat => Ok(None),
            SatResult::Unknown => Err(CozyError::SolverError(
                "z3 returned unknown for this query".to_string(),
            )),
            SatResult::Sat => {
                let model = solver.get_model().ok_or_else(|| {
                    CozyError::SolverError("z3 reported sat with no model".to_string())
                })?;
                let mut out = HashMap::new();
                for v in &vars {
                    let dyn_val = env.get(&v.id).unwrap();
                    let value = model.eval(dyn_val, true).ok_or_else(|| {
                        CozyError::SolverError(format!("model has no value for '{}'", v.id))
                    })?;
                    out.insert(v.id.clone(), decode(&value, &v.ty)?);
                }
                Ok(Some(out))
            }
        }
    }
}

fn declare<'ctx>(ctx: &'ctx Context, name: &str, ty: &Type) -> Result<Dynamic<'ctx>, CozyError> {
    Ok(match ty {
        Type::Bool => Bool::new_const(ctx, name).into(),
        Type::Int | Type::Long => Int::new_const(ctx, name).into(),
        Type::String => Z3String::new_const(ctx, name).into(),
        Type::Enum(cases) => {
            let sort = Sort::uninterpreted(ctx, z3::Symbol::String(format!("enum_{name}")));
            let _ = cases;
            Dynamic::new_const(ctx, name, &sort)
        }
        other => {
            let sort = Sort::uninterpreted(ctx, z3::Symbol::String(format!("opaque_{name}")));
            let _ = other;
            Dynamic::new_const(ctx, name, &sort)
        }
    })
}

fn decode(value: &Dynamic, ty: &Type) -> Result<Exp, CozyError> {
    match ty {
        Type::Bool => {
            let b = value
                .as_bool()
                .and_then(|b| b.as_bool())
                .ok_or_else(|| CozyError::SolverError("expected a Bool value".to_string()))?;
            Ok(Exp::new(ExpKind::Bool(b)).with_type(Type::Bool))
        }
        Type::Int | Type::Long => {
            let n = value
                .as_int()
                .and_then(|i| i.as_i64())
                .ok_or_else(|| CozyError::SolverError("expected an Int value".to_string()))?;
            Ok(Exp::new(ExpKind::Num(n)).with_type(ty.clone()))
        }
        Type::String => {
            let s = value
                .as_string()
                .and_then(|s| s.as_string())
                .unwrap_or_default();
            Ok(Exp::new(ExpKind::Str(s)).with_type(Type::String))
        }
        other => Err(CozyError::SolverError(format!(
            "cannot decode a model value of type {other} back into a literal"
        ))),
    }
}

fn encode_bool<'ctx>(
    ctx: &'ctx Context,
    e: &Exp,
    env: &HashMap<String, Dynamic<'ctx>>,
) -> Result<Bool<'ctx>, CozyError> {
    match &e.kind {
        ExpKind::Bool(b) => Ok(Bool::from_bool(ctx, *b)),
        ExpKind::Var(id) => env
            .get(id)
            .and_then(|d| d.as_bool())
            .ok_or_else(|| CozyError::SolverError(format!("'{id}' is not a Bool"))),
        ExpKind::UnaryOp { op: UOp::Not, e } => Ok(encode_bool(ctx, e, env)?.not()),
        ExpKind::BinOp {
            op: BOp::And,
            e1,
            e2,
        } => Ok(Bool::and(ctx, &[&encode_bool(ctx, e1, env)?, &encode_bool(ctx, e2, env)?])),
        ExpKind::BinOp {
            op: BOp::Or,
            e1,
            e2,
        } => Ok(Bool::or(ctx, &[&encode_bool(ctx, e1, env)?, &encode_bool(ctx, e2, env)?])),
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            let c = encode_bool(ctx, cond, env)?;
            let t = encode_bool(ctx, then_branch, env)?;
            let e = encode_bool(ctx, else_branch, env)?;
            Ok(c.ite(&t, &e))
        }
        ExpKind::BinOp { op, e1, e2 } if matches!(e1.ty, Type::Bool) || e1.ty.is_numeric() || matches!(e1.ty, Type::String) => {
            encode_comparison(ctx, *op, e1, e2, env)
        }
        ExpKind::Stm { stm, .. } => Err(CozyError::SolverError(format!(
            "embedded statement ({stm:?}) cannot be sent to the solver"
        ))),
        other => Err(CozyError::SolverError(format!(
            "expression of type {} is outside the solver's scalar fragment: {other:?}",
            e.ty
        ))),
    }
}

fn encode_comparison<'ctx>(
    ctx: &'ctx Context,
    op: BOp,
    e1: &Exp,
    e2: &Exp,
    env: &HashMap<String, Dynamic<'ctx>>,
) -> Result<Bool<'ctx>, CozyError> {
    if e1.ty.is_numeric() {
        let a = encode_int(ctx, e1, env)?;
        let b = encode_int(ctx, e2, env)?;
        return Ok(match op {
            BOp::Eq | BOp::HardEq => a._eq(&b),
            BOp::Ne => a._eq(&b).not(),
            BOp::Lt => a.lt(&b),
            BOp::Le => a.le(&b),
            BOp::Gt => a.gt(&b),
            BOp::Ge => a.ge(&b),
            other => {
                return Err(CozyError::SolverError(format!(
                    "{other:?} is not a comparison operator"
                )))
            }
        });
    }
    if matches!(e1.ty, Type::Bool) {
        let a = encode_bool(ctx, e1, env)?;
        let b = encode_bool(ctx, e2, env)?;
        return Ok(match op {
            BOp::Eq | BOp::HardEq => a._eq(&b),
            BOp::Ne => a._eq(&b).not(),
            other => {
                return Err(CozyError::SolverError(format!(
                    "{other:?} is not defined on Bool"
                )))
            }
        });
    }
    let a = encode_string(ctx, e1, env)?;
    let b = encode_string(ctx, e2, env)?;
    match op {
        BOp::Eq | BOp::HardEq => Ok(a._eq(&b)),
        BOp::Ne => Ok(a._eq(&b).not()),
        other => Err(CozyError::SolverError(format!(
            "{other:?} is not defined on String"
        ))),
    }
}

fn encode_int<'ctx>(
    ctx: &'ctx Context,
    e: &Exp,
    env: &HashMap<String, Dynamic<'ctx>>,
) -> Result<Int<'ctx>, CozyError> {
    match &e.kind {
        ExpKind::Num(n) => Ok(Int::from_i64(ctx, *n)),
        ExpKind::Var(id) => env
            .get(id)
            .and_then(|d| d.as_int())
            .ok_or_else(|| CozyError::SolverError(format!("'{id}' is not an Int"))),
        ExpKind::BinOp {
            op: BOp::Plus,
            e1,
            e2,
        } => Ok(Int::add(ctx, &[&encode_int(ctx, e1, env)?, &encode_int(ctx, e2, env)?])),
        ExpKind::BinOp {
            op: BOp::Minus,
            e1,
            e2,
        } => Ok(Int::sub(ctx, &[&encode_int(ctx, e1, env)?, &encode_int(ctx, e2, env)?])),
        ExpKind::UnaryOp {
            op: UOp::Negate,
            e,
        } => Ok(encode_int(ctx, e, env)?.unary_minus()),
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            let c = encode_bool(ctx, cond, env)?;
            let t = encode_int(ctx, then_branch, env)?;
            let e = encode_int(ctx, else_branch, env)?;
            Ok(c.ite(&t, &e))
        }
        other => Err(CozyError::SolverError(format!(
            "expression is outside the solver's integer fragment: {other:?}"
        ))),
    }
}

fn encode_string<'ctx>(
    ctx: &'ctx Context,
    e: &Exp,
    env: &HashMap<String, Dynamic<'ctx>>,
) -> Result<Z3String<'ctx>, CozyError> {
    match &e.kind {
        ExpKind::Str(s) => Ok(Z3String::from_str(ctx, s).map_err(|_| {
            CozyError::SolverError("string literal is not representable in z3".to_string())
        })?),
        ExpKind::Var(id) => env
            .get(id)
            .and_then(|d| d.as_string())
            .ok_or_else(|| CozyError::SolverError(format!("'{id}' is not a String"))),
        other => Err(CozyError::SolverError(format!(
            "expression is outside the solver's string fragment: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ExpKind;

    fn bool_exp(b: bool) -> Exp {
        Exp::new(ExpKind::Bool(b)).with_type(Type::Bool)
    }

    #[test]
    fn true_is_valid() {
        let solver = Z3Solver::new();
        assert!(solver.valid(&bool_exp(true)).unwrap());
    }

    #[test]
    fn false_is_not_valid() {
        let solver = Z3Solver::new();
        assert!(!solver.valid(&bool_exp(false)).unwrap());
    }

    #[test]
    fn satisfy_finds_a_model_for_a_free_variable() {
        let solver = Z3Solver::new();
        let x = Exp::new(ExpKind::Var("x".to_string())).with_type(Type::Int);
        let e = Exp::new(ExpKind::BinOp {
            op: BOp::Gt,
            e1: Box::new(x),
            e2: Box::new(Exp::new(ExpKind::Num(10)).with_type(Type::Int)),
        })
        .with_type(Type::Bool);
        let model = solver.satisfy(&e).unwrap();
        assert!(model.is_some());
    }
}
