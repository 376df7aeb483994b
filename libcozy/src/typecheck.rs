//! The type checker.
//!
//! Grounded on `cozy/typecheck.py`'s `Typechecker`: a single pass that
//! walks every op/query body, stamps each `Exp`'s `.type`, and
//! accumulates every mistake it finds rather than stopping at the first
//! (SPEC_FULL.md §7 — a spec author wants every error in one run, the way
//! `rustc` itself batches diagnostics). `ELambda` is explicitly exempt
//! from carrying a `.type`; its body's type stands in for it, matching
//! `Lambda`'s shape in `syntax::expr`.
//!
//! The comparison-operator rule mirrors the literal original: `ensure_type`
//! permits numeric operands (`Int`/`Long`) to compare against each other
//! freely, but any other pair of operand types must match exactly
//! (SPEC_FULL.md §9, resolving the spec's first Open Question).

use std::collections::HashMap;
use std::fmt;

use crate::syntax::{
    BOp, Clause, Exp, ExpKind, ExternFunc, Lambda, Method, Op, Query, Spec, Stm, Type, UOp, Var,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError {
    pub method: String,
    pub message: String,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.method, self.message)
    }
}

struct Ctx<'a> {
    spec: &'a Spec,
    type_aliases: HashMap<String, Type>,
    extern_funcs: HashMap<String, &'a ExternFunc>,
    query_sigs: HashMap<String, (Vec<Type>, Type)>,
    statevars: HashMap<String, Type>,
    method: String,
    errors: Vec<TypeError>,
}

impl<'a> Ctx<'a> {
    fn err(&mut self, message: impl Into<String>) {
        self.errors.push(TypeError {
            method: self.method.clone(),
            message: message.into(),
        });
    }

    fn resolve(&self, ty: &Type) -> Type {
        match ty {
            Type::Named(name) => self
                .type_aliases
                .get(name)
                .cloned()
                .unwrap_or_else(|| ty.clone()),
            _ => ty.clone(),
        }
    }
}

/// Typechecks every op/query in `spec`, returning a copy with every
/// expression's `.type` filled in and the list of errors found. A
/// non-empty error list means the returned spec's types should not be
/// trusted for synthesis; callers surface the errors instead.
pub fn typecheck(spec: &Spec) -> (Spec, Vec<TypeError>) {
    let type_aliases: HashMap<String, Type> = spec.types.iter().cloned().collect();
    let extern_funcs: HashMap<String, &ExternFunc> = spec
        .extern_funcs
        .iter()
        .map(|f| (f.name.clone(), f))
        .collect();
    let query_sigs: HashMap<String, (Vec<Type>, Type)> = spec
        .queries()
        .map(|q| {
            (
                q.name.clone(),
                (
                    q.args.iter().map(|(_, t)| t.clone()).collect(),
                    q.ret.ty().clone(),
                ),
            )
        })
        .collect();
    let statevars: HashMap<String, Type> = spec.statevars.iter().cloned().collect();

    let mut ctx = Ctx {
        spec,
        type_aliases,
        extern_funcs,
        query_sigs,
        statevars,
        method: String::new(),
        errors: Vec::new(),
    };

    let mut new_methods = Vec::with_capacity(spec.methods.len());
    for m in &spec.methods {
        ctx.method = m.name().to_string();
        let mut env: HashMap<String, Type> = ctx.statevars.clone();
        match m {
            Method::Op(op) => {
                for (n, t) in &op.args {
                    env.insert(n.clone(), ctx.resolve(t));
                }
                let assumptions = op
                    .assumptions
                    .iter()
                    .map(|a| {
                        let a = infer(a.clone(), &env, &mut ctx);
                        require_bool(&a, &mut ctx);
                        a
                    })
                    .collect();
                let body = check_stm(op.body.clone(), &env, &mut ctx);
                new_methods.push(Method::Op(Op {
                    name: op.name.clone(),
                    args: op.args.clone(),
                    assumptions,
                    body,
                    docstring: op.docstring.clone(),
                }));
            }
            Method::Query(q) => {
                for (n, t) in &q.args {
                    env.insert(n.clone(), ctx.resolve(t));
                }
                let assumptions = q
                    .assumptions
                    .iter()
                    .map(|a| {
                        let a = infer(a.clone(), &env, &mut ctx);
                        require_bool(&a, &mut ctx);
                        a
                    })
                    .collect();
                let ret = infer(q.ret.clone(), &env, &mut ctx);
                new_methods.push(Method::Query(Query {
                    name: q.name.clone(),
                    visibility: q.visibility,
                    args: q.args.clone(),
                    assumptions,
                    ret,
                    docstring: q.docstring.clone(),
                }));
            }
        }
    }

    ctx.method = "<spec>".to_string();
    let top_assumptions = spec
        .assumptions
        .iter()
        .map(|a| {
            let env = ctx.statevars.clone();
            let a = infer(a.clone(), &env, &mut ctx);
            require_bool(&a, &mut ctx);
            a
        })
        .collect();

    let errors = ctx.errors;
    let new_spec = Spec {
        name: spec.name.clone(),
        types: spec.types.clone(),
        extern_funcs: spec.extern_funcs.clone(),
        statevars: spec.statevars.clone(),
        assumptions: top_assumptions,
        methods: new_methods,
        header: spec.header.clone(),
        footer: spec.footer.clone(),
        docstring: spec.docstring.clone(),
    };
    (new_spec, errors)
}

fn require_bool(e: &Exp, ctx: &mut Ctx) {
    if ctx.resolve(e.ty()) != Type::Bool {
        ctx.err(format!("expected Bool, got {}", e.ty()));
    }
}

/// Comparisons permit any pair of numeric types; every other operator
/// pairing requires an exact type match.
fn check_comparable(t1: &Type, t2: &Type, ctx: &mut Ctx) {
    if t1.is_numeric() && t2.is_numeric() {
        return;
    }
    if !t1.equivalent(t2) {
        ctx.err(format!("cannot compare {t1} with {t2}"));
    }
}

fn infer_lambda(f: Lambda, arg_ty: Type, env: &HashMap<String, Type>, ctx: &mut Ctx) -> Lambda {
    let mut inner = env.clone();
    inner.insert(f.arg.id.clone(), ctx.resolve(&arg_ty));
    let body = infer(*f.body, &inner, ctx);
    Lambda::new(Var::new(f.arg.id, ctx.resolve(&arg_ty)), body)
}

fn infer(e: Exp, env: &HashMap<String, Type>, ctx: &mut Ctx) -> Exp {
    match e.kind {
        ExpKind::Var(id) => {
            let ty = env.get(&id).cloned().unwrap_or_else(|| {
                ctx.err(format!("undeclared variable '{id}'"));
                Type::Default
            });
            Exp::new(ExpKind::Var(id)).with_type(ty)
        }
        ExpKind::Bool(b) => Exp::new(ExpKind::Bool(b)).with_type(Type::Bool),
        ExpKind::Num(n) => Exp::new(ExpKind::Num(n)).with_type(Type::Int),
        ExpKind::Str(s) => Exp::new(ExpKind::Str(s)).with_type(Type::String),
        ExpKind::Null => Exp::new(ExpKind::Null).with_type(Type::Default),
        ExpKind::EnumEntry(name) => {
            let ty = ctx
                .spec
                .types
                .iter()
                .find_map(|(_, t)| match t {
                    Type::Enum(cases) if cases.contains(&name) => Some(t.clone()),
                    _ => None,
                })
                .unwrap_or_else(|| {
                    ctx.err(format!("'{name}' is not a member of any declared enum"));
                    Type::Default
                });
            Exp::new(ExpKind::EnumEntry(name)).with_type(ty)
        }
        ExpKind::EmptyList => {
            Exp::new(ExpKind::EmptyList).with_type(Type::Bag(Box::new(Type::Default)))
        }
        ExpKind::Cond {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = infer(*cond, env, ctx);
            require_bool(&cond, ctx);
            let then_branch = infer(*then_branch, env, ctx);
            let else_branch = infer(*else_branch, env, ctx);
            if !ctx
                .resolve(then_branch.ty())
                .equivalent(&ctx.resolve(else_branch.ty()))
            {
                ctx.err(format!(
                    "branches of conditional disagree: {} vs {}",
                    then_branch.ty(),
                    else_branch.ty()
                ));
            }
            let ty = then_branch.ty().clone();
            Exp::new(ExpKind::Cond {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            })
            .with_type(ty)
        }
        ExpKind::BinOp { op, e1, e2 } => {
            let e1 = infer(*e1, env, ctx);
            let e2 = infer(*e2, env, ctx);
            let ty = match op {
                BOp::And | BOp::Or => {
                    require_bool(&e1, ctx);
                    require_bool(&e2, ctx);
                    Type::Bool
                }
                BOp::Eq | BOp::HardEq | BOp::Ne | BOp::Lt | BOp::Le | BOp::Gt | BOp::Ge => {
                    check_comparable(&ctx.resolve(e1.ty()), &ctx.resolve(e2.ty()), ctx);
                    Type::Bool
                }
                BOp::In => {
                    match ctx.resolve(e2.ty()).element_type() {
                        Some(elem) if elem.equivalent(&ctx.resolve(e1.ty())) => {}
                        Some(elem) => ctx.err(format!(
                            "cannot test membership of {} in a collection of {elem}",
                            e1.ty()
                        )),
                        None => ctx.err(format!("{} is not a collection", e2.ty())),
                    }
                    Type::Bool
                }
                BOp::Plus | BOp::Minus => {
                    if !ctx.resolve(e1.ty()).is_numeric() || !ctx.resolve(e2.ty()).is_numeric() {
                        ctx.err(format!(
                            "arithmetic requires numeric operands, got {} and {}",
                            e1.ty(),
                            e2.ty()
                        ));
                        Type::Int
                    } else {
                        ctx.resolve(e1.ty()).numeric_lub(&ctx.resolve(e2.ty()))
                    }
                }
            };
            Exp::new(ExpKind::BinOp {
                op,
                e1: Box::new(e1),
                e2: Box::new(e2),
            })
            .with_type(ty)
        }
        ExpKind::UnaryOp { op, e } => {
            let e = infer(*e, env, ctx);
            let ty = match op {
                UOp::Not => {
                    require_bool(&e, ctx);
                    Type::Bool
                }
                UOp::Negate => {
                    if !ctx.resolve(e.ty()).is_numeric() {
                        ctx.err(format!("cannot negate {}", e.ty()));
                    }
                    ctx.resolve(e.ty())
                }
                UOp::Sum => {
                    if ctx.resolve(e.ty()).element_type().is_none() {
                        ctx.err(format!("cannot sum over {}", e.ty()));
                    }
                    Type::Int
                }
                UOp::Length => {
                    if ctx.resolve(e.ty()).element_type().is_none() {
                        ctx.err(format!("{} has no length", e.ty()));
                    }
                    Type::Int
                }
                UOp::Distinct | UOp::AreUnique => {
                    if ctx.resolve(e.ty()).element_type().is_none() {
                        ctx.err(format!("{} is not a collection", e.ty()));
                    }
                    ctx.resolve(e.ty())
                }
                UOp::All | UOp::Any | UOp::Exists | UOp::Empty => {
                    if ctx.resolve(e.ty()).element_type().is_none() {
                        ctx.err(format!("{} is not a collection", e.ty()));
                    }
                    Type::Bool
                }
                UOp::The => ctx
                    .resolve(e.ty())
                    .element_type()
                    .cloned()
                    .unwrap_or_else(|| {
                        ctx.err(format!("{} is not a collection", e.ty()));
                        Type::Default
                    }),
            };
            Exp::new(ExpKind::UnaryOp {
                op,
                e: Box::new(e),
            })
            .with_type(ty)
        }
        ExpKind::ArgMin { e, f } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let f = infer_lambda(f, elem.clone(), env, ctx);
            if !ctx.resolve(f.ret_type()).is_numeric() {
                ctx.err("argmin/argmax key function must return a numeric type".to_string());
            }
            Exp::new(ExpKind::ArgMin {
                e: Box::new(e),
                f,
            })
            .with_type(elem)
        }
        ExpKind::ArgMax { e, f } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let f = infer_lambda(f, elem.clone(), env, ctx);
            if !ctx.resolve(f.ret_type()).is_numeric() {
                ctx.err("argmin/argmax key function must return a numeric type".to_string());
            }
            Exp::new(ExpKind::ArgMax {
                e: Box::new(e),
                f,
            })
            .with_type(elem)
        }
        ExpKind::Handle { addr, value } => {
            let addr = infer(*addr, env, ctx);
            let value = infer(*value, env, ctx);
            let statevar = addr.as_var().unwrap_or("").to_string();
            let ty = Type::Handle {
                statevar,
                value_type: Box::new(value.ty().clone()),
            };
            Exp::new(ExpKind::Handle {
                addr: Box::new(addr),
                value: Box::new(value),
            })
            .with_type(ty)
        }
        ExpKind::MakeRecord(fields) => {
            let fields: Vec<(String, Exp)> = fields
                .into_iter()
                .map(|(n, v)| (n, infer(v, env, ctx)))
                .collect();
            let ty = Type::Record(
                fields
                    .iter()
                    .map(|(n, v)| (n.clone(), v.ty().clone()))
                    .collect(),
            );
            Exp::new(ExpKind::MakeRecord(fields)).with_type(ty)
        }
        ExpKind::GetField { e, field } => {
            let e = infer(*e, env, ctx);
            let ty = match ctx.resolve(e.ty()) {
                Type::Record(fields) => fields
                    .iter()
                    .find(|(n, _)| *n == field)
                    .map(|(_, t)| t.clone())
                    .unwrap_or_else(|| {
                        ctx.err(format!("no field '{field}' on {}", e.ty()));
                        Type::Default
                    }),
                other => {
                    ctx.err(format!("{other} is not a record"));
                    Type::Default
                }
            };
            Exp::new(ExpKind::GetField {
                e: Box::new(e),
                field,
            })
            .with_type(ty)
        }
        ExpKind::Singleton(inner) => {
            let inner = infer(*inner, env, ctx);
            let ty = Type::Bag(Box::new(inner.ty().clone()));
            Exp::new(ExpKind::Singleton(Box::new(inner))).with_type(ty)
        }
        ExpKind::ListComprehension { clauses, body } => {
            let mut cur_env = env.clone();
            let mut new_clauses = Vec::with_capacity(clauses.len());
            for c in clauses {
                match c {
                    Clause::Pull { id, e } => {
                        let e = infer(e, &cur_env, ctx);
                        let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                            ctx.err(format!("{} is not a collection", e.ty()));
                            Type::Default
                        });
                        cur_env.insert(id.clone(), elem);
                        new_clauses.push(Clause::Pull { id, e });
                    }
                    Clause::Cond(e) => {
                        let e = infer(e, &cur_env, ctx);
                        require_bool(&e, ctx);
                        new_clauses.push(Clause::Cond(e));
                    }
                }
            }
            let body = infer(*body, &cur_env, ctx);
            let ty = Type::Bag(Box::new(body.ty().clone()));
            Exp::new(ExpKind::ListComprehension {
                clauses: new_clauses,
                body: Box::new(body),
            })
            .with_type(ty)
        }
        ExpKind::Call { func, args } => {
            let args: Vec<Exp> = args.into_iter().map(|a| infer(a, env, ctx)).collect();
            let ty = if let Some(f) = ctx.extern_funcs.get(&func) {
                let out = f.out_type.clone();
                if f.args.len() != args.len() {
                    ctx.err(format!(
                        "'{func}' expects {} argument(s), got {}",
                        f.args.len(),
                        args.len()
                    ));
                }
                out
            } else if let Some((params, ret)) = ctx.query_sigs.get(&func).cloned() {
                if params.len() != args.len() {
                    ctx.err(format!(
                        "'{func}' expects {} argument(s), got {}",
                        params.len(),
                        args.len()
                    ));
                }
                ret
            } else {
                ctx.err(format!("call to undeclared function/query '{func}'"));
                Type::Default
            };
            Exp::new(ExpKind::Call { func, args }).with_type(ty)
        }
        ExpKind::Tuple(es) => {
            let es: Vec<Exp> = es.into_iter().map(|e| infer(e, env, ctx)).collect();
            let ty = Type::Tuple(es.iter().map(|e| e.ty().clone()).collect());
            Exp::new(ExpKind::Tuple(es)).with_type(ty)
        }
        ExpKind::TupleGet { e, index } => {
            let e = infer(*e, env, ctx);
            let ty = match ctx.resolve(e.ty()) {
                Type::Tuple(ts) => ts.get(index).cloned().unwrap_or_else(|| {
                    ctx.err(format!("tuple index {index} out of range"));
                    Type::Default
                }),
                other => {
                    ctx.err(format!("{other} is not a tuple"));
                    Type::Default
                }
            };
            Exp::new(ExpKind::TupleGet {
                e: Box::new(e),
                index,
            })
            .with_type(ty)
        }
        ExpKind::Let { e, f } => {
            let e = infer(*e, env, ctx);
            let f = infer_lambda(f, e.ty().clone(), env, ctx);
            let ty = f.ret_type().clone();
            Exp::new(ExpKind::Let {
                e: Box::new(e),
                f,
            })
            .with_type(ty)
        }
        ExpKind::Map { e, f } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let f = infer_lambda(f, elem, env, ctx);
            let ty = Type::Bag(Box::new(f.ret_type().clone()));
            Exp::new(ExpKind::Map {
                e: Box::new(e),
                f,
            })
            .with_type(ty)
        }
        ExpKind::Filter { e, p } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let p = infer_lambda(p, elem, env, ctx);
            if !ctx.resolve(p.ret_type()).eq(&Type::Bool) {
                ctx.err("filter predicate must return Bool".to_string());
            }
            let ty = e.ty().clone();
            Exp::new(ExpKind::Filter {
                e: Box::new(e),
                p,
            })
            .with_type(ty)
        }
        ExpKind::FlatMap { e, f } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let f = infer_lambda(f, elem, env, ctx);
            let ty = match ctx.resolve(f.ret_type()) {
                Type::Bag(t) | Type::Set(t) => Type::Bag(t),
                other => {
                    ctx.err(format!("flatmap function must return a collection, got {other}"));
                    Type::Bag(Box::new(Type::Default))
                }
            };
            Exp::new(ExpKind::FlatMap {
                e: Box::new(e),
                f,
            })
            .with_type(ty)
        }
        ExpKind::MakeMap { e, key, value } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let key = infer_lambda(key, elem.clone(), env, ctx);
            let value = infer_lambda(value, Type::Bag(Box::new(elem)), env, ctx);
            let ty = Type::Map(
                Box::new(key.ret_type().clone()),
                Box::new(value.ret_type().clone()),
            );
            Exp::new(ExpKind::MakeMap {
                e: Box::new(e),
                key,
                value,
            })
            .with_type(ty)
        }
        ExpKind::MakeMap2 { e, value } => {
            let e = infer(*e, env, ctx);
            let elem = ctx.resolve(e.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", e.ty()));
                Type::Default
            });
            let value = infer_lambda(value, elem.clone(), env, ctx);
            let ty = Type::Map(Box::new(elem), Box::new(value.ret_type().clone()));
            Exp::new(ExpKind::MakeMap2 {
                e: Box::new(e),
                value,
            })
            .with_type(ty)
        }
        ExpKind::MapGet { map, key } => {
            let map = infer(*map, env, ctx);
            let key = infer(*key, env, ctx);
            let ty = match ctx.resolve(map.ty()) {
                Type::Map(k, v) => {
                    if !k.equivalent(&ctx.resolve(key.ty())) {
                        ctx.err(format!("map key type {k} does not match {}", key.ty()));
                    }
                    *v
                }
                other => {
                    ctx.err(format!("{other} is not a map"));
                    Type::Default
                }
            };
            Exp::new(ExpKind::MapGet {
                map: Box::new(map),
                key: Box::new(key),
            })
            .with_type(ty)
        }
        ExpKind::MapKeys(e) => {
            let e = infer(*e, env, ctx);
            let ty = match ctx.resolve(e.ty()) {
                Type::Map(k, _) => Type::Set(k),
                other => {
                    ctx.err(format!("{other} is not a map"));
                    Type::Set(Box::new(Type::Default))
                }
            };
            Exp::new(ExpKind::MapKeys(Box::new(e))).with_type(ty)
        }
        ExpKind::StateVar(e) => {
            let e = infer(*e, env, ctx);
            let ty = e.ty().clone();
            Exp::new(ExpKind::StateVar(Box::new(e))).with_type(ty)
        }
        ExpKind::VectorGet { e, index } => {
            let e = infer(*e, env, ctx);
            let index = infer(*index, env, ctx);
            if !ctx.resolve(index.ty()).is_numeric() {
                ctx.err(format!("vector index must be numeric, got {}", index.ty()));
            }
            let ty = match ctx.resolve(e.ty()) {
                Type::Vector(t, _) => *t,
                other => {
                    ctx.err(format!("{other} is not a vector"));
                    Type::Default
                }
            };
            Exp::new(ExpKind::VectorGet {
                e: Box::new(e),
                index: Box::new(index),
            })
            .with_type(ty)
        }
        ExpKind::WithAlteredValue { handle, new_value } => {
            let handle = infer(*handle, env, ctx);
            let new_value = infer(*new_value, env, ctx);
            let ty = match ctx.resolve(handle.ty()) {
                Type::Handle { statevar, .. } => Type::Handle {
                    statevar,
                    value_type: Box::new(new_value.ty().clone()),
                },
                other => {
                    ctx.err(format!("{other} is not a handle"));
                    Type::Default
                }
            };
            Exp::new(ExpKind::WithAlteredValue {
                handle: Box::new(handle),
                new_value: Box::new(new_value),
            })
            .with_type(ty)
        }
        ExpKind::Stm { stm, e } => {
            let stm = check_stm(*stm, env, ctx);
            let e = infer(*e, env, ctx);
            let ty = e.ty().clone();
            Exp::new(ExpKind::Stm {
                stm: Box::new(stm),
                e: Box::new(e),
            })
            .with_type(ty)
        }
        ExpKind::EnumToInt(e) => {
            let e = infer(*e, env, ctx);
            if !matches!(ctx.resolve(e.ty()), Type::Enum(_)) {
                ctx.err(format!("{} is not an enum", e.ty()));
            }
            Exp::new(ExpKind::EnumToInt(Box::new(e))).with_type(Type::Int)
        }
        ExpKind::BoolToInt(e) => {
            let e = infer(*e, env, ctx);
            require_bool(&e, ctx);
            Exp::new(ExpKind::BoolToInt(Box::new(e))).with_type(Type::Int)
        }
        ExpKind::Native(e) => {
            let e = infer(*e, env, ctx);
            let ty = e.ty().clone();
            Exp::new(ExpKind::Native(Box::new(e))).with_type(ty)
        }
    }
}

fn check_stm(s: Stm, env: &HashMap<String, Type>, ctx: &mut Ctx) -> Stm {
    match s {
        Stm::NoOp => Stm::NoOp,
        Stm::Seq(s1, s2) => {
            let s1 = check_stm(*s1, env, ctx);
            let s2 = check_stm(*s2, env, ctx);
            Stm::Seq(Box::new(s1), Box::new(s2))
        }
        Stm::Call {
            target,
            func,
            args,
        } => {
            let target = infer(*target, env, ctx);
            if !target.ty().is_collection() {
                ctx.err(format!("{} is not a collection", target.ty()));
            }
            let args: Vec<Exp> = args.into_iter().map(|a| infer(a, env, ctx)).collect();
            Stm::Call {
                target: Box::new(target),
                func,
                args,
            }
        }
        Stm::Assign { lhs, rhs } => {
            let lhs = infer(*lhs, env, ctx);
            let rhs = infer(*rhs, env, ctx);
            if !ctx.resolve(lhs.ty()).equivalent(&ctx.resolve(rhs.ty())) {
                ctx.err(format!(
                    "cannot assign {} to a slot of type {}",
                    rhs.ty(),
                    lhs.ty()
                ));
            }
            Stm::Assign {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            }
        }
        Stm::Decl { id, val } => {
            let val = infer(*val, env, ctx);
            Stm::Decl {
                id,
                val: Box::new(val),
            }
        }
        Stm::ForEach { id, iter, body } => {
            let iter = infer(*iter, env, ctx);
            let elem = ctx.resolve(iter.ty()).element_type().cloned().unwrap_or_else(|| {
                ctx.err(format!("{} is not a collection", iter.ty()));
                Type::Default
            });
            let mut inner = env.clone();
            inner.insert(id.id.clone(), elem.clone());
            let body = check_stm(*body, &inner, ctx);
            Stm::ForEach {
                id: Var::new(id.id, elem),
                iter: Box::new(iter),
                body: Box::new(body),
            }
        }
        Stm::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = infer(*cond, env, ctx);
            require_bool(&cond, ctx);
            let then_branch = check_stm(*then_branch, env, ctx);
            let else_branch = check_stm(*else_branch, env, ctx);
            Stm::If {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            }
        }
        Stm::While { cond, body } => {
            let cond = infer(*cond, env, ctx);
            require_bool(&cond, ctx);
            let body = check_stm(*body, env, ctx);
            Stm::While {
                cond: Box::new(cond),
                body: Box::new(body),
            }
        }
        Stm::EscapableBlock { label, body } => Stm::EscapableBlock {
            label,
            body: Box::new(check_stm(*body, env, ctx)),
        },
        Stm::EscapeBlock(label) => Stm::EscapeBlock(label),
        Stm::MapPut { map, key, value } => {
            let map = infer(*map, env, ctx);
            let key = infer(*key, env, ctx);
            let value = infer(*value, env, ctx);
            Stm::MapPut {
                map: Box::new(map),
                key: Box::new(key),
                value: Box::new(value),
            }
        }
        Stm::MapDel { map, key } => {
            let map = infer(*map, env, ctx);
            let key = infer(*key, env, ctx);
            Stm::MapDel {
                map: Box::new(map),
                key: Box::new(key),
            }
        }
        Stm::MapUpdate {
            map,
            key,
            val_var,
            change,
        } => {
            let map = infer(*map, env, ctx);
            let key = infer(*key, env, ctx);
            let value_ty = match ctx.resolve(map.ty()) {
                Type::Map(_, v) => *v,
                other => {
                    ctx.err(format!("{other} is not a map"));
                    Type::Default
                }
            };
            let mut inner = env.clone();
            inner.insert(val_var.id.clone(), value_ty.clone());
            let change = check_stm(*change, &inner, ctx);
            Stm::MapUpdate {
                map: Box::new(map),
                key: Box::new(key),
                val_var: Var::new(val_var.id, value_ty),
                change: Box::new(change),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::Visibility;

    fn spec_with_query(ret: Exp) -> Spec {
        Spec {
            name: "Test".to_string(),
            types: Vec::new(),
            extern_funcs: Vec::new(),
            statevars: vec![("s".to_string(), Type::Int)],
            assumptions: Vec::new(),
            methods: vec![Method::Query(Query {
                name: "q".to_string(),
                visibility: Visibility::Public,
                args: Vec::new(),
                assumptions: Vec::new(),
                ret,
                docstring: String::new(),
            })],
            header: String::new(),
            footer: String::new(),
            docstring: String::new(),
        }
    }

    #[test]
    fn infers_state_var_type() {
        let spec = spec_with_query(Exp::new(ExpKind::Var("s".to_string())));
        let (checked, errors) = typecheck(&spec);
        assert!(errors.is_empty());
        assert_eq!(*checked.queries().next().unwrap().ret.ty(), Type::Int);
    }

    #[test]
    fn numeric_operands_may_compare_across_int_and_long() {
        let e = Exp::new(ExpKind::BinOp {
            op: BOp::Eq,
            e1: Box::new(Exp::new(ExpKind::Var("s".to_string()))),
            e2: Box::new(Exp::new(ExpKind::Num(1))),
        });
        let spec = spec_with_query(e);
        let (_, errors) = typecheck(&spec);
        assert!(errors.is_empty());
    }

    #[test]
    fn non_numeric_type_mismatch_is_an_error() {
        let e = Exp::new(ExpKind::BinOp {
            op: BOp::Eq,
            e1: Box::new(Exp::new(ExpKind::Bool(true))),
            e2: Box::new(Exp::new(ExpKind::Num(1))),
        });
        let spec = spec_with_query(e);
        let (_, errors) = typecheck(&spec);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn undeclared_variable_is_reported() {
        let spec = spec_with_query(Exp::new(ExpKind::Var("nope".to_string())));
        let (_, errors) = typecheck(&spec);
        assert_eq!(errors.len(), 1);
    }
}
