//! A minimal surface-syntax pretty-printer, used for diagnostics and by
//! the CLI to show a synthesized implementation back to the user.
//!
//! Grounded on `cozy/syntax_tools.py`'s `PrettyPrinter`; the concrete-
//! syntax *parser* is out of scope (SPEC_FULL.md §6), so this printer
//! only needs to produce readable output, not output that round-trips.

use std::fmt;

use crate::syntax::{BOp, Clause, Exp, ExpKind, Lambda, Method, Spec, Stm, UOp};

impl fmt::Display for Exp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExpKind::Var(id) => write!(f, "{id}"),
            ExpKind::Bool(b) => write!(f, "{b}"),
            ExpKind::Num(n) => write!(f, "{n}"),
            ExpKind::Str(s) => write!(f, "{s:?}"),
            ExpKind::Null => write!(f, "null"),
            ExpKind::EnumEntry(e) => write!(f, "{e}"),
            ExpKind::EmptyList => write!(f, "[]"),
            ExpKind::Cond {
                cond,
                then_branch,
                else_branch,
            } => write!(f, "({cond} ? {then_branch} : {else_branch})"),
            ExpKind::BinOp { op, e1, e2 } => write!(f, "({e1} {} {e2})", bop_str(*op)),
            ExpKind::UnaryOp { op, e } => write!(f, "{}({e})", uop_str(*op)),
            ExpKind::ArgMin { e, f: lam } => write!(f, "argmin {lam} in {e}"),
            ExpKind::ArgMax { e, f: lam } => write!(f, "argmax {lam} in {e}"),
            ExpKind::Handle { addr, value } => write!(f, "handle({addr}, {value})"),
            ExpKind::MakeRecord(fields) => {
                write!(f, "{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {v}")?;
                }
                write!(f, "}}")
            }
            ExpKind::GetField { e, field } => write!(f, "{e}.{field}"),
            ExpKind::Singleton(e) => write!(f, "[{e}]"),
            ExpKind::ListComprehension { clauses, body } => {
                write!(f, "[{body} | ")?;
                for (i, c) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match c {
                        Clause::Pull { id, e } => write!(f, "{id} <- {e}")?,
                        Clause::Cond(e) => write!(f, "{e}")?,
                    }
                }
                write!(f, "]")
            }
            ExpKind::Call { func, args } => {
                write!(f, "{func}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            ExpKind::Tuple(es) => {
                write!(f, "(")?;
                write_list(f, es)?;
                write!(f, ")")
            }
            ExpKind::TupleGet { e, index } => write!(f, "{e}.{index}"),
            ExpKind::Let { e, f: lam } => write!(f, "let {} = {e} in {}", lam.arg.id, lam.body),
            ExpKind::Map { e, f: lam } => write!(f, "[{} | x <- {e}]", display_apply(lam)),
            ExpKind::Filter { e, p } => write!(f, "[x <- {e} | {}]", display_apply(p)),
            ExpKind::FlatMap { e, f: lam } => write!(f, "flatmap({e}, {lam})"),
            ExpKind::MakeMap { e, key, value } => {
                write!(f, "{{k: {} | k <- map({e}, {key})}} -> {value}", key.arg.id)
            }
            ExpKind::MakeMap2 { e, value } => write!(f, "make_map({e}, {value})"),
            ExpKind::MapGet { map, key } => write!(f, "{map}[{key}]"),
            ExpKind::MapKeys(e) => write!(f, "keys({e})"),
            ExpKind::StateVar(e) => write!(f, "state({e})"),
            ExpKind::VectorGet { e, index } => write!(f, "{e}[{index}]"),
            ExpKind::WithAlteredValue { handle, new_value } => {
                write!(f, "with_value({handle}, {new_value})")
            }
            ExpKind::Stm { stm, e } => write!(f, "{{ {stm}; {e} }}"),
            ExpKind::EnumToInt(e) => write!(f, "int({e})"),
            ExpKind::BoolToInt(e) => write!(f, "int({e})"),
            ExpKind::Native(e) => write!(f, "native({e})"),
        }
    }
}

fn display_apply(f: &Lambda) -> String {
    format!("{}", f.body)
}

fn write_list(f: &mut fmt::Formatter<'_>, es: &[Exp]) -> fmt::Result {
    for (i, e) in es.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{e}")?;
    }
    Ok(())
}

fn bop_str(op: BOp) -> &'static str {
    match op {
        BOp::And => "and",
        BOp::Or => "or",
        BOp::In => "in",
        BOp::Eq => "==",
        BOp::HardEq => "===",
        BOp::Ne => "!=",
        BOp::Lt => "<",
        BOp::Le => "<=",
        BOp::Gt => ">",
        BOp::Ge => ">=",
        BOp::Plus => "+",
        BOp::Minus => "-",
    }
}

fn uop_str(op: UOp) -> &'static str {
    match op {
        UOp::Sum => "sum",
        UOp::Not => "not ",
        UOp::Distinct => "distinct",
        UOp::AreUnique => "unique",
        UOp::All => "all",
        UOp::Any => "any",
        UOp::Exists => "exists",
        UOp::Length => "len",
        UOp::Empty => "empty",
        UOp::The => "the",
        UOp::Negate => "-",
    }
}

impl fmt::Display for Stm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stm::NoOp => write!(f, "pass"),
            Stm::Seq(s1, s2) => write!(f, "{s1}; {s2}"),
            Stm::Call {
                target,
                func,
                args,
            } => {
                write!(f, "{target}.{func}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Stm::Assign { lhs, rhs } => write!(f, "{lhs} = {rhs}"),
            Stm::Decl { id, val } => write!(f, "let {id} = {val}"),
            Stm::ForEach { id, iter, body } => write!(f, "for {} in {iter} {{ {body} }}", id.id),
            Stm::If {
                cond,
                then_branch,
                else_branch,
            } => write!(f, "if {cond} {{ {then_branch} }} else {{ {else_branch} }}"),
            Stm::While { cond, body } => write!(f, "while {cond} {{ {body} }}"),
            Stm::EscapableBlock { label, body } => write!(f, "{label}: {{ {body} }}"),
            Stm::EscapeBlock(label) => write!(f, "break {label}"),
            Stm::MapPut { map, key, value } => write!(f, "{map}[{key}] = {value}"),
            Stm::MapDel { map, key } => write!(f, "del {map}[{key}]"),
            Stm::MapUpdate {
                map,
                key,
                val_var,
                change,
            } => write!(f, "update {map}[{key}] as {} {{ {change} }}", val_var.id),
        }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} :", self.name)?;
        for (name, ty) in &self.statevars {
            writeln!(f, "  state {name} : {ty}")?;
        }
        for m in &self.methods {
            match m {
                Method::Op(op) => {
                    write!(f, "  op {}(", op.name)?;
                    for (i, (n, t)) in op.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{n} : {t}")?;
                    }
                    writeln!(f, ") {{ {} }}", op.body)?;
                }
                Method::Query(q) => {
                    write!(f, "  query {}(", q.name)?;
                    for (i, (n, t)) in q.args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{n} : {t}")?;
                    }
                    writeln!(f, ") = {}", q.ret)?;
                }
            }
        }
        Ok(())
    }
}
