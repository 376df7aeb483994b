//! Handle reachability.
//!
//! Grounded on `cozy/handle_tools.py`'s `reachable_handles_at_method` and
//! the implicit-aliasing-assumption construction in
//! `cozy/invariant_preservation.py`. Shared by `invariant_preservation`
//! (for `add_implicit_handle_assumptions`) and by the implementation
//! manager's `_setup_handle_updates` (SPEC_FULL.md §4.5), which is why it
//! lives as its own module rather than inline in either caller.

use crate::common::{NameGen, OrderedMap, OrderedSet};
use crate::syntax::constructors::{build_balanced_tree, e_eq, e_implies};
use crate::syntax::{
    BOp, Clause, Exp, ExpKind, Lambda, Method, Spec, Type, UOp, Var,
};

/// Every root expression (a state var or a method argument) that may hold
/// handles, paired with its type.
fn roots(spec: &Spec, method: &Method) -> Vec<(String, Type)> {
    let mut out: Vec<(String, Type)> = spec.statevars.clone();
    let args = match method {
        Method::Op(o) => &o.args,
        Method::Query(q) => &q.args,
    };
    out.extend(args.iter().cloned());
    out
}

/// Collects, for every handle type reachable from `root`, the bag
/// expressions (rooted at `root`) whose elements are handles of that type.
/// Follows record fields, map values, and bag/set element types, exactly
/// the traversal SPEC_FULL.md §4.7 names; tuples, vectors and function
/// types never carry handles in this system's specs and are left alone.
fn collect_handle_bags(root: &Exp, namegen: &NameGen, avoid: &OrderedSet<String>) -> Vec<(Type, Exp)> {
    match root.ty.clone() {
        Type::Handle { .. } => {
            let bag_ty = Type::Bag(Box::new(root.ty.clone()));
            vec![(
                root.ty.clone(),
                Exp::new(ExpKind::Singleton(Box::new(root.clone()))).with_type(bag_ty),
            )]
        }
        Type::Bag(elem_ty) | Type::Set(elem_ty) => {
            if matches!(*elem_ty, Type::Handle { .. }) {
                vec![(*elem_ty, root.clone())]
            } else {
                let name = namegen.fresh_name("h_elem", avoid);
                let elem_var = Var::new(name, (*elem_ty).clone());
                let elem_exp =
                    Exp::new(ExpKind::Var(elem_var.id.clone())).with_type((*elem_ty).clone());
                collect_handle_bags(&elem_exp, namegen, avoid)
                    .into_iter()
                    .map(|(handle_ty, bag_expr)| {
                        let f = Lambda::new(elem_var.clone(), bag_expr);
                        let ty = Type::Bag(Box::new(handle_ty.clone()));
                        (
                            handle_ty,
                            Exp::new(ExpKind::FlatMap {
                                e: Box::new(root.clone()),
                                f,
                            })
                            .with_type(ty),
                        )
                    })
                    .collect()
            }
        }
        Type::Map(key_ty, value_ty) => {
            let name = namegen.fresh_name("h_key", avoid);
            let k = Var::new(name, (*key_ty).clone());
            let values = Exp::new(ExpKind::Map {
                e: Box::new(
                    Exp::new(ExpKind::MapKeys(Box::new(root.clone())))
                        .with_type(Type::Bag(key_ty.clone())),
                ),
                f: Lambda::new(
                    k.clone(),
                    Exp::new(ExpKind::MapGet {
                        map: Box::new(root.clone()),
                        key: Box::new(Exp::new(ExpKind::Var(k.id.clone())).with_type((*key_ty).clone())),
                    })
                    .with_type((*value_ty).clone()),
                ),
            })
            .with_type(Type::Bag(value_ty.clone()));
            collect_handle_bags(&values, namegen, avoid)
        }
        Type::Record(fields) => fields
            .into_iter()
            .flat_map(|(name, ty)| {
                let field_exp = Exp::new(ExpKind::GetField {
                    e: Box::new(root.clone()),
                    field: name,
                })
                .with_type(ty);
                collect_handle_bags(&field_exp, namegen, avoid)
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// The bags of handles (grouped by handle type, each group the union of
/// every bag found at every root) reachable from state and from `method`'s
/// own arguments.
pub fn reachable_handles_at_method(
    spec: &Spec,
    method: &Method,
    namegen: &NameGen,
) -> OrderedMap<Type, Exp> {
    let roots = roots(spec, method);
    let avoid: OrderedSet<String> = roots.iter().map(|(n, _)| n.clone()).collect();
    let mut grouped: OrderedMap<Type, Vec<Exp>> = OrderedMap::new();
    for (name, ty) in &roots {
        let root = Exp::new(ExpKind::Var(name.clone())).with_type(ty.clone());
        for (handle_ty, bag) in collect_handle_bags(&root, namegen, &avoid) {
            grouped.entry(handle_ty).or_default().push(bag);
        }
    }
    grouped
        .into_iter()
        .map(|(handle_ty, bags)| {
            let ty = Type::Bag(Box::new(handle_ty.clone()));
            let union = build_balanced_tree(bags, |a, b| {
                Exp::new(ExpKind::BinOp {
                    op: BOp::Plus,
                    e1: Box::new(a),
                    e2: Box::new(b),
                })
                .with_type(ty.clone())
            })
            .unwrap_or_else(|| Exp::new(ExpKind::EmptyList).with_type(ty.clone()));
            (handle_ty, union)
        })
        .collect()
}

/// The implicit aliasing assumptions for `method`: for every handle type
/// reachable from state or arguments, any two equal (same-address) handles
/// of that type carry the same value.
pub fn implicit_handle_assumptions_for_method(
    spec: &Spec,
    method: &Method,
    namegen: &NameGen,
) -> Vec<Exp> {
    let reachable = reachable_handles_at_method(spec, method, namegen);
    let avoid: OrderedSet<String> = roots(spec, method).iter().map(|(n, _)| n.clone()).collect();
    reachable
        .into_iter()
        .map(|(handle_ty, hs)| {
            let h1 = Var::new(namegen.fresh_name("h1", &avoid), handle_ty.clone());
            let h2 = Var::new(namegen.fresh_name("h2", &avoid), handle_ty.clone());
            let h1_exp = Exp::new(ExpKind::Var(h1.id.clone())).with_type(handle_ty.clone());
            let h2_exp = Exp::new(ExpKind::Var(h2.id.clone())).with_type(handle_ty.clone());
            let val_ty = match &handle_ty {
                Type::Handle { value_type, .. } => (**value_type).clone(),
                _ => Type::Default,
            };
            let val1 = Exp::new(ExpKind::GetField {
                e: Box::new(h1_exp.clone()),
                field: "val".to_string(),
            })
            .with_type(val_ty.clone());
            let val2 = Exp::new(ExpKind::GetField {
                e: Box::new(h2_exp.clone()),
                field: "val".to_string(),
            })
            .with_type(val_ty);
            let body = e_implies(e_eq(h1_exp, h2_exp), e_eq(val1, val2));
            let inner = Exp::new(ExpKind::ListComprehension {
                clauses: vec![
                    Clause::Pull {
                        id: h1.id.clone(),
                        e: hs.clone(),
                    },
                    Clause::Pull {
                        id: h2.id.clone(),
                        e: hs,
                    },
                ],
                body: Box::new(body),
            })
            .with_type(Type::Bag(Box::new(Type::Bool)));
            Exp::new(ExpKind::UnaryOp {
                op: UOp::All,
                e: Box::new(inner),
            })
            .with_type(Type::Bool)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{Op, Query, Visibility};

    fn handle_ty() -> Type {
        Type::Handle {
            statevar: "nodes".to_string(),
            value_type: Box::new(Type::Int),
        }
    }

    fn spec_with_handle_state() -> Spec {
        Spec {
            name: "t".to_string(),
            types: vec![],
            extern_funcs: vec![],
            statevars: vec![("nodes".to_string(), Type::Bag(Box::new(handle_ty())))],
            assumptions: vec![],
            methods: vec![Method::Query(Query {
                name: "q".to_string(),
                visibility: Visibility::Public,
                args: vec![],
                assumptions: vec![],
                ret: Exp::new(ExpKind::Bool(true)).with_type(Type::Bool),
                docstring: String::new(),
            })],
            header: String::new(),
            footer: String::new(),
            docstring: String::new(),
        }
    }

    #[test]
    fn finds_handles_directly_in_state() {
        let spec = spec_with_handle_state();
        let namegen = NameGen::new("_ht");
        let method = spec.methods[0].clone();
        let reachable = reachable_handles_at_method(&spec, &method, &namegen);
        assert_eq!(reachable.len(), 1);
        assert!(reachable.contains_key(&handle_ty()));
    }

    #[test]
    fn finds_handles_nested_in_a_record_field() {
        let record_ty = Type::Record(vec![("owner".to_string(), handle_ty())]);
        let spec = Spec {
            name: "t".to_string(),
            types: vec![],
            extern_funcs: vec![],
            statevars: vec![("things".to_string(), Type::Bag(Box::new(record_ty)))],
            assumptions: vec![],
            methods: vec![Method::Op(Op {
                name: "noop".to_string(),
                args: vec![],
                assumptions: vec![],
                body: crate::syntax::Stm::NoOp,
                docstring: String::new(),
            })],
            header: String::new(),
            footer: String::new(),
            docstring: String::new(),
        };
        let namegen = NameGen::new("_ht");
        let method = spec.methods[0].clone();
        let reachable = reachable_handles_at_method(&spec, &method, &namegen);
        assert_eq!(reachable.len(), 1);
    }

    #[test]
    fn assumptions_are_generated_per_handle_type() {
        let spec = spec_with_handle_state();
        let namegen = NameGen::new("_ht");
        let method = spec.methods[0].clone();
        let assumptions = implicit_handle_assumptions_for_method(&spec, &method, &namegen);
        assert_eq!(assumptions.len(), 1);
        assert!(matches!(
            assumptions[0].kind,
            ExpKind::UnaryOp { op: UOp::All, .. }
        ));
    }
}
