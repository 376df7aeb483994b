//! The cost model: ranks candidate expressions during synthesis search.
//!
//! SPEC_FULL.md §6 leaves the actual scoring heuristic unspecified and
//! asks only for a trait boundary. `TrivialCostModel` breaks ties by
//! expression size (`enumerate_fragments(e).len()`, smaller wins) —
//! enough to give `enumerator::ReferenceEnumerator` a total order to
//! report "no improvement" against, not a real cost heuristic.

use crate::fragments::enumerate_fragments;
use crate::syntax::Exp;

pub trait CostModel {
    type Cost: PartialOrd;

    fn cost(&self, e: &Exp) -> Self::Cost;
}

#[derive(Default)]
pub struct TrivialCostModel;

impl CostModel for TrivialCostModel {
    type Cost = usize;

    fn cost(&self, e: &Exp) -> usize {
        enumerate_fragments(e).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{BOp, ExpKind, Type};

    #[test]
    fn larger_expression_costs_more() {
        let model = TrivialCostModel;
        let small = Exp::new(ExpKind::Num(1)).with_type(Type::Int);
        let big = Exp::new(ExpKind::BinOp {
            op: BOp::Plus,
            e1: Box::new(small.clone()),
            e2: Box::new(small.clone()),
        })
        .with_type(Type::Int);
        assert!(model.cost(&small) < model.cost(&big));
    }
}
