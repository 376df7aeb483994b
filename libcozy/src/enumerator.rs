//! The candidate enumerator: a lazy, possibly-infinite stream of
//! rewrites of a target expression, each strictly better (by a
//! `CostModel`) than the last.
//!
//! SPEC_FULL.md §6 specifies only the trait boundary plus a trivial
//! reference implementation ("yields only the target itself", proving no
//! improvement) — sufficient to exercise the synthesis driver's control
//! flow without claiming to be a real search. The same "the real search
//! is out of scope, only the seam is" posture the teacher takes with its
//! own solver boundary.

use crate::cost_model::CostModel;
use crate::syntax::{Exp, Type, Var};

/// Everything an enumerator needs to propose rewrites of `target`.
pub struct EnumeratorContext<'a> {
    pub target: &'a Exp,
    pub assumptions: &'a [Exp],
    pub hints: &'a [Exp],
    pub binders: &'a [Var],
    pub state_vars: &'a [(String, Type)],
    pub args: &'a [(String, Type)],
}

pub trait Enumerator {
    /// Returns the next candidate strictly better (by `cost_model`) than
    /// the last, or `None` once nothing further can be proposed.
    /// `stop_requested` is polled at least once per candidate; once it
    /// reports true the enumerator must return `None` promptly rather
    /// than keep searching (SPEC_FULL.md §5's cancellation contract).
    fn next_candidate(
        &mut self,
        ctx: &EnumeratorContext,
        cost_model: &dyn CostModel<Cost = usize>,
        stop_requested: &dyn Fn() -> bool,
    ) -> Option<Exp>;
}

/// Yields `target` itself once, then nothing. Proves no improvement is
/// available, which is enough to exercise one full round trip through
/// the driver's `tease_apart`/`set_impl` application path.
#[derive(Default)]
pub struct ReferenceEnumerator {
    done: bool,
}

impl Enumerator for ReferenceEnumerator {
    fn next_candidate(
        &mut self,
        ctx: &EnumeratorContext,
        _cost_model: &dyn CostModel<Cost = usize>,
        stop_requested: &dyn Fn() -> bool,
    ) -> Option<Exp> {
        if self.done || stop_requested() {
            return None;
        }
        self.done = true;
        Some(ctx.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_model::TrivialCostModel;
    use crate::syntax::ExpKind;

    #[test]
    fn reference_enumerator_yields_target_once_then_stops() {
        let target = Exp::new(ExpKind::Num(1)).with_type(Type::Int);
        let ctx = EnumeratorContext {
            target: &target,
            assumptions: &[],
            hints: &[],
            binders: &[],
            state_vars: &[],
            args: &[],
        };
        let model = TrivialCostModel;
        let mut e = ReferenceEnumerator::default();
        assert!(e.next_candidate(&ctx, &model, &|| false).is_some());
        assert!(e.next_candidate(&ctx, &model, &|| false).is_none());
    }

    #[test]
    fn stop_requested_short_circuits_immediately() {
        let target = Exp::new(ExpKind::Num(1)).with_type(Type::Int);
        let ctx = EnumeratorContext {
            target: &target,
            assumptions: &[],
            hints: &[],
            binders: &[],
            state_vars: &[],
            args: &[],
        };
        let model = TrivialCostModel;
        let mut e = ReferenceEnumerator::default();
        assert!(e.next_candidate(&ctx, &model, &|| true).is_none());
    }
}
