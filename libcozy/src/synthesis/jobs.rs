//! One improvement job per public query.
//!
//! Grounded on `cozy/synthesis/high_level_interface.py`'s `ImproveQueryJob`:
//! each job owns one query, runs on its own OS thread, opens a per-query
//! log file under the configured log directory (line-buffered, closed by
//! normal drop when the job returns), and pushes every strictly-cheaper
//! candidate it finds back to the driver over a channel rather than
//! mutating shared state itself — SPEC_FULL.md §5 makes the main thread
//! the sole mutator of the `Implementation`.

use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::cost_model::CostModel;
use crate::enumerator::{Enumerator, EnumeratorContext};
use crate::syntax::{Exp, Query, Type, Var};

/// A candidate return expression for `query_name`, strictly cheaper (by
/// whatever `CostModel` the job used) than every candidate proposed for
/// that query before it.
#[derive(Debug, Clone)]
pub struct QuerySolution {
    pub query_name: String,
    pub ret: Exp,
}

/// Everything one `ImproveQueryJob::run` needs, owned rather than borrowed
/// so the job can move onto its own thread.
pub struct ImproveQueryJob<E, C> {
    pub query: Query,
    pub state_vars: Vec<(String, Type)>,
    pub assumptions: Vec<Exp>,
    pub hints: Vec<Exp>,
    pub binders: Vec<Var>,
    pub enumerator: E,
    pub cost_model: C,
    pub log_dir: Option<PathBuf>,
    pub stop_requested: Arc<AtomicBool>,
}

impl<E, C> ImproveQueryJob<E, C>
where
    E: Enumerator,
    C: CostModel<Cost = usize>,
{
    /// Repeatedly asks `enumerator` for the next candidate at least as
    /// cheap as the best one found so far, reports every strict
    /// improvement over `results`, and returns once the enumerator is
    /// exhausted or `stop_requested` is set. Never panics on a closed
    /// channel; a driver that has stopped listening just gets a job that
    /// quietly finishes instead.
    pub fn run(mut self, results: Sender<QuerySolution>) {
        let mut log = self.open_log();
        log_line(&mut log, &format!("starting improvement job {}", self.query.name));

        let args: Vec<(String, Type)> = self.query.args.clone();
        let mut best = self.query.ret.clone();
        let mut best_cost = self.cost_model.cost(&best);

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }
            let ctx = EnumeratorContext {
                target: &best,
                assumptions: &self.assumptions,
                hints: &self.hints,
                binders: &self.binders,
                state_vars: &self.state_vars,
                args: &args,
            };
            let stop_requested = &self.stop_requested;
            let stop = move || stop_requested.load(Ordering::SeqCst);
            let candidate = self
                .enumerator
                .next_candidate(&ctx, &self.cost_model, &stop);
            let candidate = match candidate {
                Some(c) => c,
                None => break,
            };
            let cost = self.cost_model.cost(&candidate);
            if cost < best_cost {
                log_line(
                    &mut log,
                    &format!("{}: improved (cost {} -> {})", self.query.name, best_cost, cost),
                );
                best_cost = cost;
                best = candidate.clone();
                if results
                    .send(QuerySolution {
                        query_name: self.query.name.clone(),
                        ret: candidate,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }
        log_line(&mut log, &format!("stopping improvement job {}", self.query.name));
    }

    fn open_log(&self) -> Option<BufWriter<File>> {
        let dir = self.log_dir.as_ref()?;
        fs::create_dir_all(dir).ok()?;
        let path = Path::new(dir).join(format!("{}.log", self.query.name));
        File::create(path).ok().map(BufWriter::new)
    }
}

fn log_line(file: &mut Option<BufWriter<File>>, line: &str) {
    if let Some(f) = file {
        let _ = writeln!(f, "{line}");
        let _ = f.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost_model::TrivialCostModel;
    use crate::enumerator::ReferenceEnumerator;
    use crate::syntax::{ExpKind, Type, Visibility};
    use std::sync::mpsc;

    fn trivial_query() -> Query {
        Query {
            name: "get".to_string(),
            visibility: Visibility::Public,
            args: vec![],
            assumptions: vec![],
            ret: Exp::new(ExpKind::Num(1)).with_type(Type::Int),
            docstring: String::new(),
        }
    }

    #[test]
    fn reference_enumerator_never_reports_an_improvement() {
        let job = ImproveQueryJob {
            query: trivial_query(),
            state_vars: vec![],
            assumptions: vec![],
            hints: vec![],
            binders: vec![],
            enumerator: ReferenceEnumerator::default(),
            cost_model: TrivialCostModel,
            log_dir: None,
            stop_requested: Arc::new(AtomicBool::new(false)),
        };
        let (tx, rx) = mpsc::channel();
        job.run(tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stop_requested_before_running_yields_no_solutions() {
        let stop = Arc::new(AtomicBool::new(true));
        let job = ImproveQueryJob {
            query: trivial_query(),
            state_vars: vec![],
            assumptions: vec![],
            hints: vec![],
            binders: vec![],
            enumerator: ReferenceEnumerator::default(),
            cost_model: TrivialCostModel,
            log_dir: None,
            stop_requested: stop,
        };
        let (tx, rx) = mpsc::channel();
        job.run(tx);
        assert!(rx.try_recv().is_err());
    }
}
