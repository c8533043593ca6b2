//! Worker pool that executes independent runs
//!
//! Run indices are queued on a bounded channel and drained by a fixed set of
//! named worker threads. Finished runs come back on a result channel and are
//! slotted by index, so the stored order never depends on completion order.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use std::sync::Arc;
use std::thread;
use subsim_core::{Declarations, SimError, SimResult};

use crate::cancel::CancelHandle;
use crate::progress::ProgressReporter;
use crate::subsim::{InitCallback, StepCallback, SubSimulation};

type RunOutcome = (usize, SimResult<SubSimulation>);

/// Everything a worker needs to build and execute one run
pub(crate) struct RunPlan {
    pub declarations: Arc<Declarations>,
    pub init: InitCallback,
    pub step: StepCallback,
    pub step_count: usize,
    pub seed: Option<u64>,
    pub cancel: CancelHandle,
}

impl RunPlan {
    fn execute(&self, run_index: usize) -> SimResult<SubSimulation> {
        let mut run = SubSimulation::for_run(
            self.declarations.clone(),
            run_index,
            self.seed,
            self.init.clone(),
            self.step.clone(),
        )
        .with_cancel(self.cancel.clone());

        run.run_steps(self.step_count)?;
        run.finish();
        Ok(run)
    }
}

/// Execute `run_count` runs on up to `workers` threads
///
/// A failing run stops every higher-index run between steps, while lower
/// runs keep going. The returned failure is therefore always the lowest
/// failing run index, whatever the worker count or timing.
pub(crate) fn execute_runs(
    plan: &RunPlan,
    run_count: usize,
    workers: usize,
    progress: &ProgressReporter,
) -> SimResult<Vec<SubSimulation>> {
    let workers = workers.clamp(1, run_count);

    let (job_tx, job_rx) = bounded::<usize>(run_count);
    for run_index in 0..run_count {
        // Capacity equals run_count, so this never blocks
        let _ = job_tx.send(run_index);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded::<RunOutcome>();

    thread::scope(|scope| {
        let mut spawned = 0;
        for worker_id in 0..workers {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let spawn = thread::Builder::new()
                .name(format!("subsim-worker-{}", worker_id))
                .spawn_scoped(scope, move || worker_loop(plan, &jobs, &results, progress));

            match spawn {
                Ok(_) => spawned += 1,
                Err(e) => {
                    log::warn!("Failed to spawn worker {}: {}", worker_id, e);
                    break;
                }
            }
        }

        if spawned == 0 {
            log::warn!("No worker threads available, running inline");
            worker_loop(plan, &job_rx, &result_tx, progress);
        } else {
            log::debug!("{} workers started", spawned);
        }
    });
    drop(result_tx);

    collect_outcomes(result_rx, run_count)
}

fn worker_loop(
    plan: &RunPlan,
    jobs: &Receiver<usize>,
    results: &Sender<RunOutcome>,
    progress: &ProgressReporter,
) {
    for run_index in jobs.iter() {
        let outcome = if plan.cancel.stops(run_index) {
            Err(SimError::Cancelled)
        } else {
            plan.execute(run_index)
        };

        match &outcome {
            Ok(_) => progress.record(),
            Err(SimError::Cancelled) => {}
            Err(e) => {
                log::warn!("Run {} failed: {}", run_index, e);
                plan.cancel.fail(run_index);
            }
        }

        if results.send((run_index, outcome)).is_err() {
            break;
        }
    }
}

fn collect_outcomes(
    results: Receiver<RunOutcome>,
    run_count: usize,
) -> SimResult<Vec<SubSimulation>> {
    let mut slots: Vec<Option<SubSimulation>> = (0..run_count).map(|_| None).collect();
    let mut failure: Option<(usize, SimError)> = None;
    let mut cancelled = false;

    for (run_index, outcome) in results.try_iter() {
        match outcome {
            Ok(run) => slots[run_index] = Some(run),
            Err(SimError::Cancelled) => cancelled = true,
            Err(e) => {
                if failure.as_ref().is_none_or(|(idx, _)| run_index < *idx) {
                    failure = Some((run_index, e));
                }
            }
        }
    }

    if let Some((run, source)) = failure {
        return Err(SimError::RunFailed {
            run,
            source: Box::new(source),
        });
    }
    if cancelled {
        return Err(SimError::Cancelled);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| SimError::NotFound(format!("no result for run {}", idx)))
        })
        .collect()
}
