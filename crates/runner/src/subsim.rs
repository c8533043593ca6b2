//! Single-Run Engine
//!
//! Drives one sub-simulation: the init callback runs once, then the step
//! callback runs once per step and every declared variable is logged after
//! each step.

use std::fmt;
use std::sync::Arc;
use subsim_core::{Context, Declarations, FromValue, SimError, SimResult, StateStore, Value};

use crate::cancel::CancelHandle;

/// Initialization callback, invoked once per run
pub type InitCallback = Arc<dyn Fn(&mut Context<'_>) -> SimResult<()> + Send + Sync>;

/// Step callback, invoked with the zero-based step index
pub type StepCallback = Arc<dyn Fn(&mut Context<'_>, usize) -> SimResult<()> + Send + Sync>;

/// Wrap a closure as an [`InitCallback`]
pub fn init_callback<F>(f: F) -> InitCallback
where
    F: Fn(&mut Context<'_>) -> SimResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a [`StepCallback`]
pub fn step_callback<F>(f: F) -> StepCallback
where
    F: Fn(&mut Context<'_>, usize) -> SimResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Created,
    Initialized,
    /// Number of steps completed so far
    Stepping(usize),
    Completed,
}

/// One independent sub-simulation with its own state store
pub struct SubSimulation {
    store: StateStore,
    init: InitCallback,
    step: StepCallback,
    phase: RunPhase,
    cancel: Option<CancelHandle>,
}

impl SubSimulation {
    /// Create a standalone run with an entropy-seeded generator
    pub fn new(declarations: Arc<Declarations>, init: InitCallback, step: StepCallback) -> Self {
        Self::for_run(declarations, 0, None, init, step)
    }

    /// Create the run at `run_index` of an ensemble
    pub fn for_run(
        declarations: Arc<Declarations>,
        run_index: usize,
        seed: Option<u64>,
        init: InitCallback,
        step: StepCallback,
    ) -> Self {
        Self {
            store: StateStore::new(declarations, run_index, seed),
            init,
            step,
            phase: RunPhase::Created,
            cancel: None,
        }
    }

    /// Stop between steps once `cancel` is raised
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn run_index(&self) -> usize {
        self.store.run_index()
    }

    pub fn steps_taken(&self) -> usize {
        self.store.steps_taken()
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Read-only view of the latest state
    pub fn context(&self) -> Context<'_> {
        self.store.read_only_context()
    }

    /// Run `n` more steps, initializing first if needed
    ///
    /// A callback error aborts the run where it stands; already logged steps
    /// are kept.
    pub fn run_steps(&mut self, n: usize) -> SimResult<()> {
        if n == 0 {
            return Err(SimError::InvalidArgument(
                "steps must be positive".to_string(),
            ));
        }
        if self.phase == RunPhase::Completed {
            return Err(SimError::InvalidArgument(format!(
                "run {} is already completed",
                self.run_index()
            )));
        }

        if self.phase == RunPhase::Created {
            (self.init)(&mut self.store.context())?;
            self.phase = RunPhase::Initialized;
            log::debug!("run {} initialized", self.run_index());
        }

        for _ in 0..n {
            let run_index = self.run_index();
            if self.cancel.as_ref().is_some_and(|c| c.stops(run_index)) {
                log::debug!(
                    "run {} cancelled after {} steps",
                    self.run_index(),
                    self.steps_taken()
                );
                return Err(SimError::Cancelled);
            }

            let step = self.store.steps_taken();
            (self.step)(&mut self.store.context(), step)?;
            self.store.log_step();
            self.phase = RunPhase::Stepping(self.store.steps_taken());
        }

        Ok(())
    }

    /// Mark the run completed; no further steps are accepted
    pub fn finish(&mut self) {
        self.phase = RunPhase::Completed;
    }

    pub fn history(&self, name: &str) -> SimResult<&[Value]> {
        self.store.history(name)
    }

    /// History of `name` extracted as `T`
    pub fn history_as<T: FromValue>(&self, name: &str) -> SimResult<Vec<T>> {
        self.store
            .history(name)?
            .iter()
            .map(|value| {
                T::from_value(value).ok_or_else(|| SimError::KindMismatch {
                    name: name.to_string(),
                    expected: T::KIND,
                    actual: value.kind(),
                })
            })
            .collect()
    }

    /// History of a numeric variable as `f64`; integers are widened
    pub fn numeric_history(&self, name: &str) -> SimResult<Vec<f64>> {
        let kind = self.store.declarations().kind_of(name)?;
        if !kind.is_numeric() {
            return Err(SimError::NotNumeric {
                name: name.to_string(),
                kind,
            });
        }
        Ok(self
            .store
            .history(name)?
            .iter()
            .filter_map(Value::as_f64)
            .collect())
    }
}

impl fmt::Debug for SubSimulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubSimulation")
            .field("run_index", &self.run_index())
            .field("phase", &self.phase)
            .field("steps_taken", &self.steps_taken())
            .finish_non_exhaustive()
    }
}
