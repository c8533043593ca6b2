//! Ensemble Engine
//!
//! Fans out `run_count` independent sub-simulations that share declarations
//! and callbacks, executes them on a worker pool, and answers statistical
//! queries over the collected histories.
//!
//! `run` takes `&mut self` and joins every worker before returning, so no
//! query can observe an in-flight ensemble.

use std::fmt;
use std::sync::Arc;
use subsim_core::{Context, Declarations, SimError, SimResult, VariableDecl};

use crate::cancel::CancelHandle;
use crate::config::EnsembleConfig;
use crate::histogram::Histogram;
use crate::pool::{RunPlan, execute_runs};
use crate::progress::{ProgressObserver, ProgressReporter};
use crate::stats::{self, Aggregate, Domain, StatisticalResult};
use crate::subsim::{InitCallback, StepCallback, SubSimulation};

/// Monte Carlo ensemble of independent sub-simulations
pub struct MonteCarloEnsemble {
    declarations: Arc<Declarations>,
    run_count: usize,
    step_count: usize,
    workers: usize,
    seed: Option<u64>,
    init: Option<InitCallback>,
    step: Option<StepCallback>,
    observer: Option<ProgressObserver>,
    cancel: CancelHandle,
    runs: Vec<SubSimulation>,
}

impl MonteCarloEnsemble {
    /// Create an ensemble; both counts must be positive
    pub fn new(
        variables: impl IntoIterator<Item = VariableDecl>,
        run_count: usize,
        step_count: usize,
    ) -> SimResult<Self> {
        if run_count == 0 {
            return Err(SimError::InvalidArgument(
                "run_count must be positive".to_string(),
            ));
        }
        if step_count == 0 {
            return Err(SimError::InvalidArgument(
                "step_count must be positive".to_string(),
            ));
        }

        Ok(Self {
            declarations: Arc::new(Declarations::new(variables)?),
            run_count,
            step_count,
            workers: num_cpus::get().max(1),
            seed: None,
            init: None,
            step: None,
            observer: None,
            cancel: CancelHandle::new(),
            runs: Vec::new(),
        })
    }

    /// Create an ensemble from a loaded configuration
    pub fn from_config(config: &EnsembleConfig) -> SimResult<Self> {
        let mut ensemble = Self::new(
            config.variables.iter().cloned(),
            config.run_count,
            config.step_count,
        )?;
        ensemble.workers = config.resolved_workers();
        ensemble.seed = config.seed;
        Ok(ensemble)
    }

    /// Seed every run's generator from `(seed, run index)`
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn set_init_callback<F>(&mut self, f: F)
    where
        F: Fn(&mut Context<'_>) -> SimResult<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
    }

    pub fn set_step_callback<F>(&mut self, f: F)
    where
        F: Fn(&mut Context<'_>, usize) -> SimResult<()> + Send + Sync + 'static,
    {
        self.step = Some(Arc::new(f));
    }

    /// Receive `(completed, total)` after each run when progress is on
    pub fn set_progress_observer<F>(&mut self, f: F)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(f));
    }

    /// Handle for cancelling a run from another thread
    ///
    /// The flag is cleared when `run` starts.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn run_count(&self) -> usize {
        self.run_count
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn has_run(&self) -> bool {
        !self.runs.is_empty()
    }

    /// Execute every run to completion
    ///
    /// Previous results are discarded first. If any run fails the whole
    /// ensemble is aborted and no results are kept.
    pub fn run(&mut self, report_progress: bool) -> SimResult<()> {
        let init = self
            .init
            .clone()
            .ok_or_else(|| SimError::NotConfigured("init callback is not set".to_string()))?;
        let step = self
            .step
            .clone()
            .ok_or_else(|| SimError::NotConfigured("step callback is not set".to_string()))?;

        self.runs.clear();
        self.cancel.reset();

        log::info!(
            "Running {} simulations x {} steps on {} workers",
            self.run_count,
            self.step_count,
            self.workers.min(self.run_count)
        );

        let plan = RunPlan {
            declarations: self.declarations.clone(),
            init,
            step,
            step_count: self.step_count,
            seed: self.seed,
            cancel: self.cancel.clone(),
        };
        let progress = ProgressReporter::new(self.run_count, report_progress, self.observer.clone());

        match execute_runs(&plan, self.run_count, self.workers, &progress) {
            Ok(runs) => {
                self.runs = runs;
                progress.finish();
                Ok(())
            }
            Err(e) => {
                log::warn!("Ensemble aborted: {}", e);
                Err(e)
            }
        }
    }

    /// The completed run at `index`
    pub fn get_subrun(&self, index: usize) -> SimResult<&SubSimulation> {
        if index >= self.run_count {
            return Err(SimError::OutOfRange {
                index,
                len: self.run_count,
            });
        }
        self.ensure_run()?;
        Ok(&self.runs[index])
    }

    /// Raw `run_count x step_count` matrix of a numeric variable
    pub fn get_variable_histories(&self, name: &str) -> SimResult<Vec<Vec<f64>>> {
        self.validate_numeric(name)?;
        self.ensure_run()?;
        self.collect_histories(name)
    }

    pub fn get_variable_mean(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Mean, domain)
    }

    /// Population variance (divides by N)
    pub fn get_variable_variance(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Variance, domain)
    }

    pub fn get_variable_stddev(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::StdDev, domain)
    }

    pub fn get_variable_min(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Min, domain)
    }

    pub fn get_variable_max(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Max, domain)
    }

    pub fn get_variable_sum(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Sum, domain)
    }

    pub fn get_variable_median(&self, name: &str, domain: Domain) -> SimResult<StatisticalResult> {
        self.get_variable_statistic(name, Aggregate::Median, domain)
    }

    pub fn get_variable_statistic(
        &self,
        name: &str,
        aggregate: Aggregate,
        domain: Domain,
    ) -> SimResult<StatisticalResult> {
        self.validate_numeric(name)?;
        self.ensure_run()?;
        let matrix = self.collect_histories(name)?;
        Ok(stats::aggregate(&matrix, self.step_count, aggregate, domain))
    }

    /// One histogram per step over `n_bins` equal-width bins
    pub fn get_variable_histogram(
        &self,
        name: &str,
        n_bins: usize,
        density: bool,
        range: Option<(f64, f64)>,
    ) -> SimResult<Histogram> {
        self.validate_numeric(name)?;
        if n_bins == 0 {
            return Err(SimError::InvalidArgument(
                "n_bins must be positive".to_string(),
            ));
        }
        self.ensure_run()?;
        let matrix = self.collect_histories(name)?;
        Histogram::build(&matrix, self.step_count, n_bins, density, range)
    }

    fn validate_numeric(&self, name: &str) -> SimResult<()> {
        let kind = self.declarations.kind_of(name)?;
        if !kind.is_numeric() {
            return Err(SimError::NotNumeric {
                name: name.to_string(),
                kind,
            });
        }
        Ok(())
    }

    fn ensure_run(&self) -> SimResult<()> {
        if self.runs.is_empty() {
            return Err(SimError::NotRun);
        }
        Ok(())
    }

    fn collect_histories(&self, name: &str) -> SimResult<Vec<Vec<f64>>> {
        self.runs
            .iter()
            .map(|run| run.numeric_history(name))
            .collect()
    }
}

impl fmt::Debug for MonteCarloEnsemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonteCarloEnsemble")
            .field("variables", &self.declarations.names().collect::<Vec<_>>())
            .field("run_count", &self.run_count)
            .field("step_count", &self.step_count)
            .field("workers", &self.workers)
            .field("seed", &self.seed)
            .field("has_run", &self.has_run())
            .finish_non_exhaustive()
    }
}
