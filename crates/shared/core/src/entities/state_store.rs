use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Context, Declarations};
use crate::error::{SimError, SimResult};
use crate::values::Value;

/// Per-run variable state and history
///
/// `current` and `history` are indexed by declaration position.
#[derive(Debug, Clone)]
pub struct StateStore {
    declarations: Arc<Declarations>,
    run_index: usize,
    current: Vec<Value>,
    history: Vec<Vec<Value>>,
    auxiliary: HashMap<String, Value>,
    steps_taken: usize,
    rng: StdRng,
}

impl StateStore {
    /// Create a store initialized to the declaration defaults
    ///
    /// With a seed, the run generator is derived from `(seed, run_index)` so
    /// every run draws an independent, reproducible stream.
    pub fn new(declarations: Arc<Declarations>, run_index: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(run_index as u64)),
            None => StdRng::from_entropy(),
        };
        let current = declarations.defaults();
        let history = vec![Vec::new(); declarations.len()];

        Self {
            declarations,
            run_index,
            current,
            history,
            auxiliary: HashMap::new(),
            steps_taken: 0,
            rng,
        }
    }

    pub fn declarations(&self) -> &Declarations {
        &self.declarations
    }

    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// Latest value of `name`
    pub fn get(&self, name: &str) -> SimResult<&Value> {
        let idx = self.declarations.index_of(name)?;
        Ok(&self.current[idx])
    }

    /// Value of `name` logged at the end of step `step`
    pub fn value_at(&self, name: &str, step: usize) -> SimResult<&Value> {
        let idx = self.declarations.index_of(name)?;
        self.history[idx].get(step).ok_or_else(|| {
            SimError::NotFound(format!(
                "step {} of '{}' ({} steps taken)",
                step, name, self.steps_taken
            ))
        })
    }

    /// Full logged history of `name`, one entry per completed step
    pub fn history(&self, name: &str) -> SimResult<&[Value]> {
        let idx = self.declarations.index_of(name)?;
        Ok(&self.history[idx])
    }

    /// Append the current value of every declared variable to its history
    pub fn log_step(&mut self) {
        for (series, value) in self.history.iter_mut().zip(&self.current) {
            series.push(value.clone());
        }
        self.steps_taken += 1;
        log::trace!("run {} logged step {}", self.run_index, self.steps_taken);
    }

    /// Writable context over this store
    pub fn context(&mut self) -> Context<'_> {
        Context::live(self)
    }

    /// Read-only context over the current state
    pub fn read_only_context(&self) -> Context<'_> {
        Context::read_only(self)
    }

    pub(crate) fn set(&mut self, name: &str, value: Value) -> SimResult<()> {
        let idx = self.declarations.index_of(name)?;
        let expected = self.current[idx].kind();
        if value.kind() != expected {
            return Err(SimError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: value.kind(),
            });
        }
        self.current[idx] = value;
        Ok(())
    }

    pub(crate) fn auxiliary(&self, key: &str) -> SimResult<&Value> {
        self.auxiliary
            .get(key)
            .ok_or_else(|| SimError::NotFound(format!("auxiliary '{}'", key)))
    }

    pub(crate) fn set_auxiliary(&mut self, key: String, value: Value) {
        self.auxiliary.insert(key, value);
    }

    pub(crate) fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}
