//! Execution Context
//!
//! The handle user callbacks receive. A context borrows exactly one
//! [`StateStore`] for the duration of a callback and mediates every read and
//! write against it.
//!
//! Three views exist:
//! - live: read/write access to the run being stepped
//! - current: read-only view of the latest values
//! - past: read-only view of the values logged at an earlier step
//!
//! Past views replay the stored history, so `past(n)` observes the values as
//! they were logged `n` step boundaries before the view it was taken from.

use rand::rngs::StdRng;

use super::StateStore;
use crate::error::{SimError, SimResult};
use crate::values::{FromValue, Value};

enum View<'a> {
    Live(&'a mut StateStore),
    Current(&'a StateStore),
    Past { store: &'a StateStore, entry: usize },
}

/// Capability-scoped view over one run's state
pub struct Context<'a> {
    view: View<'a>,
}

impl<'a> Context<'a> {
    pub(crate) fn live(store: &'a mut StateStore) -> Self {
        Self {
            view: View::Live(store),
        }
    }

    pub(crate) fn read_only(store: &'a StateStore) -> Self {
        Self {
            view: View::Current(store),
        }
    }

    fn store(&self) -> &StateStore {
        match &self.view {
            View::Live(store) => &**store,
            View::Current(store) => *store,
            View::Past { store, .. } => *store,
        }
    }

    fn store_mut(&mut self) -> SimResult<&mut StateStore> {
        match &mut self.view {
            View::Live(store) => Ok(&mut **store),
            View::Current(_) | View::Past { .. } => Err(SimError::ReadOnly),
        }
    }

    pub fn is_read_only(&self) -> bool {
        !matches!(self.view, View::Live(_))
    }

    /// Index of the run within its ensemble
    pub fn run_index(&self) -> usize {
        self.store().run_index()
    }

    /// Completed steps visible through this context
    pub fn steps_taken(&self) -> usize {
        match &self.view {
            View::Live(store) => store.steps_taken(),
            View::Current(store) => store.steps_taken(),
            View::Past { entry, .. } => entry + 1,
        }
    }

    pub fn get(&self, name: &str) -> SimResult<Value> {
        match &self.view {
            View::Past { store, entry } => store.value_at(name, *entry).cloned(),
            _ => self.store().get(name).cloned(),
        }
    }

    /// Typed read; fails with `KindMismatch` rather than coercing
    pub fn get_as<T: FromValue>(&self, name: &str) -> SimResult<T> {
        let value = self.get(name)?;
        T::from_value(&value).ok_or_else(|| SimError::KindMismatch {
            name: name.to_string(),
            expected: T::KIND,
            actual: value.kind(),
        })
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> SimResult<()> {
        self.store_mut()?.set(name, value.into())
    }

    pub fn get_auxiliary(&self, key: &str) -> SimResult<Value> {
        self.store().auxiliary(key).cloned()
    }

    pub fn get_auxiliary_as<T: FromValue>(&self, key: &str) -> SimResult<T> {
        let value = self.get_auxiliary(key)?;
        T::from_value(&value).ok_or_else(|| SimError::KindMismatch {
            name: key.to_string(),
            expected: T::KIND,
            actual: value.kind(),
        })
    }

    /// Store scratch data; not recorded in history
    pub fn set_auxiliary(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> SimResult<()> {
        self.store_mut()?.set_auxiliary(key.into(), value.into());
        Ok(())
    }

    /// The run's own random generator
    pub fn rng(&mut self) -> SimResult<&mut StdRng> {
        Ok(self.store_mut()?.rng_mut())
    }

    /// Read-only view `n` steps back
    ///
    /// From a live context `past(1)` is the state logged at the end of the
    /// previous step. Valid for `1 <= n <= steps_taken()` on live and current
    /// views, and `1 <= n < steps_taken()` on past views.
    pub fn past(&self, n: usize) -> SimResult<Context<'_>> {
        let (store, anchor) = match &self.view {
            View::Live(store) => (&**store, store.steps_taken() + 1),
            View::Current(store) => (*store, store.steps_taken() + 1),
            View::Past { store, entry } => (*store, entry + 1),
        };
        if n == 0 || n >= anchor {
            return Err(SimError::NotFound(format!(
                "no snapshot {} steps back ({} steps taken)",
                n,
                store.steps_taken()
            )));
        }

        Ok(Context {
            view: View::Past {
                store,
                entry: anchor - n - 1,
            },
        })
    }
}
