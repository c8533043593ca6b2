use parking_lot::Mutex;
use std::sync::Arc;

/// Observer notified with `(completed, total)` after each finished run
pub type ProgressObserver = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Serialized completion counter shared by the worker threads
///
/// The lock covers both the increment and the emission, so observers and
/// log lines always see strictly increasing counts.
pub(crate) struct ProgressReporter {
    total: usize,
    enabled: bool,
    completed: Mutex<usize>,
    observer: Option<ProgressObserver>,
}

impl ProgressReporter {
    pub(crate) fn new(total: usize, enabled: bool, observer: Option<ProgressObserver>) -> Self {
        Self {
            total,
            enabled,
            completed: Mutex::new(0),
            observer,
        }
    }

    pub(crate) fn record(&self) {
        let mut completed = self.completed.lock();
        *completed += 1;
        if !self.enabled {
            return;
        }

        log::info!("Completed simulation {} of {}", *completed, self.total);
        if let Some(observer) = &self.observer {
            observer(*completed, self.total);
        }
    }

    #[cfg(test)]
    pub(crate) fn completed(&self) -> usize {
        *self.completed.lock()
    }

    pub(crate) fn finish(&self) {
        if self.enabled {
            log::info!("All simulations completed");
        }
    }
}
