//! SubSim Runner - Monte Carlo Ensemble Orchestration
//!
//! Drives user-defined stochastic sub-simulations built on `subsim-core`:
//!
//! - **SubSimulation**: One run; init once, step in chunks, log every step
//! - **Ensemble**: Many independent runs on a worker pool
//! - **Stats**: Per-step and pooled mean/variance/stddev/min/max/sum/median
//! - **Histogram**: Per-step binning with optional density normalization
//! - **Config**: JSON ensemble configuration
//!
//! ## Architecture
//!
//! ```text
//!               ┌───────────────────────┐
//!               │   MonteCarloEnsemble  │
//!               │ (declarations, init,  │
//!               │  step callbacks)      │
//!               └───────────┬───────────┘
//!                           │ run indices
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        WORKER POOL                              │
//! │                                                                 │
//! │  ┌──────────────────┐   ┌──────────────────┐                   │
//! │  │  subsim-worker-0 │   │  subsim-worker-1 │   ...             │
//! │  │  SubSimulation   │   │  SubSimulation   │                   │
//! │  └────────┬─────────┘   └────────┬─────────┘                   │
//! │           │ finished runs        │                              │
//! │           └──────────┬───────────┘                              │
//! └──────────────────────┼──────────────────────────────────────────┘
//!                        │ slotted by run index
//!                        ▼
//!               ┌───────────────────────┐
//!               │ Statistics/Histograms │
//!               └───────────────────────┘
//! ```

pub mod cancel;
pub mod config;
pub mod ensemble;
pub mod histogram;
mod pool;
pub mod progress;
pub mod stats;
pub mod subsim;

// Re-export main types
pub use cancel::CancelHandle;
pub use config::{ConfigError, EnsembleConfig};
pub use ensemble::MonteCarloEnsemble;
pub use histogram::Histogram;
pub use progress::ProgressObserver;
pub use stats::{Aggregate, Domain, StatisticalResult};
pub use subsim::{InitCallback, RunPhase, StepCallback, SubSimulation, init_callback, step_callback};

// Re-export core types for convenience
pub use subsim_core::{Context, Declarations, SimError, SimResult, Value, ValueKind, VariableDecl};
