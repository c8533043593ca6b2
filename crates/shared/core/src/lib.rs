//! SubSim Core Domain
//!
//! Pure domain types for the SubSim stochastic simulation harness.
//! This crate contains no threads, no I/O, and is 100% unit testable.

pub mod entities;
pub mod error;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{Context, Declarations, StateStore, VariableDecl};
pub use error::{SimError, SimResult};
pub use values::{FromValue, Value, ValueKind};
